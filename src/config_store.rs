// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Transactional configuration holder
//!
//! Each [`ConfigStore`] keeps two copies of a configuration value:
//!
//! - `active`: what the running loops read through [`ConfigStore::snapshot`]
//! - `shadow`: the scratch copy a writer edits
//!
//! A write is `begin_write` (active → shadow), any number of `stage` edits,
//! then `commit`, which validates the shadow and promotes it. A rejected
//! commit leaves `active` untouched, so readers never observe a partially
//! edited or invalid configuration.
//!
//! The lock is only held while copying and validating. Loops that need to
//! react to a commit compare [`ConfigStore::generation`] with the value they
//! last applied.
//!
//! # Example
//!
//! ```
//! use rust_fieldbus_monitor::config_store::ConfigStore;
//! use rust_fieldbus_monitor::register::{FunctionKind, RegisterDescriptor, ValueType};
//!
//! let store = ConfigStore::new(RegisterDescriptor::new(
//!     1,
//!     FunctionKind::HoldingRegister,
//!     0,
//!     ValueType::Uint16,
//! ));
//! store
//!     .update(|shadow| shadow.value_type = ValueType::Int32, |shadow| shadow.validate())
//!     .unwrap();
//! assert_eq!(store.snapshot().word_count(), 2);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Recompute fields that are derived from user-settable ones.
///
/// Called on the active copy after every successful commit.
pub trait Derive: Clone {
    fn refresh_derived(&mut self) {}
}

struct Copies<T> {
    active: T,
    shadow: T,
}

/// Active/shadow configuration pair with validated commit.
pub struct ConfigStore<T> {
    copies: Mutex<Copies<T>>,
    generation: AtomicU64,
}

impl<T: Derive> ConfigStore<T> {
    pub fn new(mut initial: T) -> Self {
        initial.refresh_derived();
        Self {
            copies: Mutex::new(Copies {
                shadow: initial.clone(),
                active: initial,
            }),
            generation: AtomicU64::new(0),
        }
    }

    // A validator that panicked under the lock left both copies intact.
    fn lock(&self) -> MutexGuard<'_, Copies<T>> {
        self.copies.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clone of the active configuration
    pub fn snapshot(&self) -> T {
        self.lock().active.clone()
    }

    /// Clone of the shadow copy, mostly useful to inspect staged edits
    pub fn shadow(&self) -> T {
        self.lock().shadow.clone()
    }

    /// Reset the shadow to the active configuration
    pub fn begin_write(&self) {
        let mut guard = self.lock();
        let copies = &mut *guard;
        copies.shadow.clone_from(&copies.active);
    }

    /// Edit the shadow copy.
    ///
    /// `edit` runs on a copy of the shadow without holding the lock, so it
    /// may read the store. The edited copy then replaces the shadow.
    pub fn stage<F>(&self, edit: F)
    where
        F: FnOnce(&mut T),
    {
        let mut draft = self.lock().shadow.clone();
        edit(&mut draft);
        self.lock().shadow = draft;
    }

    /// Validate the shadow and, on success, promote it to active.
    ///
    /// On success the derived fields are recomputed and the generation
    /// counter is incremented. On failure nothing changes and the validator's
    /// error is returned.
    pub fn commit<E, V>(&self, validate: V) -> Result<(), E>
    where
        V: FnOnce(&T) -> Result<(), E>,
    {
        let mut guard = self.lock();
        validate(&guard.shadow)?;
        let copies = &mut *guard;
        copies.active.clone_from(&copies.shadow);
        copies.active.refresh_derived();
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// `begin_write`, `stage` and `commit` in one call
    pub fn update<E, S, V>(&self, stage: S, validate: V) -> Result<(), E>
    where
        S: FnOnce(&mut T),
        V: FnOnce(&T) -> Result<(), E>,
    {
        self.begin_write();
        self.stage(stage);
        self.commit(validate)
    }

    /// Number of successful commits so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}
