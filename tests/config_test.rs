// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::Result;
use rust_fieldbus_monitor::config::{BaudRate, Config, Parity, TransportKind};
use rust_fieldbus_monitor::register::{FunctionKind, ValueType};
use std::fs;
use tempfile::tempdir;

#[test]
fn test_missing_file_creates_default() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    let config = Config::from_file(&config_path)?;
    assert!(config_path.exists());
    assert_eq!(config, Config::default());

    let names: Vec<_> = config.registers.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["modbus1", "modbus2", "modbus3"]);
    assert!(config.registers.iter().all(|r| !r.descriptor.enabled));
    assert_eq!(config.bus.transport, TransportKind::Rtu);
    assert_eq!(config.bus.settings.baud, BaudRate::B38400);
    assert_eq!(config.bus.settings.parity, Parity::None);

    // The written default loads back unchanged
    let reloaded = Config::from_file(&config_path)?;
    assert_eq!(reloaded, config);
    Ok(())
}

#[test]
fn test_registers_from_yaml() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(
        &config_path,
        r#"
bus:
  transport: mock
  baud: 9600
  parity: even
  imd: 20
poller:
  tick_ms: 50
registers:
  - name: flow
    enabled: true
    id: 12
    function: input_register
    address: 100
    type: float32_cdab
    scale: 3.6
  - name: pump_state
    enabled: true
    id: 12
    function: coil
    address: 3
    type: bits
    threshold:
      enabled: true
      threshold: 0.5
      hysteresis: 0.1
      alert: above
"#,
    )?;

    let config = Config::from_file(&config_path)?;
    assert_eq!(config.bus.transport, TransportKind::Mock);
    assert_eq!(config.bus.settings.baud, BaudRate::B9600);
    assert_eq!(config.bus.settings.inter_message_delay_ms, 20);
    assert_eq!(config.poller.tick_ms, 50);
    assert_eq!(config.registers.len(), 2);

    let flow = &config.registers[0].descriptor;
    assert_eq!(flow.function, FunctionKind::InputRegister);
    assert_eq!(flow.value_type.as_str(), "float32_cdab");
    assert_eq!(flow.word_count(), 2);
    assert_eq!(flow.scale, 3.6);

    let pump = &config.registers[1].descriptor;
    assert_eq!(pump.value_type, ValueType::Bits);
    assert!(pump.threshold.as_ref().map(|t| t.enabled).unwrap_or(false));
    Ok(())
}

#[test]
fn test_schema_violation_writes_sample() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(
        &config_path,
        "registers:\n  - name: bad\n    id: 300\n    type: int16\n",
    )?;

    let err = Config::from_file(&config_path).unwrap_err();
    assert!(err.to_string().contains("Configuration validation failed"));

    let sample_path = temp_dir.path().join("config.sample.yaml");
    assert!(sample_path.exists());
    let sample = Config::from_file(&sample_path)?;
    assert_eq!(sample, Config::default());
    Ok(())
}

#[test]
fn test_unknown_value_type_is_rejected() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, "registers:\n  - name: bad\n    type: int64\n")?;

    assert!(Config::from_file(&config_path).is_err());
    assert!(temp_dir.path().join("config.sample.yaml").exists());
    Ok(())
}

#[test]
fn test_duplicate_register_names_are_rejected() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(
        &config_path,
        "registers:\n  - name: level\n    address: 1\n  - name: level\n    address: 2\n",
    )?;

    let err = Config::from_file(&config_path).unwrap_err();
    assert!(err.to_string().contains("Duplicate register name"));
    Ok(())
}

#[test]
fn test_save_and_reload() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    let mut config = Config::default();
    config.apply_args(Some("/dev/ttyS3".to_string()), Some(BaudRate::B115200), None);
    config.inputs.enabled = true;
    config.inputs.voltage.sensor_fc = 5.0;
    config.save_to_file(&config_path)?;

    let loaded = Config::from_file(&config_path)?;
    assert_eq!(loaded.bus.device, "/dev/ttyS3");
    assert_eq!(loaded.bus.settings.baud, BaudRate::B115200);
    assert!(loaded.inputs.enabled);
    assert_eq!(loaded.inputs.voltage.sensor_fc, 5.0);
    assert_eq!(loaded, config);
    Ok(())
}
