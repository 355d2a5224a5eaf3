// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail, ensure};
use serde::{Deserialize, Serialize};

use crate::device::registry::{DeviceDirectory, DeviceKey};

/// `HA_ManagerId` / `HA_Identifier` hold 16 bytes including the NUL.
pub const MAX_ADAPTER_STRING: usize = 15;

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct Config {
    /// `cNtNdN` → host device node serving that triple.
    #[serde(rename = "Devices", default)]
    pub devices: BTreeMap<String, DeviceEntry>,
    /// What HA_INQUIRY reports about the single host adapter.
    #[serde(rename = "Adapter", default)]
    pub adapter: AdapterConfig,

    #[serde(skip)]
    resolved: HashMap<DeviceKey, PathBuf>,
}

/// A device entry: either the path itself or the legacy section form with
/// a `Device` key.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum DeviceEntry {
    Path(PathBuf),
    Section {
        #[serde(rename = "Device")]
        device: PathBuf,
    },
}

impl DeviceEntry {
    pub fn path(&self) -> &Path {
        match self {
            DeviceEntry::Path(p) => p,
            DeviceEntry::Section { device } => device,
        }
    }
}

/// Host adapter identity reported through HA_INQUIRY.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    #[serde(rename = "ScsiId", default = "default_scsi_id")]
    /// SCSI id of the adapter itself.
    pub scsi_id: u8,

    #[serde(rename = "ManagerId", default = "default_manager_id")]
    /// ASPI manager name, at most 15 characters.
    pub manager_id: String,

    #[serde(rename = "Identifier", default = "default_identifier")]
    /// Host adapter name, at most 15 characters.
    pub identifier: String,

    #[serde(rename = "MaxTransferLength", default = "default_max_transfer")]
    /// Reported in bytes 4..8 of `HA_Unique`.
    pub max_transfer_length: u32,

    #[serde(rename = "ExtBufferSize", default = "default_ext_buffer")]
    pub ext_buffer_size: u16,
}

fn default_scsi_id() -> u8 {
    7
}

fn default_manager_id() -> String {
    "ASPI for Linux".to_string()
}

fn default_identifier() -> String {
    "sg host".to_string()
}

fn default_max_transfer() -> u32 {
    0x2_0000
}

fn default_ext_buffer() -> u16 {
    0x2000
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            scsi_id: default_scsi_id(),
            manager_id: default_manager_id(),
            identifier: default_identifier(),
            max_transfer_length: default_max_transfer(),
            ext_buffer_size: default_ext_buffer(),
        }
    }
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        Self::from_yaml(&s)
    }

    pub fn from_yaml(s: &str) -> Result<Self> {
        let mut cfg: Config =
            serde_yaml::from_str(s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and builds the device lookup table.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        let a = &self.adapter;
        ensure!(a.scsi_id <= 7, "ScsiId must be in 0..=7");
        for (name, value) in [("ManagerId", &a.manager_id), ("Identifier", &a.identifier)] {
            ensure!(value.is_ascii(), "{name} must be ASCII");
            ensure!(
                value.len() <= MAX_ADAPTER_STRING,
                "{name} must be at most {MAX_ADAPTER_STRING} characters"
            );
        }

        let mut resolved = HashMap::with_capacity(self.devices.len());
        for (name, entry) in &self.devices {
            let key = parse_device_key(name)?;
            ensure!(
                !entry.path().as_os_str().is_empty(),
                "device {name}: empty path"
            );
            if resolved.insert(key, entry.path().to_path_buf()).is_some() {
                bail!("device {key} configured twice");
            }
        }
        self.resolved = resolved;

        Ok(())
    }
}

impl DeviceDirectory for Config {
    fn device_path(&self, key: DeviceKey) -> Option<PathBuf> {
        self.resolved.get(&key).cloned()
    }
}

/// Parses `c0t2d0`, also in the legacy `scsi c0t2d0` spelling.
pub fn parse_device_key(name: &str) -> Result<DeviceKey> {
    let s = name.trim();
    let s = s
        .strip_prefix("scsi ")
        .or_else(|| s.strip_prefix("SCSI "))
        .unwrap_or(s)
        .trim_start()
        .to_ascii_lowercase();

    let bad = || anyhow!("invalid device name {name:?}, expected cNtNdN");
    let rest = s.strip_prefix('c').ok_or_else(bad)?;
    let (adapter, rest) = rest.split_once('t').ok_or_else(bad)?;
    let (target, lun) = rest.split_once('d').ok_or_else(bad)?;

    let num = |v: &str| v.parse::<u8>().map_err(|_| bad());
    Ok(DeviceKey::new(num(adapter)?, num(target)?, num(lun)?))
}
