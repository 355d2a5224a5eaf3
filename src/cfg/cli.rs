// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use crate::{
    cfg::config::parse_device_key,
    control_block::inquiry::{
        INQUIRY_CDB_LEN, INQUIRY_STANDARD_LEN, build_inquiry, build_inquiry_vpd,
    },
    device::registry::DeviceKey,
    memory::resolver::AddressingMode,
};

pub fn resolve_config_path(rel: &str) -> Result<PathBuf> {
    let p = Path::new(rel);

    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()
            .context("cannot get current working dir")?
            .join(p)
    };

    let canon = abs
        .canonicalize()
        .with_context(|| format!("failed to canonicalize path {abs:?}"))?;

    Ok(canon)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CallerMode {
    /// DOS real-mode caller.
    Real,
    /// Win16 protected-mode caller.
    Protected,
}

impl From<CallerMode> for AddressingMode {
    fn from(m: CallerMode) -> Self {
        match m {
            CallerMode::Real => AddressingMode::RealMode,
            CallerMode::Protected => AddressingMode::Protected16,
        }
    }
}

/// Accepts `0x80` as well as `128`.
fn parse_vpd_page(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("bad VPD page {s:?}: {e}"))
}

#[derive(Debug, Parser)]
#[command(name = "aspi-inquiry", version)]
#[command(about = "Send a standard INQUIRY to an sg device through the ASPI layer", long_about = None)]
pub struct InquiryArgs {
    /// Device triple, e.g. `c0t2d0`.
    #[arg(value_name = "cNtNdN", value_parser = parse_device_key)]
    pub device: DeviceKey,

    /// Device map and adapter settings.
    #[arg(long, value_name = "PATH", default_value = "tests/config.yaml")]
    pub config: String,

    /// Logger settings.
    #[arg(long, value_name = "PATH", default_value = "tests/config_logger.yaml")]
    pub logger: String,

    /// Addressing convention the SRB is placed with.
    #[arg(long, value_enum, default_value_t = CallerMode::Real)]
    pub mode: CallerMode,

    /// INQUIRY allocation length.
    #[arg(long, default_value_t = INQUIRY_STANDARD_LEN as u8)]
    pub alloc: u8,

    /// Ask for this VPD page instead of the standard data.
    #[arg(long, value_name = "PAGE", value_parser = parse_vpd_page)]
    pub vpd: Option<u8>,
}

impl InquiryArgs {
    pub fn cdb(&self) -> [u8; INQUIRY_CDB_LEN] {
        match self.vpd {
            Some(page) => build_inquiry_vpd(page, self.alloc),
            None => build_inquiry(self.alloc),
        }
    }
}
