// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result, bail};
use aspi_sg::{
    cfg::{
        cli::{InquiryArgs, resolve_config_path},
        config::Config,
        logger::init_logger,
    },
    control_block::inquiry::parse_inquiry_standard,
    engine::aspi::Aspi,
    memory::{
        guest::{FarPtr, GuestMemory},
        resolver::AddressingMode,
    },
    models::{
        request::RequestFlags,
        sense_data::SenseData,
        srb::{SRB_EXEC_FIXED_LEN, SRB_HA_INQUIRY_LEN, SrbExecBuilder, SrbHaInquiry},
        status::Status,
    },
};
use clap::Parser;
use tracing::info;
use zerocopy::{FromBytes, IntoBytes};

/// One real-mode megabyte.
const GUEST_MEMORY_SIZE: usize = 0x10_0000;
const SRB_BASE: usize = 0x1_0000;
const DATA_BASE: usize = 0x2_0000;
const WINDOW: usize = 0x1000;
const SENSE_LEN: u8 = 14;

/// Far pointer to `base` the way a caller in `mode` would hold it.
fn far_ptr(memory: &mut GuestMemory, mode: AddressingMode, base: usize) -> Result<FarPtr> {
    Ok(match mode {
        AddressingMode::RealMode => FarPtr::new((base >> 4) as u16, (base & 0xF) as u16),
        AddressingMode::Protected16 => FarPtr::new(memory.alloc_selector(base, WINDOW)?, 0),
    })
}

fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn main() -> Result<()> {
    let args = InquiryArgs::parse();
    let _init_logger = init_logger(&args.logger)?;

    let config = resolve_config_path(&args.config)
        .and_then(Config::load_from_file)
        .context("failed to resolve or load config")?;

    let aspi = Aspi::from_config(config);
    let mode = AddressingMode::from(args.mode);
    let mut memory = GuestMemory::new(GUEST_MEMORY_SIZE);
    let srb = far_ptr(&mut memory, mode, SRB_BASE)?;
    let data = far_ptr(&mut memory, mode, DATA_BASE)?;

    let info = aspi.support_info();
    info!(support_info = info, version = aspi.dll_version(), "ASPI manager");

    // HA_INQUIRY
    memory.write(SRB_BASE, SrbHaInquiry::default().as_bytes());
    let status = aspi.send_command(srb, &mut memory, mode);
    let ha = SrbHaInquiry::read_from_bytes(memory.read(SRB_BASE, SRB_HA_INQUIRY_LEN))
        .map_err(|e| anyhow::anyhow!("HA_INQUIRY block: {e}"))?;
    println!(
        "adapter: {} / {} (scsi id {}, {status})",
        c_string(&ha.manager_id),
        c_string(&ha.identifier),
        ha.ha_scsi_id
    );

    // EXEC_SCSI_CMD: standard or VPD INQUIRY
    let key = args.device;
    let cdb = args.cdb();
    let block = SrbExecBuilder::new(key.adapter, key.target, key.lun)
        .flags(RequestFlags::DIR_IN)
        .data(data, u32::from(args.alloc))
        .sense_len(SENSE_LEN)
        .cdb(&cdb)
        .build();
    memory.write(SRB_BASE, &block);

    let status = aspi.send_command(srb, &mut memory, mode);
    info!(%key, %status, "INQUIRY done");

    if status != Status::Complete {
        let sense = memory.read(SRB_BASE + SRB_EXEC_FIXED_LEN + cdb.len(), SENSE_LEN as usize);
        if let Ok(parsed) = SenseData::parse(sense) {
            println!("sense: {parsed:?}");
        }
        bail!("INQUIRY to {key} failed: {status}");
    }

    let response = memory.read(DATA_BASE, args.alloc as usize);
    if let Some(page) = args.vpd {
        let page_len = match response {
            [_, _, hi, lo, ..] => usize::from(u16::from_be_bytes([*hi, *lo])),
            _ => 0,
        };
        let end = (4 + page_len).min(response.len());
        println!("{key}: VPD page {page:#04x}: {}", hex::encode(&response[..end]));
        return Ok(());
    }

    let inq = parse_inquiry_standard(response)?;
    println!("{key}: {} {} {}", inq.vendor_id, inq.product_id, inq.product_rev);
    println!("type: {}", inq.device_type_str());
    Ok(())
}
