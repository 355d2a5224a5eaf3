// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    io::{self, Read, Write},
    panic::{AssertUnwindSafe, catch_unwind},
    path::Path,
    sync::{Arc, Mutex},
};

use aspi_sg::{
    cfg::config::Config,
    control_block::inquiry::build_inquiry,
    device::registry::DeviceOpener,
    engine::{aspi::Aspi, notifier::PostRoutineTable},
    memory::{
        guest::{FarPtr, GuestMemory},
        resolver::AddressingMode,
    },
    models::{
        request::RequestFlags,
        srb::{
            SRB_EXEC_FIXED_LEN, SRB_EXEC_HA_STATUS_OFFSET, SRB_EXEC_TARGET_STATUS_OFFSET,
            SRB_HA_INQUIRY_LEN, SRB_STATUS_OFFSET, SrbExecBuilder, SrbHaInquiry,
        },
        status::Status,
    },
};
use hex_literal::hex;
use zerocopy::{FromBytes, IntoBytes};

use super::common::{CountingOpener, DEVICES, Step, engine};

const SRB_LINEAR: usize = 0x1_0000;
const DATA_LINEAR: usize = 0x2_0000;
const ENTRY_LINEAR: usize = 0x8010;

/// What a post routine observed: the pointer it got, the descriptor base
/// behind it (if it is a live selector) and the SRB status byte it read
/// through that pointer.
type Seen = Arc<Mutex<Vec<(FarPtr, Option<usize>, u8)>>>;

fn recording(routines: &PostRoutineTable) -> Seen {
    let seen: Seen = Arc::default();
    let sink = Arc::clone(&seen);
    routines.register(ENTRY_LINEAR, move |ctx| {
        let base = ctx.memory.descriptor(ctx.srb.segment()).ok().map(|d| d.base);
        let status = base
            .map(|b| ctx.memory.read(b + ctx.srb.offset() as usize + SRB_STATUS_OFFSET, 1)[0])
            .unwrap_or_default();
        sink.lock().expect("lock").push((ctx.srb, base, status));
    });
    seen
}

fn inquiry_srb(data: FarPtr, entry: Option<FarPtr>) -> Vec<u8> {
    let mut flags = RequestFlags::DIR_IN;
    let mut b = SrbExecBuilder::new(0, 2, 0)
        .data(data, 36)
        .sense_len(14)
        .cdb(&build_inquiry(36));
    if let Some(entry) = entry {
        flags |= RequestFlags::POSTING;
        b = b.post_proc(entry);
    }
    b.flags(flags).build()
}

#[test]
fn exec_writes_status_and_sense_back_into_the_block() {
    let opener = CountingOpener::default();
    opener.device.push(Step::Reply {
        result: 0,
        sense: hex!("70 00 00 00 00 00 00 06 00 00 00 00 00 00").to_vec(),
        payload: vec![0x1F; 36],
    });
    let aspi = engine(&opener);
    let mut mem = GuestMemory::new(0x10_0000);

    let mut block = inquiry_srb(FarPtr::new(0x2000, 0), None);
    block[SRB_EXEC_HA_STATUS_OFFSET] = 0xEE;
    block[SRB_EXEC_TARGET_STATUS_OFFSET] = 0xEE;
    mem.write(SRB_LINEAR, &block);

    let status = aspi.send_command(FarPtr::new(0x1000, 0), &mut mem, AddressingMode::RealMode);
    assert_eq!(status, Status::Complete);

    let srb = mem.read(SRB_LINEAR, block.len());
    assert_eq!(srb[SRB_STATUS_OFFSET], 0x01);
    assert_eq!(srb[SRB_EXEC_HA_STATUS_OFFSET], 0x00);
    assert_eq!(srb[SRB_EXEC_TARGET_STATUS_OFFSET], 0x00);
    assert_eq!(
        &srb[SRB_EXEC_FIXED_LEN + 6..],
        &hex!("70 00 00 00 00 00 00 06 00 00 00 00 00 00")
    );
    assert!(mem.read(DATA_LINEAR, 36).iter().all(|&b| b == 0x1F));
}

#[test]
fn oversized_command_block_is_rejected_in_place() {
    let opener = CountingOpener::default();
    let aspi = engine(&opener);
    let mut mem = GuestMemory::new(0x10_0000);

    let block = SrbExecBuilder::new(0, 2, 0).cdb(&[0u8; 17]).build();
    mem.write(SRB_LINEAR, &block);

    let status = aspi.send_command(FarPtr::new(0x1000, 0), &mut mem, AddressingMode::RealMode);
    assert_eq!(status, Status::InvalidRequest);
    assert_eq!(mem.read(SRB_LINEAR + SRB_STATUS_OFFSET, 1), &[0xE0]);
    assert_eq!(opener.opens(), 0);
}

#[test]
fn real_mode_post_routine_gets_a_temporary_alias() {
    let opener = CountingOpener::default();
    opener.device.push(Step::ok(&[0u8; 36]));
    let aspi = engine(&opener);
    let seen = recording(aspi.post_routines());
    let mut mem = GuestMemory::new(0x10_0000);

    let srb = FarPtr::new(0x1000, 0);
    mem.write(
        SRB_LINEAR,
        &inquiry_srb(FarPtr::new(0x2000, 0), Some(FarPtr::new(0x0800, 0x0010))),
    );
    assert_eq!(
        aspi.send_command(srb, &mut mem, AddressingMode::RealMode),
        Status::Complete
    );

    let seen = seen.lock().expect("lock").clone();
    assert_eq!(seen.len(), 1);
    let (alias, base, status) = seen[0];
    assert_ne!(alias, srb);
    assert_eq!(alias.offset(), 0);
    assert_eq!(base, Some(SRB_LINEAR));
    assert_eq!(status, 0x01);
    // released after the call
    assert!(mem.descriptor(alias.segment()).is_err());
}

#[test]
fn protected_mode_post_routine_gets_the_original_pointer() {
    let opener = CountingOpener::default();
    opener.device.push(Step::failed(1));
    let aspi = engine(&opener);
    let seen = recording(aspi.post_routines());
    let mut mem = GuestMemory::new(0x10_0000);

    let srb_sel = mem.alloc_selector(SRB_LINEAR, 0x100).expect("selector");
    let data_sel = mem.alloc_selector(DATA_LINEAR, 0x100).expect("selector");
    let code_sel = mem.alloc_selector(0x8000, 0x100).expect("selector");

    let srb = FarPtr::new(srb_sel, 0);
    mem.write(
        SRB_LINEAR,
        &inquiry_srb(FarPtr::new(data_sel, 0), Some(FarPtr::new(code_sel, 0x0010))),
    );
    assert_eq!(
        aspi.send_command(srb, &mut mem, AddressingMode::Protected16),
        Status::Error
    );

    let seen = seen.lock().expect("lock").clone();
    assert_eq!(seen, vec![(srb, Some(SRB_LINEAR), 0x04)]);
    assert!(mem.descriptor(srb_sel).is_ok());
}

#[test]
fn protected_mode_rejects_unknown_selectors() {
    let opener = CountingOpener::default();
    let aspi = engine(&opener);
    let mut mem = GuestMemory::new(0x10_0000);

    let srb_sel = mem.alloc_selector(SRB_LINEAR, 0x100).expect("selector");
    mem.write(SRB_LINEAR, &inquiry_srb(FarPtr::new(0x00F7, 0), None));

    let status = aspi.send_command(FarPtr::new(srb_sel, 0), &mut mem, AddressingMode::Protected16);
    assert_eq!(status, Status::InvalidRequest);
    assert_eq!(mem.read(SRB_LINEAR + SRB_STATUS_OFFSET, 1), &[0xE0]);
    assert_eq!(opener.opens(), 0);
}

#[test]
fn ha_inquiry_through_a_selector() {
    let opener = CountingOpener::default();
    let aspi = engine(&opener);
    let mut mem = GuestMemory::new(0x10_0000);

    let sel = mem.alloc_selector(SRB_LINEAR, SRB_HA_INQUIRY_LEN).expect("selector");
    mem.write(SRB_LINEAR, SrbHaInquiry::default().as_bytes());

    assert_eq!(
        aspi.send_command(FarPtr::new(sel, 0), &mut mem, AddressingMode::Protected16),
        Status::Complete
    );
    let inq = SrbHaInquiry::read_from_bytes(mem.read(SRB_LINEAR, SRB_HA_INQUIRY_LEN))
        .expect("layout");
    assert_eq!(inq.status, 0x01);
    assert_eq!(&inq.identifier[..8], b"sg host\0");
    assert_eq!(
        u32::from_le_bytes([inq.unique[4], inq.unique[5], inq.unique[6], inq.unique[7]]),
        0x2_0000
    );
}

/// A device that dies in the middle of the exchange.
struct DiesOnWrite;

impl Write for DiesOnWrite {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        panic!("device died mid-exchange");
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for DiesOnWrite {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }
}

struct DiesOnWriteOpener;

impl DeviceOpener for DiesOnWriteOpener {
    type Io = DiesOnWrite;

    fn open(&self, _path: &Path) -> io::Result<DiesOnWrite> {
        Ok(DiesOnWrite)
    }
}

#[test]
fn block_reads_pending_while_the_exchange_runs() {
    let config = Config::from_yaml(DEVICES).expect("test config");
    let adapter = config.adapter.clone();
    let aspi = Aspi::new(DiesOnWriteOpener, config, adapter);
    let mut mem = GuestMemory::new(0x10_0000);

    let mut block = inquiry_srb(FarPtr::new(0x2000, 0), None);
    // stale status from an earlier failure
    block[SRB_STATUS_OFFSET] = 0x04;
    mem.write(SRB_LINEAR, &block);

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        aspi.send_command(FarPtr::new(0x1000, 0), &mut mem, AddressingMode::RealMode)
    }));
    assert!(outcome.is_err());
    assert_eq!(mem.read(SRB_LINEAR + SRB_STATUS_OFFSET, 1), &[0x00]);
}
