// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    io,
    sync::{Arc, Mutex},
};

use aspi_sg::{
    control_block::{
        inquiry::{build_inquiry, parse_inquiry_standard},
        test_unit_ready::build_test_unit_ready,
    },
    device::registry::DeviceKey,
    memory::{
        guest::{FarPtr, GuestMemory},
        resolver::AddressingMode,
    },
    models::{
        request::{BufferDescriptor, CommandRequest},
        status::Status,
        wire::SG_HEADER_LEN,
    },
};
use hex_literal::hex;

use super::common::{CountingOpener, FakeSg, Step, engine};

const DATA: FarPtr = FarPtr::new(0x2000, 0x0000);
const DATA_LINEAR: usize = 0x2_0000;
const SENSE: FarPtr = FarPtr::new(0x3000, 0x0000);
const SENSE_LINEAR: usize = 0x3_0000;
const REAL: AddressingMode = AddressingMode::RealMode;

fn memory() -> GuestMemory {
    let mut mem = GuestMemory::new(0x10_0000);
    mem.write(DATA_LINEAR, &[0xCC; 0x200]);
    mem.write(SENSE_LINEAR, &[0xCC; 0x20]);
    mem
}

fn tur(target: u8) -> CommandRequest {
    CommandRequest::new(0, target, 0).cdb(&build_test_unit_ready(0))
}

fn inquiry_response() -> Vec<u8> {
    let mut b = vec![0u8; 36];
    b[0] = 0x05;
    b[2] = 0x05;
    b[3] = 0x02;
    b[4] = 31;
    b[8..16].copy_from_slice(b"LINUX   ");
    b[16..32].copy_from_slice(b"VIRTUAL CDROM   ");
    b[32..36].copy_from_slice(b"1.00");
    b
}

#[test]
fn empty_command_block_opens_nothing() {
    let opener = CountingOpener::default();
    let aspi = engine(&opener);
    let mut mem = memory();

    let mut req = CommandRequest::new(0, 2, 0).read_into(BufferDescriptor::new(DATA, 36));
    assert_eq!(aspi.submit(&mut req, &mut mem, REAL), Status::InvalidRequest);
    assert_eq!(req.status, Status::InvalidRequest);
    assert_eq!(opener.opens(), 0);
    assert!(opener.device.writes().is_empty());
}

#[test]
fn second_request_reuses_the_open_device() {
    let opener = CountingOpener::default();
    opener.device.push(Step::ok(&[])).push(Step::ok(&[]));
    let aspi = engine(&opener);
    let mut mem = memory();

    for _ in 0..2 {
        let mut req = tur(2);
        assert_eq!(aspi.submit(&mut req, &mut mem, REAL), Status::Complete);
    }
    assert_eq!(opener.opens(), 1);
    assert_eq!(aspi.registry().len(), 1);
    assert_eq!(aspi.registry().stats().hits, 1);
}

#[test]
fn sense_copy_is_bounded_by_what_the_device_sent() {
    let opener = CountingOpener::default();
    opener
        .device
        .push(Step::sense(&hex!("70 00 06 00 00 00 00 00")));
    let aspi = engine(&opener);
    let mut mem = memory();

    let mut req = tur(2).sense_into(BufferDescriptor::new(SENSE, 20));
    req.host_status = 0xFF;
    req.target_status = 0xFF;
    assert_eq!(aspi.submit(&mut req, &mut mem, REAL), Status::Complete);

    let sense = mem.read(SENSE_LINEAR, 20);
    assert_eq!(&sense[..8], &hex!("70 00 06 00 00 00 00 00"));
    assert!(sense[8..].iter().all(|&b| b == 0xCC));
    assert_eq!((req.host_status, req.target_status), (0, 0));
}

#[test]
fn zero_length_data_in_moves_no_payload() {
    let opener = CountingOpener::default();
    opener.device.push(Step::ok(&[]));
    let aspi = engine(&opener);
    let mut mem = memory();

    let mut req = CommandRequest::new(0, 2, 0)
        .cdb(&build_inquiry(0))
        .read_into(BufferDescriptor::new(DATA, 0));
    assert_eq!(aspi.submit(&mut req, &mut mem, REAL), Status::Complete);

    let writes = opener.device.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].len(), SG_HEADER_LEN + 6);
    assert_eq!(FakeSg::header_of(&writes[0]).reply_len.get(), SG_HEADER_LEN as i32);
    assert_eq!(mem.read(DATA_LINEAR, 1), &[0xCC]);
}

#[test]
fn inquiry_fills_the_caller_buffer() {
    let opener = CountingOpener::default();
    opener.device.push(Step::ok(&inquiry_response()));
    let aspi = engine(&opener);
    let mut mem = memory();

    let mut req = CommandRequest::new(0, 2, 0)
        .cdb(&build_inquiry(36))
        .read_into(BufferDescriptor::new(DATA, 36));
    assert_eq!(aspi.submit(&mut req, &mut mem, REAL), Status::Complete);

    let writes = opener.device.writes();
    assert_eq!(writes[0].len(), SG_HEADER_LEN + 6);
    assert_eq!(
        FakeSg::header_of(&writes[0]).reply_len.get(),
        (SG_HEADER_LEN + 36) as i32
    );
    assert_eq!(&writes[0][SG_HEADER_LEN..], &build_inquiry(36));

    let inq = parse_inquiry_standard(mem.read(DATA_LINEAR, 36)).expect("inquiry");
    assert_eq!(inq.vendor_id, "LINUX");
    assert_eq!(inq.product_id, "VIRTUAL CDROM");
    assert_eq!(mem.read(DATA_LINEAR + 36, 1), &[0xCC]);
}

#[test]
fn data_out_payload_follows_the_command_block() {
    let opener = CountingOpener::default();
    opener.device.push(Step::ok(&[]));
    let aspi = engine(&opener);
    let mut mem = memory();
    mem.write(DATA_LINEAR, &[0x5A; 512]);

    let cdb = hex!("2A 00 00 00 00 10 00 00 01 00");
    let mut req = CommandRequest::new(0, 3, 0)
        .cdb(&cdb)
        .write_from(BufferDescriptor::new(DATA, 512));
    assert_eq!(aspi.submit(&mut req, &mut mem, REAL), Status::Complete);

    let writes = opener.device.writes();
    assert_eq!(writes[0].len(), SG_HEADER_LEN + 10 + 512);
    assert_eq!(FakeSg::header_of(&writes[0]).reply_len.get(), SG_HEADER_LEN as i32);
    assert!(writes[0][SG_HEADER_LEN + 10..].iter().all(|&b| b == 0x5A));
}

#[test]
fn short_write_fails_and_copies_nothing() {
    let opener = CountingOpener::default();
    opener.device.push(Step::ShortWrite(10));
    let aspi = engine(&opener);
    let mut mem = memory();

    let mut req = CommandRequest::new(0, 2, 0)
        .cdb(&build_inquiry(36))
        .read_into(BufferDescriptor::new(DATA, 36))
        .sense_into(BufferDescriptor::new(SENSE, 14));
    assert_eq!(aspi.submit(&mut req, &mut mem, REAL), Status::Error);
    assert!(mem.read(DATA_LINEAR, 36).iter().all(|&b| b == 0xCC));
    assert!(mem.read(SENSE_LINEAR, 14).iter().all(|&b| b == 0xCC));
}

#[test]
fn short_read_fails() {
    let opener = CountingOpener::default();
    opener.device.push(Step::ShortRead(SG_HEADER_LEN));
    let aspi = engine(&opener);
    let mut mem = memory();

    let mut req = CommandRequest::new(0, 2, 0)
        .cdb(&build_inquiry(36))
        .read_into(BufferDescriptor::new(DATA, 36));
    assert_eq!(aspi.submit(&mut req, &mut mem, REAL), Status::Error);
}

#[test]
fn unconfigured_device_is_an_error() {
    let opener = CountingOpener::default();
    let aspi = engine(&opener);
    let mut mem = memory();

    let mut req = tur(5);
    assert_eq!(aspi.submit(&mut req, &mut mem, REAL), Status::Error);
    assert_eq!(opener.opens(), 0);
}

#[test]
fn open_failure_is_an_error_and_is_retried() {
    let opener = CountingOpener {
        fail: Some(io::ErrorKind::PermissionDenied),
        ..Default::default()
    };
    let aspi = engine(&opener);
    let mut mem = memory();

    for _ in 0..2 {
        let mut req = tur(2);
        assert_eq!(aspi.submit(&mut req, &mut mem, REAL), Status::Error);
    }
    assert_eq!(opener.opens(), 2);
    assert!(aspi.registry().is_empty());
}

#[test]
fn busy_device_reports_busy() {
    let opener = CountingOpener::default();
    opener
        .device
        .push(Step::WriteError(io::ErrorKind::ResourceBusy))
        .push(Step::WriteError(io::ErrorKind::BrokenPipe));
    let aspi = engine(&opener);
    let mut mem = memory();

    let mut req = tur(2);
    assert_eq!(aspi.submit(&mut req, &mut mem, REAL), Status::Busy);
    let mut req = tur(2);
    assert_eq!(aspi.submit(&mut req, &mut mem, REAL), Status::Error);
}

#[test]
fn nonzero_device_result_is_an_error() {
    let opener = CountingOpener::default();
    opener.device.push(Step::failed(16));
    let aspi = engine(&opener);
    let mut mem = memory();

    let mut req = CommandRequest::new(0, 2, 0)
        .cdb(&build_inquiry(36))
        .read_into(BufferDescriptor::new(DATA, 36));
    req.host_status = 0xAA;
    assert_eq!(aspi.submit(&mut req, &mut mem, REAL), Status::Error);
    assert_eq!(req.host_status, 0xAA);
    assert!(mem.read(DATA_LINEAR, 36).iter().all(|&b| b == 0xCC));
}

#[test]
fn unresolvable_or_overlapping_buffers_are_invalid() {
    let opener = CountingOpener::default();
    let aspi = engine(&opener);
    let mut mem = memory();

    let mut req = tur(2).sense_into(BufferDescriptor::new(FarPtr::NULL, 14));
    assert_eq!(aspi.submit(&mut req, &mut mem, REAL), Status::InvalidRequest);

    let mut req = CommandRequest::new(0, 2, 0)
        .cdb(&build_inquiry(36))
        .read_into(BufferDescriptor::new(DATA, 36))
        .sense_into(BufferDescriptor::new(DATA.add(8), 14));
    assert_eq!(aspi.submit(&mut req, &mut mem, REAL), Status::InvalidRequest);
    assert_eq!(opener.opens(), 0);
}

#[test]
fn posting_runs_after_the_status_is_final() {
    let opener = CountingOpener::default();
    opener.device.push(Step::ok(&[])).push(Step::ShortWrite(0));
    let aspi = engine(&opener);
    let mut mem = memory();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    aspi.post_routines().register(0x8010, move |ctx| {
        sink.lock()
            .expect("lock")
            .push((ctx.srb, ctx.request.status));
    });

    let entry = FarPtr::new(0x0800, 0x0010);
    let mut req = tur(2).post_to(entry);
    assert_eq!(aspi.submit(&mut req, &mut mem, REAL), Status::Complete);
    let mut req = tur(2).post_to(entry);
    assert_eq!(aspi.submit(&mut req, &mut mem, REAL), Status::Error);

    // rejected before any exchange: no post
    let mut req = CommandRequest::new(0, 2, 0).post_to(entry);
    assert_eq!(aspi.submit(&mut req, &mut mem, REAL), Status::InvalidRequest);

    assert_eq!(
        *seen.lock().expect("lock"),
        vec![
            (FarPtr::NULL, Status::Complete),
            (FarPtr::NULL, Status::Error)
        ]
    );
}

#[test]
fn missing_device_is_not_posted() {
    let opener = CountingOpener {
        fail: Some(io::ErrorKind::NotFound),
        ..Default::default()
    };
    let aspi = engine(&opener);
    let mut mem = memory();

    let calls = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&calls);
    aspi.post_routines().register(0x8010, move |_| {
        *sink.lock().expect("lock") += 1;
    });

    let entry = FarPtr::new(0x0800, 0x0010);
    // not configured
    let mut req = tur(5).post_to(entry);
    assert_eq!(aspi.submit(&mut req, &mut mem, REAL), Status::Error);
    // configured but the node cannot be opened
    let mut req = tur(2).post_to(entry);
    assert_eq!(aspi.submit(&mut req, &mut mem, REAL), Status::Error);

    assert_eq!(req.status, Status::Error);
    assert_eq!(*calls.lock().expect("lock"), 0);
    assert_eq!(opener.opens(), 1);
}

#[test]
fn request_key_matches_registry_key() {
    assert_eq!(tur(2).key(), DeviceKey::new(0, 2, 0));
}
