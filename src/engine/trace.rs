// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Request and result dumps at `trace` level.

use tracing::{Level, enabled, trace};

use crate::{
    control_block::{
        SCAN_OPCODE,
        inquiry::{INQUIRY_OPCODE, InquiryCdb, vendor_of},
        test_unit_ready::TEST_UNIT_READY_OPCODE,
    },
    memory::guest::MemoryRange,
    models::{
        request::{CommandRequest, RequestFlags},
        sense_data::SenseData,
    },
};

/// Dumps the request as the caller filled it in. `data` is the resolved
/// data window, if any.
pub fn log_request(request: &CommandRequest, data: Option<MemoryRange>) {
    if !enabled!(Level::TRACE) {
        return;
    }

    let direction = request.direction();
    trace!(
        flags = ?request.flags,
        direction = direction.describe(),
        residual = request.flags.contains(RequestFlags::RESIDUAL),
        linking = request.flags.contains(RequestFlags::LINK),
        posting = request.posting(),
        target = request.target,
        lun = request.lun,
        buflen = request.data.len,
        senselen = request.sense.len,
        buf_ptr = ?request.data.ptr,
        buf_linear = ?data.map(|r| r.base),
        link_ptr = request.link,
        cdb_len = request.cdb.len(),
        post_proc = ?request.post_proc,
        cdb = %hex::encode(&request.cdb),
        "SCSI request"
    );

    match request.cdb.first() {
        Some(&INQUIRY_OPCODE) => {
            if let Some(inq) = InquiryCdb::parse(&request.cdb) {
                trace!(
                    evpd = inq.evpd,
                    lun = inq.lun,
                    page_code = inq.page_code,
                    allocation_len = inq.allocation_len,
                    control = inq.control,
                    "INQUIRY"
                );
            }
        },
        Some(&SCAN_OPCODE) => {
            if let Some(len) = request.cdb.get(4) {
                trace!(transfer_len = len, "SCAN");
            }
        },
        _ => {},
    }
}

/// Dumps what came back: the INQUIRY vendor, or the sense area of a
/// TEST UNIT READY.
pub fn log_result(request: &CommandRequest, data: &[u8], sense: &[u8]) {
    if !enabled!(Level::TRACE) {
        return;
    }

    match request.cdb.first() {
        Some(&INQUIRY_OPCODE) => {
            if let Some(vendor) = vendor_of(data) {
                trace!(%vendor, "Vendor");
            }
        },
        Some(&TEST_UNIT_READY_OPCODE) => {
            trace!(sense = %hex::encode(sense), "Request Sense reports");
            if let Ok(parsed) = SenseData::parse(sense) {
                trace!(?parsed, "Sense");
            }
        },
        _ => {},
    }
}
