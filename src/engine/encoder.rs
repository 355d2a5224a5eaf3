// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{
    error::AspiError,
    models::{
        request::{CommandRequest, Direction, MAX_CDB_LEN},
        wire::{SG_HEADER_LEN, WireMessage},
    },
};

/// Checks the command block before anything is allocated or opened.
pub fn validate_cdb(request: &CommandRequest) -> Result<(), AspiError> {
    if request.cdb.is_empty() {
        return Err(AspiError::InvalidRequest("zero-length command block"));
    }
    if request.cdb.len() > MAX_CDB_LEN {
        return Err(AspiError::InvalidRequest("command block longer than 16 bytes"));
    }
    Ok(())
}

/// Reply size the device has to produce for `request`.
pub fn expected_reply_len(request: &CommandRequest) -> usize {
    match request.direction() {
        Direction::In => SG_HEADER_LEN + request.data.len as usize,
        _ => SG_HEADER_LEN,
    }
}

/// Builds the outbound sg message.
///
/// `payload` is only looked at for host-to-target requests; for every other
/// direction pass an empty slice.
pub fn encode(request: &CommandRequest, payload: &[u8]) -> Result<WireMessage, AspiError> {
    validate_cdb(request)?;

    let data_out = match request.direction() {
        Direction::Out => payload,
        _ => &[],
    };
    WireMessage::assemble(&request.cdb, data_out, expected_reply_len(request))
        .map_err(|_| AspiError::InvalidRequest("data length does not fit the sg header"))
}
