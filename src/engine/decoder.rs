// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tracing::warn;

use crate::models::{
    request::{CommandRequest, Direction},
    status::Status,
    wire::{ReplyMessage, SG_MAX_SENSE},
};

/// What a reply did to the caller's buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    pub status: Status,
    pub data_copied: usize,
    pub sense_copied: usize,
    /// Device result code, verbatim.
    pub result: i32,
}

/// Copies a reply into the caller's buffers.
///
/// `data` and `sense` are the already resolved caller windows; their lengths
/// are the declared capacities, so nothing is written past them. A nonzero
/// device result leaves both untouched.
pub fn decode(
    reply: &ReplyMessage,
    request: &CommandRequest,
    data: Option<&mut [u8]>,
    sense: Option<&mut [u8]>,
) -> Decoded {
    let result = reply.result();
    if result != 0 {
        warn!(result, "reply header error");
        return Decoded {
            status: Status::Error,
            data_copied: 0,
            sense_copied: 0,
            result,
        };
    }

    let data_copied = match (request.direction(), data) {
        (Direction::In, Some(dst)) => copy_bounded(dst, &reply.payload),
        _ => 0,
    };

    let sense_copied = match sense {
        Some(dst) => {
            let src = reply.sense();
            let n = dst.len().min(SG_MAX_SENSE).min(src.len());
            dst[..n].copy_from_slice(&src[..n]);
            n
        },
        None => 0,
    };

    Decoded {
        status: Status::Complete,
        data_copied,
        sense_copied,
        result,
    }
}

#[inline]
fn copy_bounded(dst: &mut [u8], src: &[u8]) -> usize {
    let n = dst.len().min(src.len());
    dst[..n].copy_from_slice(&src[..n]);
    n
}
