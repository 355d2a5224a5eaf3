// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::io::{Read, Write};

use bytes::Bytes;
use tracing::warn;

use crate::{
    error::TransportError,
    models::wire::{ReplyMessage, SG_HEADER_LEN, WireMessage},
};

/// Anything that speaks the sg read/write protocol: a `/dev/sg*` file in
/// production, a scripted fake in tests.
pub trait SgIo: Read + Write + Send {}

impl<T: Read + Write + Send> SgIo for T {}

/// One blocking request/reply round trip.
///
/// Exactly one `write` of the whole message and one `read` of
/// `expected_reply` bytes. A partial transfer in either direction is a
/// failure; nothing is retried here.
pub fn exchange<T: SgIo + ?Sized>(
    io: &mut T,
    outbound: &WireMessage,
    expected_reply: usize,
) -> Result<ReplyMessage, TransportError> {
    let written = io.write(outbound.as_bytes()).inspect_err(|e| {
        if e.kind() == std::io::ErrorKind::OutOfMemory {
            warn!(
                "Linux generic scsi driver: the request exceeds the driver buffer \
                 (SG_BIG_BUFF); a kernel with a larger buffer is needed"
            );
        }
        warn!(errno = ?e.raw_os_error(), "write to scsi device failed");
    })?;
    if written != outbound.len() {
        warn!(
            expected = outbound.len(),
            written, "Not enough bytes written to scsi device"
        );
        return Err(TransportError::ShortWrite {
            expected: outbound.len(),
            written,
        });
    }

    let mut buf = vec![0u8; expected_reply.max(SG_HEADER_LEN)];
    let read = io.read(&mut buf)?;
    if read != buf.len() {
        warn!(expected = buf.len(), read, "not enough bytes read from scsi device");
        return Err(TransportError::ShortRead {
            expected: buf.len(),
            read,
        });
    }

    ReplyMessage::from_bytes(Bytes::from(buf)).map_err(|_| TransportError::ShortRead {
        expected: expected_reply,
        read,
    })
}
