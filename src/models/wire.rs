// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Wire format of the Linux generic SCSI driver (`struct sg_header`).
//!
//! Outbound: header, CDB, then the Data-Out payload for host-to-target
//! transfers. Inbound: header (result + 16 sense bytes), then the Data-In
//! payload for target-to-host transfers. All integers are host-endian.

use core::fmt;

use anyhow::{Result, anyhow, bail};
use bytes::{Bytes, BytesMut};
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, NativeEndian, I32, U32,
};

/// Capacity of the sense area carried in every reply header.
pub const SG_MAX_SENSE: usize = 16;
/// `sizeof(struct sg_header)`.
pub const SG_HEADER_LEN: usize = 36;

/// `struct sg_header`, identical in both directions.
#[repr(C)]
#[derive(Default, Clone, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct SgHeader {
    pub pack_len: I32<NativeEndian>,      // 0..4
    pub reply_len: I32<NativeEndian>,     // 4..8
    pub pack_id: I32<NativeEndian>,       // 8..12
    pub result: I32<NativeEndian>,        // 12..16
    pub flags: U32<NativeEndian>,         // 16..20, bit0 = twelve_byte
    pub sense_buffer: [u8; SG_MAX_SENSE], // 20..36
}

const _: () = assert!(core::mem::size_of::<SgHeader>() == SG_HEADER_LEN);

impl fmt::Debug for SgHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SgHeader")
            .field("pack_len", &self.pack_len.get())
            .field("reply_len", &self.reply_len.get())
            .field("pack_id", &self.pack_id.get())
            .field("result", &self.result.get())
            .field("flags", &format_args!("{:#x}", self.flags.get()))
            .field("sense", &hex::encode(self.sense_buffer))
            .finish()
    }
}

impl SgHeader {
    /// Number of meaningful bytes in `sense_buffer`.
    ///
    /// Fixed (0x70/0x71) and descriptor (0x72/0x73) sense data declare
    /// `8 + additional length` bytes; anything else means the device sent
    /// none.
    pub fn sense_len(&self) -> usize {
        match self.sense_buffer[0] & 0x7F {
            0x70..=0x73 => (8 + self.sense_buffer[7] as usize).min(SG_MAX_SENSE),
            _ => 0,
        }
    }
}

/// Outbound message, ready for a single `write(2)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    bytes: Bytes,
    reply_len: usize,
}

impl WireMessage {
    /// Assembles header + CDB + optional Data-Out payload.
    ///
    /// `reply_len` is the exact number of bytes the device will hand back.
    pub fn assemble(cdb: &[u8], payload: &[u8], reply_len: usize) -> Result<Self> {
        let reply_len_i32 =
            i32::try_from(reply_len).map_err(|_| anyhow!("reply too large: {reply_len}"))?;
        let header = SgHeader {
            reply_len: I32::new(reply_len_i32),
            ..Default::default()
        };

        let mut buf = BytesMut::with_capacity(SG_HEADER_LEN + cdb.len() + payload.len());
        buf.extend_from_slice(header.as_bytes());
        buf.extend_from_slice(cdb);
        buf.extend_from_slice(payload);
        Ok(Self {
            bytes: buf.freeze(),
            reply_len,
        })
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Reply size announced in the header.
    #[inline]
    pub fn reply_len(&self) -> usize {
        self.reply_len
    }

    pub fn header(&self) -> Result<SgHeader> {
        SgHeader::read_from_prefix(&self.bytes)
            .map(|(h, _)| h)
            .map_err(|e| anyhow!("failed to read sg header: {e}"))
    }
}

/// Inbound message: header plus whatever Data-In payload followed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyMessage {
    pub header: SgHeader,
    pub payload: Bytes,
}

impl ReplyMessage {
    pub fn from_bytes(raw: Bytes) -> Result<Self> {
        if raw.len() < SG_HEADER_LEN {
            bail!("reply shorter than sg header: {} < {SG_HEADER_LEN}", raw.len());
        }
        let (header, _) = SgHeader::read_from_prefix(&raw)
            .map_err(|e| anyhow!("failed to read sg header: {e}"))?;
        Ok(Self {
            header,
            payload: raw.slice(SG_HEADER_LEN..),
        })
    }

    /// Builds a reply the way the driver lays it out. Used by fake devices.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SG_HEADER_LEN + self.payload.len());
        out.extend_from_slice(self.header.as_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    #[inline]
    pub fn result(&self) -> i32 {
        self.header.result.get()
    }

    /// Valid sense bytes, at most [`SG_MAX_SENSE`].
    #[inline]
    pub fn sense(&self) -> &[u8] {
        &self.header.sense_buffer[..self.header.sense_len()]
    }
}
