// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use crate::{
    device::registry::DeviceKey, memory::guest::FarPtr, models::status::Status,
};

/// Longest command block an SRB may carry.
pub const MAX_CDB_LEN: usize = 16;

bitflags::bitflags! {
    #[derive(Default, Clone, Copy, PartialEq, Eq)]
    /// `SRB_Flags` byte of an EXEC_SCSI_CMD request.
    pub struct RequestFlags: u8 {
        const POSTING  = 0x01;
        const LINK     = 0x02;
        const RESIDUAL = 0x04;
        /// Target to host, length checked.
        const DIR_IN   = 0x08;
        /// Host to target, length checked.
        const DIR_OUT  = 0x10;
    }
}

impl fmt::Debug for RequestFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use RequestFlags as F;

        write!(f, "RequestFlags(")?;
        let mut sep = "";
        for (flag, name) in [
            (F::POSTING, "POSTING"),
            (F::LINK, "LINK"),
            (F::RESIDUAL, "RESIDUAL"),
            (F::DIR_IN, "DIR_IN"),
            (F::DIR_OUT, "DIR_OUT"),
        ] {
            if self.contains(flag) {
                write!(f, "{sep}{name}")?;
                sep = "|";
            }
        }
        write!(f, "{sep}{:#04x})", self.bits())
    }
}

/// Transfer direction derived from the two direction bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Device to host: the reply carries a payload.
    In,
    /// Host to device: the outbound message carries a payload.
    Out,
    /// Both bits set.
    None,
    /// Neither bit set: the command decides, length is not checked. No
    /// payload moves in either direction.
    Unchecked,
}

impl Direction {
    pub fn classify(flags: RequestFlags) -> Self {
        let dir = flags & (RequestFlags::DIR_IN | RequestFlags::DIR_OUT);
        if dir == RequestFlags::DIR_IN {
            Direction::In
        } else if dir == RequestFlags::DIR_OUT {
            Direction::Out
        } else if dir.is_empty() {
            Direction::Unchecked
        } else {
            Direction::None
        }
    }

    #[inline]
    pub fn has_payload(self) -> bool {
        matches!(self, Direction::In | Direction::Out)
    }

    pub fn describe(self) -> &'static str {
        match self {
            Direction::In => "Target to host. Length checked.",
            Direction::Out => "Host to target. Length checked.",
            Direction::None => "none",
            Direction::Unchecked => "Transfer by scsi cmd. Length not checked",
        }
    }
}

/// Caller buffer: an opaque far pointer plus the declared capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub ptr: FarPtr,
    pub len: u32,
}

impl BufferDescriptor {
    pub const fn new(ptr: FarPtr, len: u32) -> Self {
        Self { ptr, len }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// One EXEC_SCSI_CMD request as seen by the engine.
///
/// Only `status`, `host_status` and `target_status` are written by the
/// engine; everything else is read-only input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandRequest {
    pub adapter: u8,
    pub target: u8,
    pub lun: u8,
    pub flags: RequestFlags,
    pub cdb: Vec<u8>,
    pub data: BufferDescriptor,
    pub sense: BufferDescriptor,
    /// Link pointer. Logged, never followed.
    pub link: u32,
    pub post_proc: Option<FarPtr>,
    pub status: Status,
    pub host_status: u8,
    pub target_status: u8,
}

impl CommandRequest {
    pub fn new(adapter: u8, target: u8, lun: u8) -> Self {
        Self {
            adapter,
            target,
            lun,
            ..Default::default()
        }
    }

    pub fn cdb(mut self, cdb: &[u8]) -> Self {
        self.cdb = cdb.to_vec();
        self
    }

    pub fn read_into(mut self, buf: BufferDescriptor) -> Self {
        self.flags.remove(RequestFlags::DIR_OUT);
        self.flags.insert(RequestFlags::DIR_IN);
        self.data = buf;
        self
    }

    pub fn write_from(mut self, buf: BufferDescriptor) -> Self {
        self.flags.remove(RequestFlags::DIR_IN);
        self.flags.insert(RequestFlags::DIR_OUT);
        self.data = buf;
        self
    }

    pub fn sense_into(mut self, buf: BufferDescriptor) -> Self {
        self.sense = buf;
        self
    }

    pub fn post_to(mut self, entry: FarPtr) -> Self {
        self.flags.insert(RequestFlags::POSTING);
        self.post_proc = Some(entry);
        self
    }

    #[inline]
    pub fn key(&self) -> DeviceKey {
        DeviceKey::new(self.adapter, self.target, self.lun)
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        Direction::classify(self.flags)
    }

    #[inline]
    pub fn posting(&self) -> bool {
        self.flags.contains(RequestFlags::POSTING)
    }
}
