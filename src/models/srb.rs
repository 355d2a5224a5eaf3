// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! 16-bit SCSI Request Block layouts, as they sit in caller memory.
//!
//! All SRBs are byte-packed and little-endian. Every SRB starts with the
//! same four bytes (command, status, adapter, flags); what follows depends
//! on the command.

use anyhow::{Result, anyhow};
use thiserror::Error;
use zerocopy::{
    FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout, LittleEndian, U16, U32,
};

use crate::{
    memory::guest::FarPtr,
    models::{
        request::{BufferDescriptor, CommandRequest, RequestFlags},
        status::Status,
    },
};

/// `SRB_Cmd` codes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrbCommand {
    HaInquiry = 0x00,
    GetDeviceType = 0x01,
    ExecScsiCmd = 0x02,
    AbortSrb = 0x03,
    ResetDevice = 0x04,
}

#[derive(Debug, Error)]
#[error("unknown SRB command: 0x{0:02x}")]
pub struct UnknownSrbCommand(pub u8);

impl TryFrom<u8> for SrbCommand {
    type Error = UnknownSrbCommand;

    fn try_from(b: u8) -> Result<Self, Self::Error> {
        Ok(match b {
            0x00 => SrbCommand::HaInquiry,
            0x01 => SrbCommand::GetDeviceType,
            0x02 => SrbCommand::ExecScsiCmd,
            0x03 => SrbCommand::AbortSrb,
            0x04 => SrbCommand::ResetDevice,
            other => return Err(UnknownSrbCommand(other)),
        })
    }
}

/// Fields shared by every SRB.
#[repr(C)]
#[derive(Debug, Default, Clone, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct SrbHeader {
    pub cmd: u8,                     // 0
    pub status: u8,                  // 1
    pub ha_id: u8,                   // 2
    pub flags: u8,                   // 3
    pub reserved: U32<LittleEndian>, // 4..8
}

pub const SRB_HEADER_LEN: usize = 8;
const _: () = assert!(core::mem::size_of::<SrbHeader>() == SRB_HEADER_LEN);

/// `SRB_HaInquiry16`.
#[repr(C)]
#[derive(Debug, Default, Clone, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct SrbHaInquiry {
    pub cmd: u8,                            // 0
    pub status: u8,                         // 1
    pub ha_id: u8,                          // 2
    pub flags: u8,                          // 3
    pub signature_55aa: U16<LittleEndian>,  // 4..6
    pub ext_buffer_size: U16<LittleEndian>, // 6..8
    pub ha_count: u8,                       // 8
    pub ha_scsi_id: u8,                     // 9
    pub manager_id: [u8; 16],               // 10..26
    pub identifier: [u8; 16],               // 26..42
    pub unique: [u8; 16],                   // 42..58
    pub ext_buffer: [u8; 4],                // 58..62
}

pub const SRB_HA_INQUIRY_LEN: usize = 62;
const _: () = assert!(core::mem::size_of::<SrbHaInquiry>() == SRB_HA_INQUIRY_LEN);

/// Signature announcing Adaptec's extended HA inquiry.
pub const HA_INQUIRY_EXTENDED_SIGNATURE: u16 = 0x55AA;

/// `SRB_ExecSCSICmd16`, fixed part. The CDB follows at
/// [`SRB_EXEC_FIXED_LEN`], the sense area right after the CDB.
#[repr(C)]
#[derive(Debug, Clone, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct SrbExecScsiCmd {
    pub cmd: u8,                        // 0
    pub status: u8,                     // 1
    pub ha_id: u8,                      // 2
    pub flags: u8,                      // 3
    pub hdr_reserved: U32<LittleEndian>, // 4..8
    pub target: u8,                     // 8
    pub lun: u8,                        // 9
    pub buf_len: U32<LittleEndian>,     // 10..14
    pub sense_len: u8,                  // 14
    pub buf_pointer: U32<LittleEndian>, // 15..19
    pub link_pointer: U32<LittleEndian>, // 19..23
    pub cdb_len: u8,                    // 23
    pub ha_status: u8,                  // 24
    pub target_status: u8,              // 25
    pub post_proc: U32<LittleEndian>,   // 26..30
    pub reserved2: [u8; 34],            // 30..64
}

pub const SRB_EXEC_FIXED_LEN: usize = 64;
const _: () = assert!(core::mem::size_of::<SrbExecScsiCmd>() == SRB_EXEC_FIXED_LEN);

impl Default for SrbExecScsiCmd {
    fn default() -> Self {
        Self::new_zeroed()
    }
}

/// Byte offsets written back after execution.
pub const SRB_STATUS_OFFSET: usize = 1;
pub const SRB_EXEC_HA_STATUS_OFFSET: usize = 24;
pub const SRB_EXEC_TARGET_STATUS_OFFSET: usize = 25;

impl SrbExecScsiCmd {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        Self::read_from_prefix(buf)
            .map(|(srb, _)| srb)
            .map_err(|e| anyhow!("failed convert buffer SrbExecScsiCmd: {e}"))
    }

    /// Total bytes the SRB occupies, CDB and sense area included.
    #[inline]
    pub fn total_len(&self) -> usize {
        SRB_EXEC_FIXED_LEN + self.cdb_len as usize + self.sense_len as usize
    }

    /// Where the sense area of an SRB located at `srb` begins.
    #[inline]
    pub fn sense_ptr(&self, srb: FarPtr) -> FarPtr {
        srb.add(SRB_EXEC_FIXED_LEN as u16 + self.cdb_len as u16)
    }

    /// Turns the block into a request. `cdb` is the variable tail that
    /// follows the fixed part.
    pub fn to_request(&self, srb: FarPtr, cdb: &[u8]) -> CommandRequest {
        let post_proc = FarPtr(self.post_proc.get());
        CommandRequest {
            adapter: self.ha_id,
            target: self.target,
            lun: self.lun,
            flags: RequestFlags::from_bits_retain(self.flags),
            cdb: cdb.to_vec(),
            data: BufferDescriptor::new(FarPtr(self.buf_pointer.get()), self.buf_len.get()),
            sense: BufferDescriptor::new(self.sense_ptr(srb), self.sense_len as u32),
            link: self.link_pointer.get(),
            post_proc: (!post_proc.is_null()).then_some(post_proc),
            status: Status::try_from(self.status).unwrap_or_default(),
            host_status: self.ha_status,
            target_status: self.target_status,
        }
    }
}

/// Builder for EXEC_SCSI_CMD blocks, for host programs and tests that have
/// to place an SRB in caller memory.
#[derive(Debug, Default, Clone)]
pub struct SrbExecBuilder {
    pub header: SrbExecScsiCmd,
    cdb: Vec<u8>,
}

impl SrbExecBuilder {
    pub fn new(ha_id: u8, target: u8, lun: u8) -> Self {
        Self {
            header: SrbExecScsiCmd {
                cmd: SrbCommand::ExecScsiCmd as u8,
                ha_id,
                target,
                lun,
                ..Default::default()
            },
            cdb: Vec::new(),
        }
    }

    pub fn flags(mut self, flags: RequestFlags) -> Self {
        self.header.flags = flags.bits();
        self
    }

    pub fn data(mut self, ptr: FarPtr, len: u32) -> Self {
        self.header.buf_pointer = U32::new(ptr.0);
        self.header.buf_len = U32::new(len);
        self
    }

    pub fn sense_len(mut self, len: u8) -> Self {
        self.header.sense_len = len;
        self
    }

    pub fn cdb(mut self, cdb: &[u8]) -> Self {
        self.header.cdb_len = cdb.len() as u8;
        self.cdb = cdb.to_vec();
        self
    }

    pub fn post_proc(mut self, entry: FarPtr) -> Self {
        self.header.post_proc = U32::new(entry.0);
        self
    }

    /// Fixed part, CDB and a zeroed sense area.
    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header.total_len());
        out.extend_from_slice(self.header.as_bytes());
        out.extend_from_slice(&self.cdb);
        out.resize(self.header.total_len(), 0);
        out
    }
}
