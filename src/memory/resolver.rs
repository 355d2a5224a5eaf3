// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The two ways a 16-bit caller can address its memory.
//!
//! A DOS caller in real mode hands us `segment:offset` pairs that map to
//! `segment * 16 + offset`. A Win16 caller hands us `selector:offset` pairs
//! that go through the local descriptor table. The mode is always passed in
//! explicitly at the entry point; nothing here is global.

use enum_dispatch::enum_dispatch;

use crate::{
    error::AddressError,
    memory::guest::{FarPtr, GuestMemory, MemoryRange},
};

/// Pointer a post routine receives for its SRB, and the temporary selector
/// that has to be released once the routine returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostArgument {
    pub srb: FarPtr,
    pub mapped: Option<u16>,
}

#[enum_dispatch]
pub trait AddressResolver {
    /// Resolves `len` bytes at `ptr` to a linear range fully inside `mem`.
    fn resolve(
        &self,
        mem: &GuestMemory,
        ptr: FarPtr,
        len: usize,
    ) -> Result<MemoryRange, AddressError>;

    /// Builds the SRB pointer in the convention the post routine expects.
    fn post_argument(
        &self,
        mem: &mut GuestMemory,
        srb: FarPtr,
        srb_range: MemoryRange,
    ) -> Result<PostArgument, AddressError>;

    fn release(&self, mem: &mut GuestMemory, arg: PostArgument) {
        if let Some(sel) = arg.mapped {
            mem.free_selector(sel);
        }
    }
}

/// DOS real mode: `linear = segment << 4 + offset`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealModeResolver;

impl AddressResolver for RealModeResolver {
    fn resolve(
        &self,
        mem: &GuestMemory,
        ptr: FarPtr,
        len: usize,
    ) -> Result<MemoryRange, AddressError> {
        if ptr.is_null() {
            return Err(AddressError::NullPointer);
        }
        let base = ((ptr.segment() as usize) << 4) + ptr.offset() as usize;
        mem.linear(base, len, ptr)
    }

    /// Post routines always run in 16-bit protected mode, so a real-mode SRB
    /// gets a selector alias for the duration of the call.
    fn post_argument(
        &self,
        mem: &mut GuestMemory,
        _srb: FarPtr,
        srb_range: MemoryRange,
    ) -> Result<PostArgument, AddressError> {
        let sel = mem.alloc_selector(srb_range.base, srb_range.len)?;
        Ok(PostArgument {
            srb: FarPtr::new(sel, 0),
            mapped: Some(sel),
        })
    }
}

/// Win16 protected mode: selector through the descriptor table.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtectedResolver;

impl AddressResolver for ProtectedResolver {
    fn resolve(
        &self,
        mem: &GuestMemory,
        ptr: FarPtr,
        len: usize,
    ) -> Result<MemoryRange, AddressError> {
        if ptr.segment() >> 3 == 0 {
            return Err(AddressError::NullPointer);
        }
        let desc = mem.descriptor(ptr.segment())?;
        let last = (ptr.offset() as usize + len).saturating_sub(1);
        if len > 0 && last > desc.limit as usize {
            return Err(AddressError::OutOfBounds { ptr, len });
        }
        mem.linear(desc.base + ptr.offset() as usize, len, ptr)
    }

    fn post_argument(
        &self,
        _mem: &mut GuestMemory,
        srb: FarPtr,
        _srb_range: MemoryRange,
    ) -> Result<PostArgument, AddressError> {
        Ok(PostArgument { srb, mapped: None })
    }
}

#[enum_dispatch(AddressResolver)]
#[derive(Debug, Clone, Copy)]
pub enum Resolver {
    RealModeResolver,
    ProtectedResolver,
}

/// Addressing convention of the caller, fixed per entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    /// DOS real mode (`ASPI_DOS`).
    RealMode,
    /// Win16 segmented protected mode (`ASPI_WIN16`).
    Protected16,
}

impl From<AddressingMode> for Resolver {
    fn from(mode: AddressingMode) -> Self {
        match mode {
            AddressingMode::RealMode => RealModeResolver.into(),
            AddressingMode::Protected16 => ProtectedResolver.into(),
        }
    }
}
