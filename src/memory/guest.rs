// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use crate::error::AddressError;

/// 32-bit `segment:offset` token as handed over by a 16-bit caller.
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FarPtr(pub u32);

impl FarPtr {
    pub const NULL: FarPtr = FarPtr(0);

    #[inline]
    pub const fn new(segment: u16, offset: u16) -> Self {
        Self(((segment as u32) << 16) | offset as u32)
    }

    #[inline]
    pub const fn segment(self) -> u16 {
        (self.0 >> 16) as u16
    }

    #[inline]
    pub const fn offset(self) -> u16 {
        self.0 as u16
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Same segment, offset advanced by `delta` (wraps like 16-bit code).
    #[inline]
    pub const fn add(self, delta: u16) -> Self {
        Self::new(self.segment(), self.offset().wrapping_add(delta))
    }
}

impl fmt::Debug for FarPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.segment(), self.offset())
    }
}

/// A validated window into [`GuestMemory`]: linear start and capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRange {
    pub base: usize,
    pub len: usize,
}

impl MemoryRange {
    #[inline]
    pub fn end(&self) -> usize {
        self.base + self.len
    }

    #[inline]
    pub fn overlaps(&self, other: &MemoryRange) -> bool {
        self.len > 0 && other.len > 0 && self.base < other.end() && other.base < self.end()
    }

    /// The first `len` bytes of this range, never more than it holds.
    #[inline]
    pub fn truncate(self, len: usize) -> Self {
        Self {
            base: self.base,
            len: self.len.min(len),
        }
    }
}

/// Local descriptor: base and limit (last valid offset) of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub base: usize,
    pub limit: u16,
}

/// First selector index handed out; index 0 is the null selector.
const FIRST_LDT_INDEX: usize = 1;
/// Table indicator + RPL 3, as 16-bit code sees its LDT selectors.
const SELECTOR_TI_RPL: u16 = 0b111;
const MAX_DESCRIPTORS: usize = 8192;

/// The caller's address space: a flat arena of linear memory plus the
/// local descriptor table used by protected-mode callers.
pub struct GuestMemory {
    bytes: Vec<u8>,
    ldt: Vec<Option<Descriptor>>,
}

impl fmt::Debug for GuestMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestMemory")
            .field("size", &self.bytes.len())
            .field(
                "selectors",
                &self.ldt.iter().filter(|d| d.is_some()).count(),
            )
            .finish()
    }
}

impl GuestMemory {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0u8; size],
            ldt: vec![None; FIRST_LDT_INDEX],
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Checked linear range.
    pub fn linear(&self, base: usize, len: usize, ptr: FarPtr) -> Result<MemoryRange, AddressError> {
        match base.checked_add(len) {
            Some(end) if end <= self.bytes.len() => Ok(MemoryRange { base, len }),
            _ => Err(AddressError::OutOfBounds { ptr, len }),
        }
    }

    #[inline]
    pub fn slice(&self, r: MemoryRange) -> &[u8] {
        &self.bytes[r.base..r.end()]
    }

    #[inline]
    pub fn slice_mut(&mut self, r: MemoryRange) -> &mut [u8] {
        &mut self.bytes[r.base..r.end()]
    }

    /// Two windows at once, for filling the data and sense buffers of one
    /// request. `None` if both are present and overlap.
    #[allow(clippy::type_complexity)]
    pub fn pair_mut(
        &mut self,
        a: Option<MemoryRange>,
        b: Option<MemoryRange>,
    ) -> Option<(Option<&mut [u8]>, Option<&mut [u8]>)> {
        match (a, b) {
            (Some(a), Some(b)) => {
                if a.overlaps(&b) {
                    return None;
                }
                let swapped = b.base < a.base;
                let (lo, hi) = if swapped { (b, a) } else { (a, b) };
                let (left, right) = self.bytes.split_at_mut(hi.base);
                let lo = &mut left[lo.base..lo.end()];
                let hi = &mut right[..hi.len];
                Some(if swapped {
                    (Some(hi), Some(lo))
                } else {
                    (Some(lo), Some(hi))
                })
            },
            (Some(a), None) => Some((Some(self.slice_mut(a)), None)),
            (None, Some(b)) => Some((None, Some(self.slice_mut(b)))),
            (None, None) => Some((None, None)),
        }
    }

    /// Looks up the descriptor behind a selector.
    pub fn descriptor(&self, selector: u16) -> Result<Descriptor, AddressError> {
        self.ldt
            .get((selector >> 3) as usize)
            .copied()
            .flatten()
            .ok_or(AddressError::InvalidSelector(selector))
    }

    /// Allocates a selector aliasing `len` bytes at linear `base`.
    pub fn alloc_selector(&mut self, base: usize, len: usize) -> Result<u16, AddressError> {
        let limit = len.clamp(1, 0x1_0000) - 1;
        let desc = Descriptor {
            base,
            limit: limit as u16,
        };
        let index = match self.ldt.iter().skip(FIRST_LDT_INDEX).position(Option::is_none) {
            Some(free) => free + FIRST_LDT_INDEX,
            None if self.ldt.len() < MAX_DESCRIPTORS => {
                self.ldt.push(None);
                self.ldt.len() - 1
            },
            None => return Err(AddressError::TableFull),
        };
        self.ldt[index] = Some(desc);
        Ok(((index as u16) << 3) | SELECTOR_TI_RPL)
    }

    pub fn free_selector(&mut self, selector: u16) {
        if let Some(slot) = self.ldt.get_mut((selector >> 3) as usize) {
            *slot = None;
        }
    }

    /// Copies `data` to `base`, clipped at the end of the arena. Setup
    /// helper for host programs and tests.
    pub fn write(&mut self, base: usize, data: &[u8]) -> usize {
        let end = base.saturating_add(data.len()).min(self.bytes.len());
        let n = end.saturating_sub(base);
        if n > 0 {
            self.bytes[base..end].copy_from_slice(&data[..n]);
        }
        n
    }

    pub fn read(&self, base: usize, len: usize) -> &[u8] {
        let start = base.min(self.bytes.len());
        let end = base.saturating_add(len).min(self.bytes.len());
        &self.bytes[start..end]
    }
}
