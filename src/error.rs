// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::{device::registry::DeviceKey, memory::guest::FarPtr};

/// Failures raised while turning a caller pointer into a linear range.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("null pointer")]
    NullPointer,
    #[error("range {ptr:?}+{len} falls outside caller memory")]
    OutOfBounds { ptr: FarPtr, len: usize },
    #[error("selector {0:#06x} is not present in the descriptor table")]
    InvalidSelector(u16),
    #[error("descriptor table is full")]
    TableFull,
}

/// Byte-exchange failures of the sg channel. Never retried.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("short write to sg device: {written} of {expected} bytes")]
    ShortWrite { expected: usize, written: usize },
    #[error("short read from sg device: {read} of {expected} bytes")]
    ShortRead { expected: usize, read: usize },
    #[error("sg device i/o failed: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// `true` when the host reported the device as temporarily unavailable
    /// or exclusively held by another opener.
    pub fn is_busy(&self) -> bool {
        match self {
            TransportError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ResourceBusy | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

/// Why a device could not be acquired. Both variants surface to the caller
/// as the same status; they only differ in what gets logged.
#[derive(Debug, Error)]
pub enum NotFoundReason {
    #[error("no device configured")]
    Unlisted,
    #[error("failed to open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum AspiError {
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("device {key} not found: {reason}")]
    NotFound {
        key: DeviceKey,
        #[source]
        reason: NotFoundReason,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("device reported result {0}")]
    Device(i32),
    #[error("bad caller address: {0}")]
    Address(#[from] AddressError),
}

/// Failures of the completion path. Logged only; never folded into the
/// request status.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("post routine address: {0}")]
    Address(#[from] AddressError),
    #[error("no post routine registered at linear {0:#x}")]
    UnknownEntry(usize),
}
