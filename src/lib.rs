//! ASPI (Advanced SCSI Programming Interface) command passthrough onto the
//! Linux generic SCSI (sg) driver.
// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Handles configuration, command-line parsing, and logging.
pub mod cfg;
/// SCSI command block builders and response parsers.
pub mod control_block;
/// Device handles and the sg byte channel.
pub mod device;
/// The ASPI engine: SRB dispatch, request pipeline and completion.
pub mod engine;
/// Error types shared across the crate.
pub mod error;
/// Caller memory and far-pointer resolution.
pub mod memory;
/// Defines the request, SRB, status and sg wire data structures.
pub mod models;
