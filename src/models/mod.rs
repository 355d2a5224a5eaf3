//! This module defines the request, status, SRB and sg wire data structures.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// The engine's view of one EXEC_SCSI_CMD request.
pub mod request;
/// Fixed-format sense data.
pub mod sense_data;
/// SCSI Request Block layouts in caller memory.
pub mod srb;
/// ASPI status vocabulary.
pub mod status;
/// `struct sg_header` messages.
pub mod wire;
