// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Entry points and the per-request pipeline.
pub mod aspi;
/// sg reply → caller buffers.
pub mod decoder;
/// Request → sg message.
pub mod encoder;
/// Synchronous post routines.
pub mod notifier;
/// Outcome → ASPI status.
pub mod status;
/// Request and result dumps.
pub mod trace;
