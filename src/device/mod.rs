// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Open-once device handle cache.
pub mod registry;
/// Blocking write/read exchange on an sg channel.
pub mod transport;
