// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Caller address space and far pointers.
pub mod guest;
/// Real-mode and protected-mode pointer resolution.
pub mod resolver;
