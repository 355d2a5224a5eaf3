// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod inquiry;
pub mod test_unit_ready;

/// SCAN (6) on scanners; byte 4 is the transfer length.
pub const SCAN_OPCODE: u8 = 0x1B;
