// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tracing::{trace, warn};

use crate::{
    engine::decoder::Decoded,
    error::AspiError,
    models::{
        request::CommandRequest,
        status::{HOST_STATUS_OK, Status, TARGET_STATUS_GOOD},
    },
};

/// Narrows a failure to the caller-visible status.
///
/// Only a busy host device is told apart; every other I/O problem, an
/// unopenable device and a nonzero device result all read as `Error`.
pub fn map_failure(err: &AspiError) -> Status {
    match err {
        AspiError::InvalidRequest(_) | AspiError::Address(_) => Status::InvalidRequest,
        AspiError::Transport(t) if t.is_busy() => Status::Busy,
        AspiError::NotFound { .. } | AspiError::Transport(_) | AspiError::Device(_) => {
            Status::Error
        },
    }
}

/// Final status of an exchange that produced a reply or failed in transport.
pub fn map_outcome(outcome: &Result<Decoded, AspiError>) -> Status {
    match outcome {
        Ok(decoded) => decoded.status,
        Err(e) => map_failure(e),
    }
}

/// The one terminal transition of a request.
///
/// Host and target status are only filled in on success; failure detail
/// beyond the status byte is not reported.
pub fn finish(request: &mut CommandRequest, status: Status) {
    debug_assert!(status.is_terminal());
    match status {
        Status::Complete => {
            request.host_status = HOST_STATUS_OK;
            request.target_status = TARGET_STATUS_GOOD;
        },
        Status::Busy => trace!("Device busy"),
        _ => warn!(%status, "Failed"),
    }
    request.status = status;
}
