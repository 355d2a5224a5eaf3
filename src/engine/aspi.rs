// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The ASPI entry points: `SendASPICommand`, `GetASPISupportInfo` and
//! `GetASPIDLLVersion`, backed by the sg driver.
//!
//! Every call runs to completion on the calling thread: resolve the caller's
//! buffers, find (or open) the device, do one write/read exchange, copy the
//! results back, set the status and, if asked for, run the post routine.

use tracing::{error, trace, warn};
use zerocopy::{FromBytes, IntoBytes, U16};

use crate::{
    cfg::config::{AdapterConfig, Config},
    device::{
        registry::{DeviceDirectory, DeviceHandle, DeviceOpener, DeviceRegistry, SgOpener},
        transport,
    },
    engine::{
        decoder::{Decoded, decode},
        encoder::{encode, validate_cdb},
        notifier::PostRoutineTable,
        status::{finish, map_failure, map_outcome},
        trace::{log_request, log_result},
    },
    error::AspiError,
    memory::{
        guest::{FarPtr, GuestMemory, MemoryRange},
        resolver::{AddressResolver, AddressingMode, Resolver},
    },
    models::{
        request::{CommandRequest, Direction},
        srb::{
            HA_INQUIRY_EXTENDED_SIGNATURE, SRB_EXEC_FIXED_LEN, SRB_EXEC_HA_STATUS_OFFSET,
            SRB_EXEC_TARGET_STATUS_OFFSET, SRB_HA_INQUIRY_LEN, SRB_HEADER_LEN,
            SRB_STATUS_OFFSET, SrbCommand, SrbExecScsiCmd, SrbHaInquiry, SrbHeader,
        },
        status::Status,
    },
};

/// Number of host adapters reported.
pub const HOST_ADAPTER_COUNT: u8 = 1;
/// Value of `GetASPIDLLVersion`.
pub const ASPI_DLL_VERSION: u32 = 2;

/// Resolved caller buffers of one request.
#[derive(Debug, Clone, Copy, Default)]
struct Windows {
    data: Option<MemoryRange>,
    sense: Option<MemoryRange>,
}

/// ASPI manager for one host adapter over the sg driver.
pub struct Aspi<O: DeviceOpener, D: DeviceDirectory> {
    registry: DeviceRegistry<O, D>,
    post_routines: PostRoutineTable,
    adapter: AdapterConfig,
}

impl Aspi<SgOpener, Config> {
    /// Engine over real `/dev/sg*` nodes, as listed in `config`.
    pub fn from_config(config: Config) -> Self {
        let adapter = config.adapter.clone();
        Self::new(SgOpener, config, adapter)
    }
}

impl<O: DeviceOpener, D: DeviceDirectory> Aspi<O, D> {
    pub fn new(opener: O, directory: D, adapter: AdapterConfig) -> Self {
        Self::with_registry(DeviceRegistry::new(opener, directory), adapter)
    }

    pub fn with_registry(registry: DeviceRegistry<O, D>, adapter: AdapterConfig) -> Self {
        Self {
            registry,
            post_routines: PostRoutineTable::new(),
            adapter,
        }
    }

    pub fn registry(&self) -> &DeviceRegistry<O, D> {
        &self.registry
    }

    /// Where callers register the entry points their requests post to.
    pub fn post_routines(&self) -> &PostRoutineTable {
        &self.post_routines
    }

    pub fn adapter(&self) -> &AdapterConfig {
        &self.adapter
    }

    /// `GetASPISupportInfo`: status in the high byte, adapter count in the
    /// low byte.
    pub fn support_info(&self) -> u16 {
        (u16::from(u8::from(Status::Complete)) << 8) | u16::from(HOST_ADAPTER_COUNT)
    }

    /// `GetASPIDLLVersion`.
    pub fn dll_version(&self) -> u32 {
        ASPI_DLL_VERSION
    }

    /// Runs one request whose buffers live in `memory`.
    ///
    /// The returned status is also left in `request.status`. Posting gets a
    /// null SRB pointer, since there is no SRB behind the request.
    pub fn submit(
        &self,
        request: &mut CommandRequest,
        memory: &mut GuestMemory,
        mode: AddressingMode,
    ) -> Status {
        let resolver = Resolver::from(mode);
        self.execute(request, memory, &resolver, None)
    }

    /// `SendASPICommand`: dispatches on the command byte of the SRB at `srb`.
    pub fn send_command(
        &self,
        srb: FarPtr,
        memory: &mut GuestMemory,
        mode: AddressingMode,
    ) -> Status {
        let resolver = Resolver::from(mode);
        let header = match resolver.resolve(memory, srb, SRB_HEADER_LEN) {
            Ok(range) => match SrbHeader::read_from_bytes(memory.slice(range)) {
                Ok(h) => h,
                Err(_) => return Status::InvalidRequest,
            },
            Err(e) => {
                warn!(?srb, error = %e, "Bad SRB pointer");
                return Status::InvalidRequest;
            },
        };

        match SrbCommand::try_from(header.cmd) {
            Ok(SrbCommand::HaInquiry) => self.ha_inquiry(srb, memory, &resolver),
            Ok(SrbCommand::ExecScsiCmd) => self.exec_srb(srb, memory, &resolver),
            Ok(other) => {
                warn!(command = ?other, ha_id = header.ha_id, "Not implemented");
                Status::InvalidRequest
            },
            Err(e) => {
                warn!(error = %e, "Unknown command");
                Status::InvalidRequest
            },
        }
    }

    fn ha_inquiry(&self, srb: FarPtr, memory: &mut GuestMemory, resolver: &Resolver) -> Status {
        let range = match resolver.resolve(memory, srb, SRB_HA_INQUIRY_LEN) {
            Ok(r) => r,
            Err(e) => {
                warn!(?srb, error = %e, "Bad HA_INQUIRY block");
                return Status::InvalidRequest;
            },
        };
        let Ok(mut inq) = SrbHaInquiry::read_from_bytes(memory.slice(range)) else {
            return Status::InvalidRequest;
        };

        if inq.signature_55aa.get() == HA_INQUIRY_EXTENDED_SIGNATURE {
            trace!("Extended request detected (not yet supported)");
        }

        let a = &self.adapter;
        inq.status = Status::Complete.into();
        inq.ext_buffer_size = U16::new(a.ext_buffer_size);
        inq.ha_count = HOST_ADAPTER_COUNT;
        inq.ha_scsi_id = a.scsi_id;
        inq.manager_id = adapter_string(&a.manager_id);
        inq.identifier = adapter_string(&a.identifier);
        inq.unique = [0; 16];
        inq.unique[4..8].copy_from_slice(&a.max_transfer_length.to_le_bytes());

        memory.slice_mut(range).copy_from_slice(inq.as_bytes());
        Status::Complete
    }

    fn exec_srb(&self, srb: FarPtr, memory: &mut GuestMemory, resolver: &Resolver) -> Status {
        let fixed = match resolver.resolve(memory, srb, SRB_EXEC_FIXED_LEN) {
            Ok(r) => r,
            Err(e) => {
                warn!(?srb, error = %e, "Bad EXEC_SCSI_CMD block");
                return Status::InvalidRequest;
            },
        };
        let header = match SrbExecScsiCmd::parse(memory.slice(fixed)) {
            Ok(h) => h,
            Err(e) => {
                warn!(?srb, error = %e, "Bad EXEC_SCSI_CMD block");
                return Status::InvalidRequest;
            },
        };
        let range = match resolver.resolve(memory, srb, header.total_len()) {
            Ok(r) => r,
            Err(e) => {
                warn!(?srb, len = header.total_len(), error = %e, "SRB tail out of reach");
                memory.slice_mut(fixed)[SRB_STATUS_OFFSET] = Status::InvalidRequest.into();
                return Status::InvalidRequest;
            },
        };

        let cdb_len = header.cdb_len as usize;
        let mut request =
            header.to_request(srb, &memory.slice(range)[SRB_EXEC_FIXED_LEN..][..cdb_len]);
        self.execute(&mut request, memory, resolver, Some((srb, range)))
    }

    /// Posts once an exchange was attempted, whatever its outcome; requests
    /// rejected or left without a device are not posted.
    fn execute(
        &self,
        request: &mut CommandRequest,
        memory: &mut GuestMemory,
        resolver: &Resolver,
        srb: Option<(FarPtr, MemoryRange)>,
    ) -> Status {
        let windows = match resolve_windows(request, memory, resolver) {
            Ok(w) => w,
            Err(e) => {
                log_request(request, None);
                warn!(error = %e, "Rejected request");
                return settle(request, memory, srb, map_failure(&e));
            },
        };
        log_request(request, windows.data);

        let device = match self.registry.acquire(request.key()) {
            Ok(d) => d,
            Err(e) => {
                error!(
                    key = %request.key(),
                    error = %e,
                    "Failed: could not open device. Device permissions !?"
                );
                return settle(request, memory, srb, map_failure(&e));
            },
        };

        request.status = Status::Pending;
        write_back(request, memory, srb);

        let outcome = round_trip::<O>(&device, request, windows, memory);
        let status = settle(request, memory, srb, map_outcome(&outcome));

        if let Ok(decoded) = &outcome {
            let data = windows
                .data
                .map(|r| memory.slice(r.truncate(decoded.data_copied)))
                .unwrap_or_default();
            let sense = windows
                .sense
                .map(|r| memory.slice(r.truncate(decoded.sense_copied)))
                .unwrap_or_default();
            log_result(request, data, sense);
        }

        if let Err(e) = self.post_routines.notify(resolver, memory, request, srb) {
            warn!(post_proc = ?request.post_proc, error = %e, "Post routine not called");
        }
        status
    }
}

/// Checks the command block and resolves the data and sense buffers.
fn resolve_windows(
    request: &CommandRequest,
    memory: &GuestMemory,
    resolver: &Resolver,
) -> Result<Windows, AspiError> {
    validate_cdb(request)?;

    let data = if request.direction().has_payload() && !request.data.is_empty() {
        Some(resolver.resolve(memory, request.data.ptr, request.data.len as usize)?)
    } else {
        None
    };
    let sense = if request.sense.is_empty() {
        None
    } else {
        Some(resolver.resolve(memory, request.sense.ptr, request.sense.len as usize)?)
    };

    if matches!((data, sense), (Some(d), Some(s)) if d.overlaps(&s)) {
        return Err(AspiError::InvalidRequest("data and sense buffers overlap"));
    }
    Ok(Windows { data, sense })
}

/// Encode, one exchange under the device lock, decode into caller memory.
fn round_trip<O: DeviceOpener>(
    device: &DeviceHandle<O::Io>,
    request: &CommandRequest,
    windows: Windows,
    memory: &mut GuestMemory,
) -> Result<Decoded, AspiError> {
    let payload: &[u8] = match (request.direction(), windows.data) {
        (Direction::Out, Some(r)) => memory.slice(r),
        _ => &[],
    };
    let message = encode(request, payload)?;

    let reply = {
        let mut io = device.lock();
        transport::exchange(&mut *io, &message, message.reply_len())?
    };

    let (data, sense) = memory
        .pair_mut(windows.data, windows.sense)
        .ok_or(AspiError::InvalidRequest("data and sense buffers overlap"))?;
    let decoded = decode(&reply, request, data, sense);
    if decoded.result != 0 {
        return Err(AspiError::Device(decoded.result));
    }
    Ok(decoded)
}

/// Makes `status` final on the request and in the SRB, if there is one.
fn settle(
    request: &mut CommandRequest,
    memory: &mut GuestMemory,
    srb: Option<(FarPtr, MemoryRange)>,
    status: Status,
) -> Status {
    finish(request, status);
    write_back(request, memory, srb);
    status
}

fn write_back(
    request: &CommandRequest,
    memory: &mut GuestMemory,
    srb: Option<(FarPtr, MemoryRange)>,
) {
    let Some((_, range)) = srb else {
        return;
    };
    let block = memory.slice_mut(range);
    if block.len() < SRB_EXEC_FIXED_LEN {
        return;
    }
    block[SRB_STATUS_OFFSET] = request.status.into();
    block[SRB_EXEC_HA_STATUS_OFFSET] = request.host_status;
    block[SRB_EXEC_TARGET_STATUS_OFFSET] = request.target_status;
}

/// NUL-terminated, at most 15 characters.
fn adapter_string(s: &str) -> [u8; 16] {
    let mut out = [0u8; 16];
    let n = s.len().min(out.len() - 1);
    out[..n].copy_from_slice(&s.as_bytes()[..n]);
    out
}
