// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use tracing::{error, trace};

use crate::{
    device::transport::SgIo,
    error::{AspiError, NotFoundReason},
};

/// Host adapter / target / LUN triple naming one logical device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceKey {
    pub adapter: u8,
    pub target: u8,
    pub lun: u8,
}

impl DeviceKey {
    pub const fn new(adapter: u8, target: u8, lun: u8) -> Self {
        Self {
            adapter,
            target,
            lun,
        }
    }
}

/// Same spelling as the device sections of the configuration: `c0t2d0`.
impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}t{}d{}", self.adapter, self.target, self.lun)
    }
}

/// Maps a device triple to the host device node that serves it.
pub trait DeviceDirectory {
    fn device_path(&self, key: DeviceKey) -> Option<PathBuf>;
}

/// Opens a host device node for read/write.
pub trait DeviceOpener {
    type Io: SgIo;

    fn open(&self, path: &Path) -> std::io::Result<Self::Io>;
}

/// Opens real `/dev/sg*` nodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SgOpener;

impl DeviceOpener for SgOpener {
    type Io = fs::File;

    fn open(&self, path: &Path) -> std::io::Result<fs::File> {
        fs::OpenOptions::new().read(true).write(true).open(path)
    }
}

/// An open device. Lives until the registry is dropped; there is no close.
#[derive(Debug)]
pub struct DeviceHandle<T> {
    key: DeviceKey,
    path: PathBuf,
    io: Mutex<T>,
}

impl<T> DeviceHandle<T> {
    pub fn key(&self) -> DeviceKey {
        self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Exclusive access to the underlying channel for one exchange.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.io.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Snapshot of the registry counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub opens: u64,
    pub hits: u64,
    pub misses: u64,
}

/// Open-once, reuse-forever cache of device handles.
///
/// Lookup is linear and exact-match; new handles go to the front. A single
/// lock covers lookup-or-insert. Nothing is ever evicted or closed.
pub struct DeviceRegistry<O: DeviceOpener, D: DeviceDirectory> {
    opener: O,
    directory: D,
    devices: Mutex<Vec<Arc<DeviceHandle<O::Io>>>>,
    opens: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<O: DeviceOpener, D: DeviceDirectory> fmt::Debug for DeviceRegistry<O, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("len", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}

impl<O: DeviceOpener, D: DeviceDirectory> DeviceRegistry<O, D> {
    pub fn new(opener: O, directory: D) -> Self {
        Self {
            opener,
            directory,
            devices: Mutex::new(Vec::new()),
            opens: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Returns the cached handle for `key`, opening it on first use.
    pub fn acquire(&self, key: DeviceKey) -> Result<Arc<DeviceHandle<O::Io>>, AspiError> {
        // Append-only list: a poisoned lock still holds valid entries.
        let mut devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(dev) = devices.iter().find(|d| d.key == key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(dev));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let Some(path) = self.directory.device_path(key) else {
            trace!(%key, "Trying to open unlisted scsi device");
            return Err(AspiError::NotFound {
                key,
                reason: NotFoundReason::Unlisted,
            });
        };

        trace!(%key, path = %path.display(), "Opening device");
        self.opens.fetch_add(1, Ordering::Relaxed);
        let io = self.opener.open(&path).map_err(|source| {
            error!(%key, path = %path.display(), errno = ?source.raw_os_error(), "Error opening device");
            AspiError::NotFound {
                key,
                reason: NotFoundReason::Open {
                    path: path.clone(),
                    source,
                },
            }
        })?;

        let dev = Arc::new(DeviceHandle {
            key,
            path,
            io: Mutex::new(io),
        });
        devices.insert(0, Arc::clone(&dev));
        Ok(dev)
    }

    /// Number of cached handles.
    pub fn len(&self) -> usize {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            opens: self.opens.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
