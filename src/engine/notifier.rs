// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Synchronous completion posting.
//!
//! The post routine runs on the submitting thread, after the status byte is
//! final and before `submit` returns. There is no deferred or background
//! variant.

use std::{fmt, sync::Arc};

use dashmap::DashMap;
use tracing::trace;

use crate::{
    error::NotifyError,
    memory::{
        guest::{FarPtr, GuestMemory, MemoryRange},
        resolver::{AddressResolver, Resolver},
    },
    models::request::CommandRequest,
};

/// What a post routine gets to see.
#[derive(Debug)]
pub struct PostContext<'a> {
    /// SRB pointer in the caller's own convention; null when the request was
    /// submitted directly rather than through an SRB in caller memory.
    pub srb: FarPtr,
    pub request: &'a CommandRequest,
    pub memory: &'a mut GuestMemory,
}

pub type PostRoutine = Arc<dyn Fn(PostContext<'_>) + Send + Sync>;

/// Caller entry points, keyed by the linear address their far pointer
/// resolves to.
#[derive(Default)]
pub struct PostRoutineTable {
    routines: DashMap<usize, PostRoutine>,
}

impl fmt::Debug for PostRoutineTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<_> = self.routines.iter().map(|e| *e.key()).collect();
        entries.sort_unstable();
        f.debug_struct("PostRoutineTable")
            .field("entries", &entries)
            .finish()
    }
}

impl PostRoutineTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `routine` at linear address `entry`, replacing any previous
    /// one.
    pub fn register<F>(&self, entry: usize, routine: F)
    where F: Fn(PostContext<'_>) + Send + Sync + 'static {
        self.routines.insert(entry, Arc::new(routine));
    }

    pub fn len(&self) -> usize {
        self.routines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }

    /// The shard guard is dropped before the routine is handed out.
    fn lookup(&self, entry: usize) -> Option<PostRoutine> {
        self.routines.get(&entry).map(|r| Arc::clone(&r))
    }

    /// Calls the request's post routine if posting was asked for.
    ///
    /// Returns whether a routine ran. `srb` is the SRB location when the
    /// request came from caller memory. The table lock is not held while the
    /// routine runs, so it may submit again.
    pub fn notify(
        &self,
        resolver: &Resolver,
        memory: &mut GuestMemory,
        request: &CommandRequest,
        srb: Option<(FarPtr, MemoryRange)>,
    ) -> Result<bool, NotifyError> {
        let Some(post_proc) = request.post_proc.filter(|_| request.posting()) else {
            return Ok(false);
        };

        let entry = resolver.resolve(memory, post_proc, 1)?.base;
        let routine = self.lookup(entry).ok_or(NotifyError::UnknownEntry(entry))?;
        trace!(?post_proc, entry, "Post Routine called");

        match srb {
            Some((ptr, range)) => {
                let arg = resolver.post_argument(memory, ptr, range)?;
                routine(PostContext {
                    srb: arg.srb,
                    request,
                    memory: &mut *memory,
                });
                resolver.release(memory, arg);
            },
            None => routine(PostContext {
                srb: FarPtr::NULL,
                request,
                memory,
            }),
        }
        Ok(true)
    }
}
