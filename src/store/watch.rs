// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    io,
    os::fd::{AsFd as _, AsRawFd, RawFd},
    path::Path,
};

use nix::sys::inotify::{AddWatchFlags, InitFlags, Inotify};
use tokio::io::{unix::AsyncFd, Interest};

struct InotifyFd(Inotify);

impl AsRawFd for InotifyFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_fd().as_raw_fd()
    }
}

/// Notifies about slots of a store that have been replaced or rewritten.
///
/// Both [`SlotWriter::store`](super::SlotWriter::store) and external
/// programs that rewrite a slot file in place are reported.
pub struct SlotWatcher {
    fd: AsyncFd<InotifyFd>,
}

impl std::fmt::Debug for SlotWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotWatcher")
            .field("fd", &self.fd.get_ref().as_raw_fd())
            .finish()
    }
}

impl SlotWatcher {
    pub(super) fn new(root: &Path) -> io::Result<Self> {
        let inotify = Inotify::init(InitFlags::IN_NONBLOCK | InitFlags::IN_CLOEXEC)?;
        inotify.add_watch(
            root,
            AddWatchFlags::IN_CLOSE_WRITE | AddWatchFlags::IN_MOVED_TO,
        )?;
        // SAFETY: `InotifyFd` owns the inotify descriptor, which stays open
        // until the `AsyncFd` is dropped.
        let fd = unsafe { AsyncFd::register_with_interest(InotifyFd(inotify), Interest::READABLE) }
            .map_err(|err| err.into_parts().1)?;
        Ok(Self { fd })
    }

    /// Wait until at least one slot has changed and return the names
    /// of all changed slots.
    pub async fn changed(&mut self) -> io::Result<Vec<String>> {
        loop {
            let mut guard = self.fd.readable().await?;
            let Ok(events) = guard.try_io(|fd| fd.get_ref().0.read_events().map_err(io::Error::from))
            else {
                // Spurious wakeup
                continue;
            };
            let mut names: Vec<String> = events?
                .into_iter()
                .filter_map(|event| event.name)
                .filter_map(|name| name.into_string().ok())
                .filter(|name| !name.starts_with('.'))
                .collect();
            names.dedup();
            if !names.is_empty() {
                return Ok(names);
            }
        }
    }

    /// Wait until the slot `name` has changed.
    pub async fn changed_slot(&mut self, name: &str) -> io::Result<()> {
        loop {
            if self.changed().await?.iter().any(|changed| changed == name) {
                return Ok(());
            }
        }
    }
}
