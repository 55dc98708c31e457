//! Watch provider - capability interface over the OS watch facility
//!
//! [`WatchProvider`] is the seam between the tree bookkeeping and the
//! platform notification mechanism: one non-recursive watch per directory,
//! plus a stream of [`FsEvent`] values delivered through an mpsc channel.
//! [`NotifyProvider`] is the production implementation on top of the
//! `notify` crate (inotify on Linux); tests drive the tree with a fake.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{error, warn};

use archway_core::domain::WatchError;

/// A filesystem notification, reduced to the kinds the tree cares about.
///
/// Renames are reported as unrelated `RenamedFrom`/`RenamedTo` pairs; the
/// tree deliberately treats them like an independent remove and create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    /// A file opened for writing was closed
    FileClosed(PathBuf),
    /// A directory appeared
    DirCreated(PathBuf),
    /// A directory was deleted
    DirRemoved(PathBuf),
    /// A file or directory was renamed away from this path
    RenamedFrom(PathBuf),
    /// A file or directory was renamed onto this path
    RenamedTo(PathBuf),
}

impl FsEvent {
    /// The path the event refers to.
    pub fn path(&self) -> &Path {
        match self {
            FsEvent::FileClosed(p)
            | FsEvent::DirCreated(p)
            | FsEvent::DirRemoved(p)
            | FsEvent::RenamedFrom(p)
            | FsEvent::RenamedTo(p) => p,
        }
    }
}

/// Handle for one active directory watch.
///
/// Valid as long as the owning node holds it; a node without a handle is
/// degraded (alive in the tree but blind to events below it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchHandle {
    path: PathBuf,
}

impl WatchHandle {
    pub(crate) fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// The directory this handle watches.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Capability interface over the OS watch facility.
///
/// Implementations register one watch per directory; events arrive through
/// the channel handed out at construction time.
pub trait WatchProvider: Send {
    /// Subscribes `path` to change notifications.
    fn add_watch(&mut self, path: &Path) -> Result<WatchHandle, WatchError>;

    /// Cancels the subscription behind `handle`.
    fn remove_watch(&mut self, handle: WatchHandle) -> Result<(), WatchError>;
}

/// Production provider backed by the `notify` crate.
pub struct NotifyProvider {
    watcher: RecommendedWatcher,
}

impl NotifyProvider {
    /// Creates the provider and the channel its events arrive on.
    ///
    /// The `notify` callback runs on the backend's own thread and feeds the
    /// channel with `blocking_send`; the receiver side is consumed by the
    /// watch tree's dispatch loop.
    pub fn new() -> Result<(Self, mpsc::Receiver<FsEvent>)> {
        let (tx, rx) = mpsc::channel::<FsEvent>(1024);

        let watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    for mapped in map_notify_event(&event) {
                        if let Err(e) = tx.blocking_send(mapped) {
                            warn!(error = %e, "event receiver dropped, discarding event");
                        }
                    }
                }
                Err(err) => {
                    error!(error = %err, "watch backend error");
                }
            },
            notify::Config::default(),
        )
        .context("failed to create the filesystem watcher")?;

        Ok((Self { watcher }, rx))
    }
}

impl WatchProvider for NotifyProvider {
    fn add_watch(&mut self, path: &Path) -> Result<WatchHandle, WatchError> {
        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::AddFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Ok(WatchHandle::new(path))
    }

    fn remove_watch(&mut self, handle: WatchHandle) -> Result<(), WatchError> {
        self.watcher
            .unwatch(handle.path())
            .map_err(|e| WatchError::RemoveFailed {
                path: handle.path().to_path_buf(),
                message: e.to_string(),
            })
    }
}

/// Converts a `notify::Event` into tree events.
///
/// - close-after-write -> `FileClosed`
/// - directory create/remove -> `DirCreated` / `DirRemoved`
/// - rename halves -> `RenamedFrom` / `RenamedTo`; a paired rename is split
///   into both halves
///
/// Everything else (file creates, metadata changes, access) is dropped: a
/// written file is only interesting once it is closed.
fn map_notify_event(event: &notify::Event) -> Vec<FsEvent> {
    let first = || event.paths.first().cloned();

    match &event.kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
            first().map(FsEvent::FileClosed).into_iter().collect()
        }
        EventKind::Create(CreateKind::Folder) => {
            first().map(FsEvent::DirCreated).into_iter().collect()
        }
        EventKind::Remove(RemoveKind::Folder) => {
            first().map(FsEvent::DirRemoved).into_iter().collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            first().map(FsEvent::RenamedFrom).into_iter().collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            first().map(FsEvent::RenamedTo).into_iter().collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if event.paths.len() >= 2 {
                vec![
                    FsEvent::RenamedFrom(event.paths[0].clone()),
                    FsEvent::RenamedTo(event.paths[1].clone()),
                ]
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    }
}
