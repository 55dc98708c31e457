//! Watch tree - recursive hierarchy of watched directories
//!
//! Each [`Node`] mirrors one directory of the watched hierarchy: it owns the
//! directory's watch handle, the map of child nodes, the pending file-name
//! list and at most one outstanding aggregation timer. Directory events
//! reshape the tree (subtrees are torn down and rebuilt as directories come
//! and go); file-close events accumulate in the owning node until its
//! aggregation window fires.
//!
//! The tree is owned by a single dispatch task; only the pending lists are
//! shared with timer tasks. A node whose watch registration failed is
//! degraded: it stays in the tree, its children keep working, but nothing
//! below it is seen until the subtree is rebuilt by a later directory event.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use regex::Regex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::provider::{FsEvent, WatchHandle, WatchProvider};
use crate::scheduler::{AggregationScheduler, AggregationTimer, PendingList};

/// Settings shared by every node of one tree.
struct TreeContext {
    exclude: Option<Regex>,
    scheduler: AggregationScheduler,
}

impl TreeContext {
    fn is_excluded(&self, name: &str) -> bool {
        self.exclude.as_ref().is_some_and(|re| re.is_match(name))
    }
}

/// One watched directory.
struct Node {
    path: PathBuf,
    handle: Option<WatchHandle>,
    children: HashMap<String, Node>,
    pending: PendingList,
    timer: Option<AggregationTimer>,
}

impl Node {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            handle: None,
            children: HashMap::new(),
            pending: Arc::new(Mutex::new(Vec::new())),
            timer: None,
        }
    }

    /// Registers the watch for this node and recursively builds children for
    /// every existing subdirectory.
    ///
    /// A failed watch registration is logged and leaves the node degraded;
    /// the rest of the tree keeps working. With `pickup` set (subtree built
    /// in response to a directory event) files already present in the
    /// directory are enqueued as if their close-write had been observed,
    /// which closes the create-then-populate race. The initial build at
    /// startup runs without pickup so pre-existing content is not re-shipped.
    fn create(&mut self, provider: &mut dyn WatchProvider, ctx: &TreeContext, pickup: bool) {
        match provider.add_watch(&self.path) {
            Ok(handle) => {
                debug!(path = %self.path.display(), "added watch");
                self.handle = Some(handle);
            }
            Err(err) => {
                error!(
                    path = %self.path.display(),
                    error = %err,
                    "could not add watch, node is degraded"
                );
            }
        }

        let entries = match std::fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "cannot list directory"
                );
                return;
            }
        };

        for entry in entries.flatten() {
            let entry_path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry_path.is_dir() {
                let mut child = Node::new(entry_path);
                child.create(provider, ctx, pickup);
                self.children.insert(name, child);
            } else if pickup {
                self.note_file(&name, ctx);
            }
        }
    }

    /// Tears this node and its subtree down: cancels the outstanding timer,
    /// removes the watch, recurses into the children and clears the child
    /// map. Safe to call on an already-deleted node.
    fn delete(&mut self, provider: &mut dyn WatchProvider) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        if let Some(handle) = self.handle.take() {
            match provider.remove_watch(handle) {
                Ok(()) => debug!(path = %self.path.display(), "removed watch"),
                Err(err) => warn!(
                    path = %self.path.display(),
                    error = %err,
                    "could not remove watch"
                ),
            }
        }
        for child in self.children.values_mut() {
            child.delete(provider);
        }
        self.children.clear();
    }

    /// A file in this directory finished writing.
    ///
    /// Excluded names are dropped before they reach the pending list. The
    /// append runs under the node's mutex; with a zero delay the batch
    /// dispatches inline, otherwise a timer is armed unless one is already
    /// running for this node.
    fn note_file(&mut self, name: &str, ctx: &TreeContext) {
        if ctx.is_excluded(name) {
            debug!(dir = %self.path.display(), name, "excluded file ignored");
            return;
        }

        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.push(name.to_string());
        }

        if ctx.scheduler.immediate() {
            ctx.scheduler.dispatch_now(&self.path, &self.pending);
        } else if !self.timer_alive() {
            self.timer = Some(
                ctx.scheduler
                    .schedule(self.path.clone(), Arc::clone(&self.pending)),
            );
        }
    }

    fn timer_alive(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| t.is_alive())
    }

    /// A child directory appeared (created or renamed in). Any stale child
    /// of the same name is torn down first, then the subtree is rebuilt with
    /// pickup so files written before the watch landed are not lost.
    fn dir_added(&mut self, provider: &mut dyn WatchProvider, ctx: &TreeContext, name: &str) {
        if let Some(mut stale) = self.children.remove(name) {
            stale.delete(provider);
        }

        let child_path = self.path.join(name);
        if !child_path.is_dir() {
            // a file was renamed in, or the directory vanished again
            return;
        }

        info!(path = %child_path.display(), "adding node and its sub-tree");
        let mut child = Node::new(child_path);
        child.create(provider, ctx, true);
        self.children.insert(name.to_string(), child);
    }

    /// A child directory disappeared (removed or renamed away). Unknown
    /// names are ignored, which also covers files renamed out of the tree.
    fn dir_removed(&mut self, provider: &mut dyn WatchProvider, name: &str) {
        if let Some(mut child) = self.children.remove(name) {
            info!(path = %child.path.display(), "deleting node and its sub-tree");
            child.delete(provider);
        }
    }
}

/// The tree of watched directories rooted at the configured watch folder.
pub struct WatchTree<P: WatchProvider> {
    provider: P,
    ctx: TreeContext,
    root_path: PathBuf,
    root: Node,
}

impl<P: WatchProvider> WatchTree<P> {
    /// Creates an empty tree over `root`. Call [`create`](Self::create) to
    /// register the watches.
    pub fn new(
        provider: P,
        root: &Path,
        exclude: Option<Regex>,
        scheduler: AggregationScheduler,
    ) -> Self {
        Self {
            provider,
            ctx: TreeContext { exclude, scheduler },
            root_path: root.to_path_buf(),
            root: Node::new(root.to_path_buf()),
        }
    }

    /// Builds the initial tree from the filesystem, without file pickup.
    pub fn create(&mut self) {
        info!(root = %self.root_path.display(), "building watch tree");
        let Self {
            provider,
            ctx,
            root,
            ..
        } = self;
        root.create(provider, ctx, false);
    }

    /// Routes one provider event into the tree.
    pub fn handle_event(&mut self, event: FsEvent) {
        match event {
            FsEvent::FileClosed(path) => self.on_file_closed(&path),
            FsEvent::DirCreated(path) | FsEvent::RenamedTo(path) => self.on_dir_added(&path),
            FsEvent::DirRemoved(path) | FsEvent::RenamedFrom(path) => {
                self.on_dir_removed(&path)
            }
        }
    }

    /// Consumes provider events until shutdown or channel close, then tears
    /// the tree down. Events are handled one at a time to completion; the
    /// only concurrency they spawn is an independent aggregation timer.
    pub async fn run(
        &mut self,
        mut events: mpsc::Receiver<FsEvent>,
        shutdown: CancellationToken,
    ) {
        info!("watch tree dispatch loop running");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown requested");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        info!("event channel closed");
                        break;
                    }
                }
            }
        }
        self.teardown();
    }

    /// Tears down every node. Pending timers are cancelled; a timer that
    /// already fired completes its dispatch.
    pub fn teardown(&mut self) {
        let Self {
            provider, root, ..
        } = self;
        root.delete(provider);
    }

    fn on_file_closed(&mut self, path: &Path) {
        let Some((rel, name)) = self.locate(path) else {
            debug!(path = %path.display(), "event outside the watch root");
            return;
        };
        let Self { ctx, root, .. } = self;
        match descend(root, &rel) {
            Some(node) => node.note_file(&name, ctx),
            None => debug!(path = %path.display(), "no node for event directory"),
        }
    }

    fn on_dir_added(&mut self, path: &Path) {
        let Some((rel, name)) = self.locate(path) else {
            return;
        };
        let Self {
            provider,
            ctx,
            root,
            ..
        } = self;
        match descend(root, &rel) {
            Some(node) => node.dir_added(provider, ctx, &name),
            None => debug!(path = %path.display(), "no node for event directory"),
        }
    }

    fn on_dir_removed(&mut self, path: &Path) {
        let Some((rel, name)) = self.locate(path) else {
            return;
        };
        let Self {
            provider, root, ..
        } = self;
        if let Some(node) = descend(root, &rel) {
            node.dir_removed(provider, &name);
        }
    }

    /// Splits an event path into the owning directory relative to the root
    /// and the final component's name.
    fn locate(&self, path: &Path) -> Option<(PathBuf, String)> {
        let parent = path.parent()?;
        let name = path.file_name()?.to_string_lossy().into_owned();
        let rel = parent.strip_prefix(&self.root_path).ok()?.to_path_buf();
        Some((rel, name))
    }
}

/// Walks child maps along `rel`'s components.
fn descend<'a>(mut node: &'a mut Node, rel: &Path) -> Option<&'a mut Node> {
    for component in rel.components() {
        let name = component.as_os_str().to_string_lossy();
        node = node.children.get_mut(name.as_ref())?;
    }
    Some(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;
    use std::time::Duration;

    use archway_core::domain::SyncBatch;
    use archway_core::ports::BatchDispatcher;

    /// Fake provider recording watch registrations, with optional failures.
    #[derive(Clone, Default)]
    struct FakeProvider(Arc<Mutex<FakeState>>);

    #[derive(Default)]
    struct FakeState {
        added: Vec<PathBuf>,
        removed: Vec<PathBuf>,
        fail: HashSet<PathBuf>,
    }

    impl FakeProvider {
        fn fail_for(&self, path: &Path) {
            self.0.lock().unwrap().fail.insert(path.to_path_buf());
        }

        fn added(&self) -> Vec<PathBuf> {
            self.0.lock().unwrap().added.clone()
        }

        fn removed(&self) -> Vec<PathBuf> {
            self.0.lock().unwrap().removed.clone()
        }
    }

    impl WatchProvider for FakeProvider {
        fn add_watch(&mut self, path: &Path) -> Result<WatchHandle, archway_core::domain::WatchError> {
            let mut state = self.0.lock().unwrap();
            if state.fail.contains(path) {
                return Err(archway_core::domain::WatchError::AddFailed {
                    path: path.to_path_buf(),
                    message: "watch limit reached".to_string(),
                });
            }
            state.added.push(path.to_path_buf());
            Ok(WatchHandle::new(path))
        }

        fn remove_watch(
            &mut self,
            handle: WatchHandle,
        ) -> Result<(), archway_core::domain::WatchError> {
            self.0
                .lock()
                .unwrap()
                .removed
                .push(handle.path().to_path_buf());
            Ok(())
        }
    }

    struct RecordingDispatcher {
        batches: Mutex<Vec<SyncBatch>>,
    }

    impl RecordingDispatcher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(Vec::new()),
            })
        }

        fn batches(&self) -> Vec<SyncBatch> {
            self.batches.lock().unwrap().clone()
        }
    }

    impl BatchDispatcher for RecordingDispatcher {
        fn dispatch(&self, batch: SyncBatch) {
            self.batches.lock().unwrap().push(batch);
        }
    }

    const DELAY: Duration = Duration::from_millis(40);

    fn tree_over(
        root: &Path,
        delay: Duration,
        exclude: Option<Regex>,
    ) -> (WatchTree<FakeProvider>, FakeProvider, Arc<RecordingDispatcher>) {
        let provider = FakeProvider::default();
        let dispatcher = RecordingDispatcher::new();
        let scheduler = AggregationScheduler::new(delay, dispatcher.clone());
        let tree = WatchTree::new(provider.clone(), root, exclude, scheduler);
        (tree, provider, dispatcher)
    }

    #[tokio::test]
    async fn test_initial_build_watches_existing_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("run1/det1")).unwrap();
        std::fs::create_dir(dir.path().join("run2")).unwrap();

        let (mut tree, provider, _) = tree_over(dir.path(), DELAY, None);
        tree.create();

        let added = provider.added();
        assert!(added.contains(&dir.path().to_path_buf()));
        assert!(added.contains(&dir.path().join("run1")));
        assert!(added.contains(&dir.path().join("run1/det1")));
        assert!(added.contains(&dir.path().join("run2")));
    }

    #[tokio::test]
    async fn test_events_within_window_become_one_batch() {
        let dir = tempfile::tempdir().unwrap();
        let (mut tree, _, dispatcher) = tree_over(dir.path(), DELAY, None);
        tree.create();

        tree.handle_event(FsEvent::FileClosed(dir.path().join("a.tif")));
        tree.handle_event(FsEvent::FileClosed(dir.path().join("b.tif")));
        tree.handle_event(FsEvent::FileClosed(dir.path().join("c.tif")));

        // nothing may dispatch before the window expires
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(dispatcher.batches().is_empty());

        tokio::time::sleep(DELAY * 3).await;
        let batches = dispatcher.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].dir, dir.path());
        assert_eq!(batches[0].files, vec!["a.tif", "b.tif", "c.tif"]);
    }

    #[tokio::test]
    async fn test_zero_delay_dispatches_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let (mut tree, _, dispatcher) = tree_over(dir.path(), Duration::ZERO, None);
        tree.create();

        tree.handle_event(FsEvent::FileClosed(dir.path().join("a.tif")));

        let batches = dispatcher.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].files, vec!["a.tif"]);
    }

    #[tokio::test]
    async fn test_excluded_files_never_reach_a_batch() {
        let dir = tempfile::tempdir().unwrap();
        let exclude = Regex::new(r"\.tmp$").unwrap();
        let (mut tree, _, dispatcher) = tree_over(dir.path(), DELAY, Some(exclude));
        tree.create();

        tree.handle_event(FsEvent::FileClosed(dir.path().join("scratch.tmp")));
        tree.handle_event(FsEvent::FileClosed(dir.path().join("image.tif")));

        tokio::time::sleep(DELAY * 3).await;
        let batches = dispatcher.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].files, vec!["image.tif"]);
    }

    #[tokio::test]
    async fn test_removed_directory_deactivates_its_subtree() {
        let dir = tempfile::tempdir().unwrap();
        let run = dir.path().join("run1");
        std::fs::create_dir(&run).unwrap();

        let (mut tree, provider, dispatcher) = tree_over(dir.path(), DELAY, None);
        tree.create();

        tree.handle_event(FsEvent::DirRemoved(run.clone()));
        assert!(provider.removed().contains(&run));

        // the node is gone: events below it no longer produce batches
        tree.handle_event(FsEvent::FileClosed(run.join("late.tif")));
        tokio::time::sleep(DELAY * 3).await;
        assert!(dispatcher.batches().is_empty());

        // a created event rebuilds the subtree and events flow again
        tree.handle_event(FsEvent::DirCreated(run.clone()));
        tree.handle_event(FsEvent::FileClosed(run.join("new.tif")));
        tokio::time::sleep(DELAY * 3).await;
        let batches = dispatcher.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].dir, run);
    }

    #[tokio::test]
    async fn test_created_directory_picks_up_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let (mut tree, _, dispatcher) = tree_over(dir.path(), DELAY, None);
        tree.create();

        // the directory is populated before its create event is handled
        let run = dir.path().join("run1");
        std::fs::create_dir(&run).unwrap();
        std::fs::write(run.join("early.tif"), b"x").unwrap();

        tree.handle_event(FsEvent::DirCreated(run.clone()));

        tokio::time::sleep(DELAY * 3).await;
        let batches = dispatcher.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].dir, run);
        assert_eq!(batches[0].files, vec!["early.tif"]);
    }

    #[tokio::test]
    async fn test_initial_build_does_not_pick_up_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.tif"), b"x").unwrap();

        let (mut tree, _, dispatcher) = tree_over(dir.path(), DELAY, None);
        tree.create();

        tokio::time::sleep(DELAY * 3).await;
        assert!(dispatcher.batches().is_empty());
    }

    #[tokio::test]
    async fn test_failed_watch_degrades_only_that_node() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad");
        std::fs::create_dir_all(bad.join("inner")).unwrap();

        let (mut tree, provider, dispatcher) = tree_over(dir.path(), DELAY, None);
        provider.fail_for(&bad);
        tree.create();

        // the degraded node's child was still watched
        assert!(provider.added().contains(&bad.join("inner")));

        // and events for the child still flow
        tree.handle_event(FsEvent::FileClosed(bad.join("inner/a.tif")));
        tokio::time::sleep(DELAY * 3).await;
        assert_eq!(dispatcher.batches().len(), 1);
    }

    #[tokio::test]
    async fn test_teardown_cancels_pending_window() {
        let dir = tempfile::tempdir().unwrap();
        let (mut tree, _, dispatcher) = tree_over(dir.path(), DELAY, None);
        tree.create();

        tree.handle_event(FsEvent::FileClosed(dir.path().join("a.tif")));
        tree.teardown();

        tokio::time::sleep(DELAY * 3).await;
        assert!(dispatcher.batches().is_empty());
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("run1")).unwrap();

        let (mut tree, provider, _) = tree_over(dir.path(), DELAY, None);
        tree.create();

        tree.teardown();
        let removed_once = provider.removed().len();
        tree.teardown();
        assert_eq!(provider.removed().len(), removed_once);
    }

    #[tokio::test]
    async fn test_rename_halves_act_as_remove_and_create() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old");
        std::fs::create_dir(&old).unwrap();

        let (mut tree, provider, _) = tree_over(dir.path(), DELAY, None);
        tree.create();

        // rename: old disappears, new appears
        let new = dir.path().join("new");
        std::fs::rename(&old, &new).unwrap();
        tree.handle_event(FsEvent::RenamedFrom(old.clone()));
        tree.handle_event(FsEvent::RenamedTo(new.clone()));

        assert!(provider.removed().contains(&old));
        assert!(provider.added().contains(&new));
    }

    #[tokio::test]
    async fn test_events_outside_the_root_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (mut tree, _, dispatcher) = tree_over(dir.path(), Duration::ZERO, None);
        tree.create();

        tree.handle_event(FsEvent::FileClosed(PathBuf::from("/elsewhere/a.tif")));
        assert!(dispatcher.batches().is_empty());
    }
}
