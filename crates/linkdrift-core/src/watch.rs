//! HEAD-reference watching for linked repositories.
//!
//! One subscription per watched dependency. Events arrive on a tokio channel
//! and are deliberately not coalesced: every HEAD change is one event, and
//! every event is one re-check for the subscriber. [`HeadWatch::stop`] (or
//! drop) unsubscribes and ends the stream, so the lifecycle — subscribe,
//! observe events, stop, stream ends — is testable.

use crate::error::Error;
use notify::{
    event::{CreateKind, ModifyKind},
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, warn};

/// An open subscription on one repository's HEAD reference file.
#[derive(Debug)]
pub struct HeadWatch {
    head_path: PathBuf,
    rx: mpsc::UnboundedReceiver<()>,
    watcher: Option<RecommendedWatcher>,
}

impl HeadWatch {
    /// Subscribe to changes of the HEAD file at `head_path`.
    ///
    /// git replaces HEAD by renaming a lock file into place, which swaps the
    /// inode out from under a file-level watch; watching the containing
    /// directory and filtering by path keeps the subscription alive across
    /// checkouts.
    ///
    /// # Errors
    /// Fails when the OS watcher cannot be created or registered.
    pub fn subscribe(head_path: &Path) -> Result<Self, Error> {
        let head_path = head_path.to_path_buf();
        let watch_dir = head_path
            .parent()
            .map_or_else(|| head_path.clone(), Path::to_path_buf);

        let (tx, rx) = mpsc::unbounded_channel();
        let filter_path = head_path.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if is_head_change(&event, &filter_path) && tx.send(()).is_err() {
                        warn!(path = %filter_path.display(), "watch receiver dropped");
                    }
                }
                Err(e) => {
                    error!(error = %e, "watch error");
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )
        .map_err(|e| Error::Watch {
            path: head_path.clone(),
            source: e,
        })?;

        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| Error::Watch {
                path: head_path.clone(),
                source: e,
            })?;

        Ok(Self {
            head_path,
            rx,
            watcher: Some(watcher),
        })
    }

    /// Wait for the next HEAD change. Returns `false` once the subscription
    /// has been stopped and all pending events are drained.
    pub async fn changed(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }

    /// Unsubscribe. Pending events remain receivable; after them,
    /// [`changed`](Self::changed) returns `false`.
    pub fn stop(&mut self) {
        self.watcher = None;
    }

    /// The HEAD file this subscription covers.
    #[must_use]
    pub fn head_path(&self) -> &Path {
        &self.head_path
    }
}

/// Creates, data writes, and renames touching the HEAD path count as
/// changes; metadata-only events and other files in `.git/` do not.
fn is_head_change(event: &Event, head_path: &Path) -> bool {
    let relevant_kind = matches!(
        event.kind,
        EventKind::Create(CreateKind::File)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
    );
    relevant_kind && event.paths.iter().any(|p| p == head_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn fake_repo(root: &Path) -> PathBuf {
        let git_dir = root.join(".git");
        fs::create_dir(&git_dir).unwrap();
        let head = git_dir.join("HEAD");
        fs::write(&head, "ref: refs/heads/main\n").unwrap();
        head
    }

    #[tokio::test]
    async fn test_head_change_delivers_event() {
        let dir = tempdir().unwrap();
        let head = fake_repo(dir.path());

        let mut watch = HeadWatch::subscribe(&head).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        fs::write(&head, "ref: refs/heads/feature\n").unwrap();
        assert!(timeout(WAIT, watch.changed()).await.unwrap());
    }

    #[tokio::test]
    async fn test_unrelated_file_filtered_out() {
        let dir = tempdir().unwrap();
        let head = fake_repo(dir.path());

        let mut watch = HeadWatch::subscribe(&head).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        fs::write(dir.path().join(".git/config"), "[core]\n").unwrap();
        assert!(timeout(Duration::from_millis(700), watch.changed())
            .await
            .is_err());

        fs::write(&head, "ref: refs/heads/feature\n").unwrap();
        assert!(timeout(WAIT, watch.changed()).await.unwrap());
    }

    #[tokio::test]
    async fn test_stop_ends_the_stream() {
        let dir = tempdir().unwrap();
        let head = fake_repo(dir.path());

        let mut watch = HeadWatch::subscribe(&head).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        fs::write(&head, "ref: refs/heads/feature\n").unwrap();
        assert!(timeout(WAIT, watch.changed()).await.unwrap());

        watch.stop();
        fs::write(&head, "ref: refs/heads/main\n").unwrap();

        // Buffered events may still drain; the stream must then end rather
        // than hang.
        loop {
            match timeout(WAIT, watch.changed()).await {
                Ok(true) => continue,
                Ok(false) => break,
                Err(_) => panic!("stream did not end after stop"),
            }
        }
    }

    #[test]
    fn test_is_head_change_matches_path_and_kind() {
        let head = Path::new("/repo/.git/HEAD");
        let data_change = Event {
            kind: EventKind::Modify(ModifyKind::Data(notify::event::DataChange::Any)),
            paths: vec![head.to_path_buf()],
            attrs: notify::event::EventAttributes::default(),
        };
        assert!(is_head_change(&data_change, head));

        let other_file = Event {
            kind: EventKind::Modify(ModifyKind::Data(notify::event::DataChange::Any)),
            paths: vec![PathBuf::from("/repo/.git/config")],
            attrs: notify::event::EventAttributes::default(),
        };
        assert!(!is_head_change(&other_file, head));

        let metadata_only = Event {
            kind: EventKind::Modify(ModifyKind::Metadata(
                notify::event::MetadataKind::Permissions,
            )),
            paths: vec![head.to_path_buf()],
            attrs: notify::event::EventAttributes::default(),
        };
        assert!(!is_head_change(&metadata_only, head));
    }
}
