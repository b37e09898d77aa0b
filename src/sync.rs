//! Sync orchestrator
//! Walks the configured lists, fetches each playlist/guide pair, and rewrites
//! the playlist against the freshly built guide index. One entry failing
//! never stops the others; the failed entry simply waits for the next cycle.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use crate::fetch::Fetcher;
use crate::guide::GuideIndex;
use crate::playlist;
use crate::store::{valid_name, ListEntry, ListStore};

/// Result of the most recent sync attempt for one entry
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub playlist_fetched: bool,
    pub guide_fetched: bool,
    /// Channels tagged by the rewrite, when one ran
    pub matched: Option<u64>,
    /// Failure description for the stage that stopped this entry
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SyncOutcome {
    fn failed(playlist_fetched: bool, guide_fetched: bool, error: String) -> Self {
        Self {
            playlist_fetched,
            guide_fetched,
            matched: None,
            error: Some(error),
            timestamp: Utc::now(),
        }
    }
}

/// Drives fetch + reconcile cycles over every configured entry
pub struct Syncer {
    store: Arc<ListStore>,
    data_dir: PathBuf,
    fetcher: Fetcher,
    status: RwLock<HashMap<String, SyncOutcome>>,
}

impl Syncer {
    pub fn new(store: Arc<ListStore>, data_dir: PathBuf, fetcher: Fetcher) -> Self {
        Self {
            store,
            data_dir,
            fetcher,
            status: RwLock::new(HashMap::new()),
        }
    }

    /// Run one full pass over all configured entries, in configuration
    /// order. Entries are processed sequentially; a failure is recorded and
    /// the cycle moves on.
    pub fn run_cycle(&self) {
        let entries = self.store.snapshot();
        info!(lists = entries.len(), "sync cycle started");

        for entry in &entries {
            let outcome = self.sync_entry(entry);
            match &outcome.error {
                Some(err) => warn!(list = %entry.name, %err, "list skipped this cycle"),
                None => info!(
                    list = %entry.name,
                    matched = outcome.matched.unwrap_or(0),
                    "list updated"
                ),
            }
            self.status.write().insert(entry.name.clone(), outcome);
        }

        info!("sync cycle finished");
    }

    fn sync_entry(&self, entry: &ListEntry) -> SyncOutcome {
        // The store validates names on admission; a stale or hand-edited
        // config file must not get a second chance at path traversal here.
        if !valid_name(&entry.name) {
            return SyncOutcome::failed(false, false, format!("invalid name {:?}", entry.name));
        }

        let (playlist_path, guide_path, output_path) = artifact_paths(&self.data_dir, &entry.name);

        if let Err(e) = self.fetcher.fetch(&entry.m3u, &playlist_path) {
            return SyncOutcome::failed(false, false, format!("playlist fetch: {e}"));
        }

        if let Err(e) = self.fetcher.fetch(&entry.epg, &guide_path) {
            return SyncOutcome::failed(true, false, format!("guide fetch: {e}"));
        }

        let index = match GuideIndex::from_file(&guide_path) {
            Ok(index) => index,
            Err(e) => return SyncOutcome::failed(true, true, format!("guide parse: {e}")),
        };
        if index.is_empty() {
            warn!(list = %entry.name, "guide contains no usable channels");
        }

        match playlist::rewrite(&playlist_path, &index, &output_path) {
            Ok(stats) => SyncOutcome {
                playlist_fetched: true,
                guide_fetched: true,
                matched: Some(stats.matched),
                error: None,
                timestamp: Utc::now(),
            },
            Err(e) => SyncOutcome::failed(true, true, format!("rewrite: {e}")),
        }
    }

    /// Last known outcome per entry, for the status view
    pub fn status(&self) -> HashMap<String, SyncOutcome> {
        self.status.read().clone()
    }

    /// Start one cycle outside the regular schedule, without blocking the
    /// caller. Deliberately fire-and-forget: the manual trigger neither
    /// cancels nor waits for the periodic cycle.
    pub fn trigger_now(self: &Arc<Self>) {
        let syncer = Arc::clone(self);
        thread::spawn(move || syncer.run_cycle());
    }

    /// Run cycles forever on a dedicated thread: once immediately, then
    /// after every `interval`. A message on (or the drop of) the paired
    /// sender ends the loop; a cycle already in progress runs to completion
    /// before the thread exits.
    pub fn run_periodic(
        self: Arc<Self>,
        interval: Duration,
        shutdown: mpsc::Receiver<()>,
    ) -> std::io::Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name("sync-cycle".to_string())
            .spawn(move || loop {
                self.run_cycle();
                match shutdown.recv_timeout(interval) {
                    Err(mpsc::RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                        info!("sync scheduler stopped");
                        break;
                    }
                }
            })
    }
}

/// Artifact paths for a list name: raw playlist, raw guide, rewritten
/// playlist. The naming is a contract with the file-serving endpoint.
pub fn artifact_paths(data_dir: &Path, name: &str) -> (PathBuf, PathBuf, PathBuf) {
    (
        data_dir.join(format!("{name}.m3u")),
        data_dir.join(format!("{name}.xml.gz")),
        data_dir.join(format!("{name}_matched.m3u")),
    )
}
