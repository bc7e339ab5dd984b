use std::fs;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::Config;
use crate::error::LoaderError;
use crate::manifest::Manifest;

/// Produces the current manifest snapshot for a configuration.
///
/// Implementations are read-only views of something the build tool writes.
/// Every call must reflect the latest state; no caching across calls.
pub trait ManifestSource: Send + Sync {
    fn read(&self, config: &Config) -> Result<Manifest, LoaderError>;
}

/// Reads the JSON stats file at [`Config::manifest`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsFile;

impl ManifestSource for StatsFile {
    fn read(&self, config: &Config) -> Result<Manifest, LoaderError> {
        let path = config.manifest();
        let bytes = fs::read(path).map_err(|err| LoaderError::ManifestRead {
            path: path.to_owned(),
            source: err.into(),
        })?;

        Manifest::from_json(&bytes, path)
    }
}

/// Replays a fixed sequence of read outcomes, one per read. Once exhausted a
/// final snapshot is returned forever; a final error is returned only once.
///
/// Useful for driving the poller without a build tool.
#[derive(Debug)]
pub struct StaticSource {
    snapshots: Mutex<Vec<Result<Manifest, LoaderError>>>,
    reads: AtomicUsize,
}

impl StaticSource {
    pub fn new(snapshots: impl IntoIterator<Item = Manifest>) -> Self {
        Self::scripted(snapshots.into_iter().map(Ok))
    }

    /// Like [`new`](Self::new), but reads may also fail, e.g. to mimic the
    /// build tool truncating the manifest mid-write.
    pub fn scripted(outcomes: impl IntoIterator<Item = Result<Manifest, LoaderError>>) -> Self {
        let mut snapshots: Vec<_> = outcomes.into_iter().collect();
        snapshots.reverse();

        Self {
            snapshots: Mutex::new(snapshots),
            reads: AtomicUsize::new(0),
        }
    }

    /// Number of reads served so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl ManifestSource for StaticSource {
    fn read(&self, config: &Config) -> Result<Manifest, LoaderError> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        let mut snapshots = self
            .snapshots
            .lock()
            .map_err(|_| LoaderError::ManifestRead {
                path: config.manifest().to_owned(),
                source: anyhow::anyhow!("snapshot list poisoned"),
            })?;

        if let [Ok(last)] = snapshots.as_slice() {
            return Ok(last.clone());
        }

        snapshots.pop().unwrap_or_else(|| {
            Err(LoaderError::ManifestRead {
                path: config.manifest().to_owned(),
                source: anyhow::anyhow!("no snapshots to replay"),
            })
        })
    }
}
