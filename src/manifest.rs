//! Snapshot of the stats manifest written by the build tool.
//!
//! The build tool overwrites the manifest whenever its state changes. A
//! [`Manifest`] is an immutable, already decoded copy of one such write.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::error::LoaderError;

/// Build status reported by the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The build is still running.
    Compile,
    /// The build finished and the bundles are available.
    Done,
    /// The build failed.
    Error,
}

/// A single emitted file belonging to a bundle, as described by the build tool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Logical identifier, usually the emitted file name including its hash.
    #[serde(default)]
    pub name: String,
    /// Path as emitted by the build tool, if it reported one.
    pub path: Option<Utf8PathBuf>,
    /// Public path as emitted by the build tool, either an absolute URL or a
    /// relative path.
    pub public_path: Option<String>,
    /// Subresource integrity digest, if the build tool computed one.
    pub integrity: Option<String>,
}

impl Chunk {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            public_path: None,
            integrity: None,
        }
    }

    pub fn with_public_path(mut self, public_path: impl Into<String>) -> Self {
        self.public_path = Some(public_path.into());
        self
    }

    pub fn with_integrity(mut self, integrity: impl Into<String>) -> Self {
        self.integrity = Some(integrity.into());
        self
    }
}

/// Output of a finished build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bundles {
    /// Bundle name to its chunks, in the order the build tool emitted them.
    pub chunks: BTreeMap<String, Vec<Chunk>>,
    /// Every emitted file, including those which don't belong to any bundle
    /// (e.g. images referenced from styles).
    pub assets: BTreeMap<String, Chunk>,
    /// Public path the build tool was configured with.
    pub public_path: Option<String>,
}

/// Immutable snapshot of the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Manifest {
    Compile,
    Done(Bundles),
    Error {
        message: String,
        detail: Option<String>,
    },
}

impl Manifest {
    /// Creates a finished manifest from bundle names and their chunks.
    pub fn done<I, S>(bundles: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<Chunk>)>,
        S: Into<String>,
    {
        let chunks: BTreeMap<String, Vec<Chunk>> = bundles
            .into_iter()
            .map(|(name, chunks)| (name.into(), chunks))
            .collect();

        let assets = chunks
            .values()
            .flatten()
            .map(|chunk| (chunk.name.clone(), chunk.clone()))
            .collect();

        Manifest::Done(Bundles {
            chunks,
            assets,
            public_path: None,
        })
    }

    pub fn status(&self) -> Status {
        match self {
            Manifest::Compile => Status::Compile,
            Manifest::Done(_) => Status::Done,
            Manifest::Error { .. } => Status::Error,
        }
    }

    pub fn is_compiling(&self) -> bool {
        matches!(self, Manifest::Compile)
    }

    /// Decodes the JSON written by the bundle tracker plugin.
    ///
    /// `path` is only used for error reporting. Bytes which are not JSON at
    /// all are a read error, JSON of the wrong shape is a shape error.
    pub fn from_json(bytes: &[u8], path: &Utf8Path) -> Result<Self, LoaderError> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|err| LoaderError::ManifestRead {
                path: path.to_owned(),
                source: err.into(),
            })?;

        let shape = |reason: String| LoaderError::BadManifestShape {
            path: path.to_owned(),
            reason,
        };

        let status = match value.get("status") {
            Some(serde_json::Value::String(status)) => status.clone(),
            Some(_) => return Err(shape("'status' is not a string".into())),
            None => return Err(shape("missing 'status'".into())),
        };

        match status.as_str() {
            "compile" => Ok(Manifest::Compile),
            "error" => {
                let raw: RawError =
                    serde_json::from_value(value).map_err(|err| shape(err.to_string()))?;

                Ok(Manifest::Error {
                    message: raw
                        .message
                        .or_else(|| raw.error.clone())
                        .unwrap_or_else(|| "Unknown build error".into()),
                    detail: raw.error,
                })
            }
            "done" => {
                let raw: RawDone =
                    serde_json::from_value(value).map_err(|err| shape(err.to_string()))?;

                Ok(Manifest::Done(raw.into_bundles().map_err(shape)?))
            }
            other => Err(shape(format!("unrecognized status '{other}'"))),
        }
    }
}

#[derive(Deserialize)]
struct RawError {
    error: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawChunk {
    Name(String),
    Record(Chunk),
}

#[derive(Deserialize)]
struct RawDone {
    #[serde(default)]
    chunks: BTreeMap<String, Vec<RawChunk>>,
    #[serde(default)]
    assets: BTreeMap<String, Chunk>,
    #[serde(rename = "publicPath")]
    public_path: Option<String>,
}

impl RawDone {
    fn into_bundles(self) -> Result<Bundles, String> {
        let mut assets = self.assets;
        for (key, asset) in assets.iter_mut() {
            if asset.name.is_empty() {
                asset.name = key.clone();
            }
        }

        let chunks = self
            .chunks
            .into_iter()
            .map(|(bundle, list)| {
                let list = list
                    .into_iter()
                    .map(|chunk| {
                        let chunk = match chunk {
                            RawChunk::Name(name) => assets
                                .get(&name)
                                .cloned()
                                .unwrap_or_else(|| Chunk::new(name)),
                            RawChunk::Record(chunk) => chunk,
                        };

                        if chunk.name.is_empty() {
                            return Err(format!("chunk without a name in bundle '{bundle}'"));
                        }

                        Ok(chunk)
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                Ok((bundle, list))
            })
            .collect::<Result<BTreeMap<_, _>, String>>()?;

        // Older tracker versions only list files under `chunks`.
        for chunk in chunks.values().flatten() {
            if !assets.contains_key(&chunk.name) {
                assets.insert(chunk.name.clone(), chunk.clone());
            }
        }

        Ok(Bundles {
            chunks,
            assets,
            public_path: self.public_path,
        })
    }
}
