#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod config;
mod dedup;
mod error;
mod io;
mod loader;
mod manifest;
pub mod poller;
pub mod resolver;
mod source;

pub use crate::config::{Config, ConfigBuilder, DEFAULT, Registry, Settings};
pub use crate::dedup::{Dedup, Scope, SharedScope};
pub use crate::error::{ConfigError, LoaderError};
pub use crate::loader::Loader;
pub use crate::manifest::{Bundles, Chunk, Manifest, Status};
pub use crate::resolver::Asset;
pub use crate::source::{ManifestSource, StaticSource, StatsFile};

/// Installs a `fmt` subscriber filtered by `RUST_LOG`. Does nothing if a
/// global subscriber is already set.
#[cfg(feature = "logging")]
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init();
}
