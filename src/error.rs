use std::time::Duration;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors reported while validating the configuration set at startup.
///
/// These are never raised lazily: [`Registry::from_settings`](crate::Registry::from_settings)
/// collects all of them up front and hands back the whole list.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No configuration named 'DEFAULT' was provided")]
    MissingDefault,

    #[error(
        "The configuration looks like a single unnamed set of settings. \
         Nest it under a name, e.g. {{\"DEFAULT\": {{...}}}}"
    )]
    Flat,

    #[error("Configuration '{0}': missing required key '{1}'")]
    MissingKey(String, &'static str),

    #[error("Configuration '{0}': invalid pattern '{1}': {2}")]
    Pattern(String, String, String),

    #[error("Configuration '{0}': invalid value: {1}")]
    Invalid(String, String),
}

/// Every failure this crate reports to a caller.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Configuration '{0}' not found")]
    ConfigNotFound(String),

    #[error(
        "Error reading {path}. Are you sure the build tool has generated the file \
         and the path is correct?\n{source}"
    )]
    ManifestRead {
        path: Utf8PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error(
        "The stats file does not contain valid data ({reason}). Make sure the bundle \
         tracker plugin is enabled and try to run the build again."
    )]
    BadManifestShape { path: Utf8PathBuf, reason: String },

    #[error("Timed out after {elapsed:?} (timeout {timeout:?}) waiting for the build to finish")]
    PollTimeout { elapsed: Duration, timeout: Duration },

    #[error("The build is still in progress")]
    BuildInProgress,

    #[error("{}", render_build_error(.message, .detail.as_deref()))]
    Build {
        message: String,
        detail: Option<String>,
    },

    #[error("Cannot resolve bundle {name}. Known bundles: [{}]", .known.join(", "))]
    BundleNotFound { name: String, known: Vec<String> },

    #[error("Asset '{name}' not found in the manifest")]
    AssetNotFound { name: String },

    #[error("Couldn't read emitted file {path} for integrity hashing.\n{source}")]
    AssetRead {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn render_build_error(message: &str, detail: Option<&str>) -> String {
    match detail {
        Some(detail) => format!("{detail}\n{message}"),
        None => message.to_string(),
    }
}
