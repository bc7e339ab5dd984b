use std::sync::Arc;

use tracing::Level;

use crate::config::{Config, Registry};
use crate::dedup::{Dedup, Scope, SharedScope};
use crate::error::LoaderError;
use crate::manifest::Manifest;
use crate::poller;
use crate::resolver::{self, Asset};
use crate::source::{ManifestSource, StatsFile};

/// Resolves bundles for a single configuration.
///
/// A `Loader` holds no manifest state. Every call polls the source again,
/// because the build tool may have rewritten the manifest in the meantime.
pub struct Loader {
    config: Arc<Config>,
    source: Box<dyn ManifestSource>,
}

impl Loader {
    /// Creates a loader reading the JSON stats file from the configuration.
    pub fn new(config: Arc<Config>) -> Self {
        Self::with_source(config, StatsFile)
    }

    /// Creates a loader with a custom manifest source.
    pub fn with_source(config: Arc<Config>, source: impl ManifestSource + 'static) -> Self {
        Self {
            config,
            source: Box::new(source),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The current manifest, after waiting for the build if configured to.
    pub fn get_assets(&self) -> Result<Manifest, LoaderError> {
        poller::load(self.source.as_ref(), &self.config)
    }

    /// Every filtered asset of `bundle`, in emission order.
    pub fn get_bundle(&self, bundle: &str) -> Result<Vec<Asset>, LoaderError> {
        let span = tracing::span!(Level::INFO, "get_bundle", bundle, config = self.config.name());
        let _enter = span.enter();

        let manifest = self.get_assets()?;
        let assets = resolver::resolve(&manifest, bundle, &self.config)?;

        tracing::debug!("resolved {} assets", assets.len());
        Ok(assets)
    }

    /// Assets of `bundle` which weren't emitted yet in `scope`, optionally
    /// narrowed to a file extension (`"js"`, `"css"`, `"js.gz"`, ...).
    pub fn get_files(
        &self,
        bundle: &str,
        extension: Option<&str>,
        scope: &mut Scope,
        dedup: Dedup,
    ) -> Result<Vec<Asset>, LoaderError> {
        let assets = with_extension(self.get_bundle(bundle)?, extension);
        Ok(scope.filter_new(assets, dedup))
    }

    /// Like [`get_files`](Self::get_files) without an extension filter. This
    /// is the entry point for a renderer turning a bundle into tags.
    pub fn render(
        &self,
        bundle: &str,
        scope: &mut Scope,
        dedup: Dedup,
    ) -> Result<Vec<Asset>, LoaderError> {
        self.get_files(bundle, None, scope, dedup)
    }

    /// [`render`](Self::render) for a scope shared between threads.
    pub fn render_shared(
        &self,
        bundle: &str,
        scope: &SharedScope,
        dedup: Dedup,
    ) -> Result<Vec<Asset>, LoaderError> {
        Ok(scope.filter_new(self.get_bundle(bundle)?, dedup))
    }

    /// A single emitted file looked up by name, bypassing bundles and filters.
    pub fn get_static(&self, name: &str) -> Result<Asset, LoaderError> {
        let manifest = self.get_assets()?;
        resolver::resolve_static(&manifest, name, &self.config)
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("config", &self.config.name())
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Loader for the named configuration, reading its stats file.
    pub fn loader(&self, name: &str) -> Result<Loader, LoaderError> {
        Ok(Loader::new(self.get(name)?))
    }
}

fn with_extension(assets: Vec<Asset>, extension: Option<&str>) -> Vec<Asset> {
    let Some(extension) = extension else {
        return assets;
    };

    let suffix = format!(".{}", extension.trim_start_matches('.'));
    assets
        .into_iter()
        .filter(|asset| asset.name.ends_with(&suffix))
        .collect()
}
