//! Mapping bundle names to the files a page has to reference.

use std::fs;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use camino::{Utf8Path, Utf8PathBuf};
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::LoaderError;
use crate::manifest::{Bundles, Chunk, Manifest};

/// A resolved, caller-facing reference to an emitted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// Identifying name, shared by every bundle which contains this file.
    pub name: String,
    /// Location on disk, inside the configured output directory.
    pub path: Utf8PathBuf,
    /// URL under which the file is served.
    pub public_url: String,
    /// Subresource integrity digest, only present when the configuration
    /// asks for it.
    pub integrity: Option<String>,
}

impl Asset {
    /// File extension of the asset name, e.g. `js` for `main.3f1a.js`.
    pub fn extension(&self) -> Option<&str> {
        Utf8Path::new(&self.name).extension()
    }
}

/// Resolves `bundle` into its filtered assets, in the order the build tool
/// emitted them.
///
/// An empty list is a valid result: every chunk may have been filtered out.
pub fn resolve(
    manifest: &Manifest,
    bundle: &str,
    config: &Config,
) -> Result<Vec<Asset>, LoaderError> {
    let bundles = settled(manifest)?;

    let chunks = bundles
        .chunks
        .get(bundle)
        .ok_or_else(|| LoaderError::BundleNotFound {
            name: bundle.to_string(),
            known: bundles.chunks.keys().cloned().collect(),
        })?;

    let base = config.public_base();

    chunks
        .iter()
        .filter(|chunk| config.accepts(&chunk.name))
        .map(|chunk| {
            let public_url = match chunk.public_path.as_deref() {
                Some(url) if is_absolute(url) => url.to_string(),
                _ => format!("{base}{}", chunk.name),
            };

            to_asset(chunk, public_url, config)
        })
        .collect()
}

/// Resolves a single emitted file which is not necessarily part of a bundle,
/// such as an image referenced from a stylesheet.
///
/// Filters don't apply here, the file was asked for by name.
pub fn resolve_static(
    manifest: &Manifest,
    name: &str,
    config: &Config,
) -> Result<Asset, LoaderError> {
    let bundles = settled(manifest)?;

    let chunk = bundles
        .assets
        .get(name)
        .ok_or_else(|| LoaderError::AssetNotFound {
            name: name.to_string(),
        })?;

    let public_url = match (chunk.public_path.as_deref(), bundles.public_path.as_deref()) {
        (Some(url), _) if is_absolute(url) => url.to_string(),
        (_, Some(prefix)) if is_absolute(prefix) => join_url(prefix, &chunk.name),
        _ => format!("{}{}", config.public_base(), chunk.name),
    };

    to_asset(chunk, public_url, config)
}

fn settled(manifest: &Manifest) -> Result<&Bundles, LoaderError> {
    match manifest {
        Manifest::Done(bundles) => Ok(bundles),
        Manifest::Compile => Err(LoaderError::BuildInProgress),
        Manifest::Error { message, detail } => Err(LoaderError::Build {
            message: message.clone(),
            detail: detail.clone(),
        }),
    }
}

fn to_asset(chunk: &Chunk, public_url: String, config: &Config) -> Result<Asset, LoaderError> {
    let path = config.output_dir().join(&chunk.name);

    let integrity = match (config.integrity(), &chunk.integrity) {
        (false, _) => None,
        (true, Some(integrity)) => Some(integrity.clone()),
        (true, None) => Some(compute_integrity(&path)?),
    };

    Ok(Asset {
        name: chunk.name.clone(),
        path,
        public_url,
        integrity,
    })
}

fn compute_integrity(path: &Utf8Path) -> Result<String, LoaderError> {
    let bytes = fs::read(path).map_err(|source| LoaderError::AssetRead {
        path: path.to_owned(),
        source,
    })?;

    Ok(format!("sha256-{}", STANDARD.encode(Sha256::digest(&bytes))))
}

/// An URL is absolute when it is rooted (`/`, `//`) or carries a scheme.
fn is_absolute(url: &str) -> bool {
    if url.starts_with('/') {
        return true;
    }

    match url.split_once(':') {
        Some((scheme, _)) => {
            let mut chars = scheme.chars();
            chars.next().is_some_and(|c| c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

fn join_url(prefix: &str, name: &str) -> String {
    if prefix.ends_with('/') {
        format!("{prefix}{name}")
    } else {
        format!("{prefix}/{name}")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn config() -> Config {
        Config::builder("DEFAULT")
            .output_dir("/srv/assets/bundles")
            .manifest("stats.json")
            .public_path("/static/bundles/")
            .finish()
            .unwrap()
    }

    fn names(assets: &[Asset]) -> Vec<&str> {
        assets.iter().map(|a| a.name.as_str()).collect()
    }

    #[test]
    fn test_resolve_preserves_order() {
        let manifest = Manifest::done([(
            "main",
            vec![Chunk::new("main.js"), Chunk::new("main.css")],
        )]);

        let assets = resolve(&manifest, "main", &config()).unwrap();

        assert_eq!(
            assets,
            vec![
                Asset {
                    name: "main.js".into(),
                    path: "/srv/assets/bundles/main.js".into(),
                    public_url: "/static/bundles/main.js".into(),
                    integrity: None,
                },
                Asset {
                    name: "main.css".into(),
                    path: "/srv/assets/bundles/main.css".into(),
                    public_url: "/static/bundles/main.css".into(),
                    integrity: None,
                },
            ]
        );
    }

    #[test]
    fn test_resolve_excludes_source_maps() {
        let manifest = Manifest::done([(
            "main",
            vec![
                Chunk::new("vendors.js"),
                Chunk::new("main.js"),
                Chunk::new("main.js.map"),
                Chunk::new("main.css"),
            ],
        )]);

        let assets = resolve(&manifest, "main", &config()).unwrap();
        assert_eq!(names(&assets), ["vendors.js", "main.js", "main.css"]);
    }

    #[test]
    fn test_resolve_include_only() {
        let config = Config::builder("DEFAULT")
            .output_dir("dist")
            .manifest("stats.json")
            .include("*.css*")
            .finish()
            .unwrap();
        let manifest = Manifest::done([(
            "main",
            vec![
                Chunk::new("main.js"),
                Chunk::new("main.css"),
                Chunk::new("main.css.map"),
            ],
        )]);

        let assets = resolve(&manifest, "main", &config).unwrap();
        assert_eq!(names(&assets), ["main.css"]);
    }

    #[test]
    fn test_resolve_empty_after_filtering() {
        let manifest = Manifest::done([("maps", vec![Chunk::new("main.js.map")])]);

        assert!(resolve(&manifest, "maps", &config()).unwrap().is_empty());
    }

    #[test]
    fn test_resolve_absolute_public_path() {
        let manifest = Manifest::done([(
            "main",
            vec![
                Chunk::new("main.js").with_public_path("http://custom-static-host.com/main.js"),
                Chunk::new("main.css").with_public_path("main.css"),
            ],
        )]);

        let assets = resolve(&manifest, "main", &config()).unwrap();
        assert_eq!(assets[0].public_url, "http://custom-static-host.com/main.js");
        assert_eq!(assets[1].public_url, "/static/bundles/main.css");
    }

    #[test]
    fn test_resolve_unknown_bundle() {
        let manifest = Manifest::done([
            ("app1", vec![Chunk::new("app1.js")]),
            ("app2", vec![Chunk::new("app2.js")]),
        ]);

        let err = resolve(&manifest, "missing_bundle", &config()).unwrap_err();
        match err {
            LoaderError::BundleNotFound { name, known } => {
                assert_eq!(name, "missing_bundle");
                assert_eq!(known, ["app1", "app2"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_resolve_in_progress() {
        assert!(matches!(
            resolve(&Manifest::Compile, "main", &config()),
            Err(LoaderError::BuildInProgress)
        ));
    }

    #[test]
    fn test_resolve_build_error() {
        let manifest = Manifest::Error {
            message: "Module not found: Error: Can't resolve 'the-library-that-did-not-exist'"
                .into(),
            detail: None,
        };

        let err = resolve(&manifest, "main", &config()).unwrap_err();
        assert!(matches!(&err, LoaderError::Build { message, .. } if message.contains("Can't resolve")));
    }

    #[test]
    fn test_resolve_static() {
        let Manifest::Done(mut bundles) = Manifest::done([("main", vec![Chunk::new("main.js")])])
        else {
            unreachable!()
        };
        bundles
            .assets
            .insert("my-image.png".into(), Chunk::new("my-image.png"));

        let manifest = Manifest::Done(bundles.clone());
        let asset = resolve_static(&manifest, "my-image.png", &config()).unwrap();
        assert_eq!(asset.public_url, "/static/bundles/my-image.png");

        bundles.public_path = Some("http://custom-static-host.com/".into());
        let manifest = Manifest::Done(bundles);
        let asset = resolve_static(&manifest, "my-image.png", &config()).unwrap();
        assert_eq!(asset.public_url, "http://custom-static-host.com/my-image.png");

        assert!(matches!(
            resolve_static(&manifest, "nope.png", &config()),
            Err(LoaderError::AssetNotFound { .. })
        ));
    }

    #[test]
    fn test_integrity_prefers_manifest_digest() {
        let config = Config::builder("DEFAULT")
            .output_dir("/nonexistent")
            .manifest("stats.json")
            .integrity(true)
            .finish()
            .unwrap();
        let manifest = Manifest::done([(
            "main",
            vec![Chunk::new("main.js").with_integrity("sha384-abc")],
        )]);

        let assets = resolve(&manifest, "main", &config).unwrap();
        assert_eq!(assets[0].integrity.as_deref(), Some("sha384-abc"));

        let manifest = Manifest::done([("main", vec![Chunk::new("main.js")])]);
        assert!(matches!(
            resolve(&manifest, "main", &config),
            Err(LoaderError::AssetRead { .. })
        ));
    }

    #[test]
    fn test_is_absolute() {
        assert!(is_absolute("/static/main.js"));
        assert!(is_absolute("//cdn.example.com/main.js"));
        assert!(is_absolute("https://cdn.example.com/main.js"));
        assert!(!is_absolute("main.js"));
        assert!(!is_absolute("bundles/main.js"));
        assert!(!is_absolute("1http://nope"));
    }

    #[test]
    fn test_extension() {
        let asset = Asset {
            name: "main.js.gz".into(),
            path: "dist/main.js.gz".into(),
            public_url: "/main.js.gz".into(),
            integrity: None,
        };

        assert_eq!(asset.extension(), Some("gz"));
    }
}
