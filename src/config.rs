//! Named, validated configurations.
//!
//! Configurations are created once at startup, either from deserialized
//! [`Settings`] or through [`Config::builder`], and are immutable afterwards.
//! All problems are reported together as a list of [`ConfigError`]s so a
//! misconfigured deployment fails before it serves a single request.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use glob::Pattern;
use serde::Deserialize;

use crate::error::{ConfigError, LoaderError};

/// Name of the configuration which must always exist.
pub const DEFAULT: &str = "DEFAULT";

const DEFAULT_EXCLUDE: &[&str] = &["*.map", "*.hot-update.js"];
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Raw, unvalidated settings for a single named configuration.
///
/// Durations are given in seconds. A `timeout` of `0` disables the timeout,
/// which is only meant for local development.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub output_dir: Option<Utf8PathBuf>,
    pub manifest: Option<Utf8PathBuf>,
    pub timeout: Option<f64>,
    pub poll_interval: Option<f64>,
    pub debug: Option<bool>,
    pub exclude: Option<Vec<String>>,
    pub include: Option<String>,
    pub public_path: Option<String>,
    pub integrity: Option<bool>,
}

impl Settings {
    /// Keys recognized inside a single configuration, used to detect a
    /// configuration object that was not nested under a name.
    const KEYS: &'static [&'static str] = &[
        "output_dir",
        "manifest",
        "timeout",
        "poll_interval",
        "debug",
        "exclude",
        "include",
        "public_path",
        "integrity",
    ];

    fn validate(self, name: &str) -> Result<Config, Vec<ConfigError>> {
        let mut errors = Vec::new();

        if self.output_dir.as_ref().is_none_or(|p| p.as_str().is_empty()) {
            errors.push(ConfigError::MissingKey(name.to_string(), "output_dir"));
        }
        if self.manifest.as_ref().is_none_or(|p| p.as_str().is_empty()) {
            errors.push(ConfigError::MissingKey(name.to_string(), "manifest"));
        }

        let timeout = match self.timeout {
            None => Some(DEFAULT_TIMEOUT),
            Some(secs) if secs == 0.0 => None,
            Some(secs) => match Duration::try_from_secs_f64(secs) {
                Ok(duration) => Some(duration),
                Err(_) => {
                    errors.push(ConfigError::Invalid(
                        name.to_string(),
                        format!("timeout must be a non-negative number of seconds, got {secs}"),
                    ));
                    None
                }
            },
        };

        let poll_interval = match self.poll_interval {
            None => DEFAULT_POLL_INTERVAL,
            Some(secs) => match Duration::try_from_secs_f64(secs) {
                Ok(duration) if !duration.is_zero() => duration,
                _ => {
                    errors.push(ConfigError::Invalid(
                        name.to_string(),
                        format!("poll_interval must be a positive number of seconds, got {secs}"),
                    ));
                    DEFAULT_POLL_INTERVAL
                }
            },
        };

        let compile = |source: &str, errors: &mut Vec<ConfigError>| match Pattern::new(source) {
            Ok(pattern) => Some(pattern),
            Err(err) => {
                errors.push(ConfigError::Pattern(
                    name.to_string(),
                    source.to_string(),
                    err.to_string(),
                ));
                None
            }
        };

        let exclude: Vec<Pattern> = match &self.exclude {
            Some(list) => list
                .iter()
                .filter_map(|source| compile(source.as_str(), &mut errors))
                .collect(),
            None => DEFAULT_EXCLUDE
                .iter()
                .filter_map(|&source| compile(source, &mut errors))
                .collect(),
        };

        let include = self
            .include
            .as_deref()
            .and_then(|source| compile(source, &mut errors));

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Config {
            name: name.to_string(),
            output_dir: self.output_dir.unwrap_or_default(),
            manifest: self.manifest.unwrap_or_default(),
            timeout,
            poll_interval,
            debug: self.debug.unwrap_or(false),
            exclude,
            include,
            public_path: self.public_path.unwrap_or_default(),
            integrity: self.integrity.unwrap_or(false),
        })
    }
}

/// A single validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    name: String,
    output_dir: Utf8PathBuf,
    manifest: Utf8PathBuf,
    timeout: Option<Duration>,
    poll_interval: Duration,
    debug: bool,
    exclude: Vec<Pattern>,
    include: Option<Pattern>,
    public_path: String,
    integrity: bool,
}

impl Config {
    /// Starts building a configuration programmatically.
    pub fn builder(name: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder {
            name: name.into(),
            settings: Settings::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory the build tool writes its output files into.
    pub fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }

    /// Path of the stats manifest written by the build tool.
    pub fn manifest(&self) -> &Utf8Path {
        &self.manifest
    }

    /// `None` means the poller waits indefinitely.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Whether an in-progress build should be waited for. Only enabled in
    /// debug mode; in production the in-progress manifest is returned as is.
    pub fn wait_for_completion(&self) -> bool {
        self.debug
    }

    pub fn integrity(&self) -> bool {
        self.integrity
    }

    /// Exclude patterns are evaluated first, so a file matching both the
    /// exclude and the include pattern is dropped.
    pub fn accepts(&self, file: &str) -> bool {
        if self.exclude.iter().any(|pattern| pattern.matches(file)) {
            return false;
        }

        match &self.include {
            Some(pattern) => pattern.matches(file),
            None => true,
        }
    }

    /// URL prefix for emitted files, always ending with `/` unless empty.
    ///
    /// An unset public path is derived from the last component of the output
    /// directory, e.g. `assets/bundles` -> `/bundles/`.
    pub fn public_base(&self) -> Cow<'_, str> {
        if self.public_path.is_empty() {
            return match self.output_dir.file_name() {
                Some(dir) => Cow::Owned(format!("/{dir}/")),
                None => Cow::Borrowed("/"),
            };
        }

        if self.public_path.ends_with('/') {
            Cow::Borrowed(&self.public_path)
        } else {
            Cow::Owned(format!("{}/", self.public_path))
        }
    }
}

/// Fluent builder for [`Config`], validated on [`finish`](Self::finish).
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    name: String,
    settings: Settings,
}

impl ConfigBuilder {
    pub fn output_dir(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.settings.output_dir = Some(path.into());
        self
    }

    pub fn manifest(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.settings.manifest = Some(path.into());
        self
    }

    /// A zero duration disables the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout = Some(timeout.as_secs_f64());
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.settings.poll_interval = Some(interval.as_secs_f64());
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.settings.debug = Some(debug);
        self
    }

    /// Replaces the default exclude list.
    pub fn exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.exclude = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.settings.include = Some(pattern.into());
        self
    }

    pub fn public_path(mut self, path: impl Into<String>) -> Self {
        self.settings.public_path = Some(path.into());
        self
    }

    pub fn integrity(mut self, integrity: bool) -> Self {
        self.settings.integrity = Some(integrity);
        self
    }

    pub fn finish(self) -> Result<Config, Vec<ConfigError>> {
        self.settings.validate(&self.name)
    }
}

/// Immutable set of named configurations.
#[derive(Debug, Clone)]
pub struct Registry {
    configs: BTreeMap<String, Arc<Config>>,
}

impl Registry {
    /// Collects already built configurations. A `DEFAULT` entry is required
    /// and names must be unique.
    pub fn new(configs: impl IntoIterator<Item = Config>) -> Result<Self, Vec<ConfigError>> {
        let mut errors = Vec::new();
        let mut map = BTreeMap::new();

        for config in configs {
            let name = config.name.clone();
            if map.insert(name.clone(), Arc::new(config)).is_some() {
                errors.push(ConfigError::Invalid(
                    name,
                    "duplicate configuration name".into(),
                ));
            }
        }

        let registry = Self { configs: map };
        errors.extend(registry.validate_all());

        if errors.is_empty() {
            Ok(registry)
        } else {
            Err(errors)
        }
    }

    /// Validates every named settings record, reporting all problems at once.
    pub fn from_settings(
        settings: impl IntoIterator<Item = (String, Settings)>,
    ) -> Result<Self, Vec<ConfigError>> {
        let mut errors = Vec::new();
        let mut configs = Vec::new();
        let mut has_default = false;

        for (name, settings) in settings {
            has_default |= name == DEFAULT;
            match settings.validate(&name) {
                Ok(config) => configs.push(config),
                Err(errs) => errors.extend(errs),
            }
        }

        if !has_default {
            errors.push(ConfigError::MissingDefault);
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Self::new(configs)
    }

    /// Deserializes and validates a `{name: settings}` mapping.
    pub fn from_value(value: serde_json::Value) -> Result<Self, Vec<ConfigError>> {
        let serde_json::Value::Object(map) = value else {
            return Err(vec![ConfigError::Invalid(
                String::new(),
                "expected a mapping of configuration names to settings".into(),
            )]);
        };

        let flat = map
            .iter()
            .any(|(key, value)| Settings::KEYS.contains(&key.as_str()) && !value.is_object());
        if flat {
            return Err(vec![ConfigError::Flat]);
        }

        let mut errors = Vec::new();
        let mut settings = Vec::with_capacity(map.len());

        for (name, value) in map {
            match serde_json::from_value::<Settings>(value) {
                Ok(parsed) => settings.push((name, parsed)),
                Err(err) => errors.push(ConfigError::Invalid(name, err.to_string())),
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Self::from_settings(settings)
    }

    pub fn get(&self, name: &str) -> Result<Arc<Config>, LoaderError> {
        self.configs
            .get(name)
            .cloned()
            .ok_or_else(|| LoaderError::ConfigNotFound(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(String::as_str)
    }

    /// Startup check over the held configurations.
    pub fn validate_all(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if !self.configs.contains_key(DEFAULT) {
            errors.push(ConfigError::MissingDefault);
        }

        for config in self.configs.values() {
            if config.output_dir.as_str().is_empty() {
                errors.push(ConfigError::MissingKey(config.name.clone(), "output_dir"));
            }
            if config.manifest.as_str().is_empty() {
                errors.push(ConfigError::MissingKey(config.name.clone(), "manifest"));
            }
        }

        errors
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn default_config() -> Config {
        Config::builder(DEFAULT)
            .output_dir("assets/bundles")
            .manifest("stats.json")
            .finish()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = default_config();

        assert_eq!(config.timeout(), Some(DEFAULT_TIMEOUT));
        assert_eq!(config.poll_interval(), DEFAULT_POLL_INTERVAL);
        assert!(!config.wait_for_completion());
        assert!(!config.accepts("main.js.map"));
        assert!(!config.accepts("main.4f2a.hot-update.js"));
        assert!(config.accepts("main.js"));
        assert_eq!(config.public_base(), "/bundles/");
    }

    #[test]
    fn test_zero_timeout_disables_timeout() {
        let config = Config::builder(DEFAULT)
            .output_dir("dist")
            .manifest("stats.json")
            .timeout(Duration::ZERO)
            .finish()
            .unwrap();

        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let config = Config::builder(DEFAULT)
            .output_dir("dist")
            .manifest("stats.json")
            .exclude(["*.map"])
            .include("main.*")
            .finish()
            .unwrap();

        assert!(config.accepts("main.js"));
        assert!(!config.accepts("main.js.map"));
        assert!(!config.accepts("vendors.js"));
    }

    #[test]
    fn test_public_base_trailing_slash() {
        let config = Config::builder(DEFAULT)
            .output_dir("dist")
            .manifest("stats.json")
            .public_path("https://cdn.example.com/static")
            .finish()
            .unwrap();

        assert_eq!(config.public_base(), "https://cdn.example.com/static/");
    }

    #[test]
    fn test_missing_keys_are_all_reported() {
        let errors = Config::builder("APP").finish().unwrap_err();

        assert_eq!(
            errors,
            vec![
                ConfigError::MissingKey("APP".into(), "output_dir"),
                ConfigError::MissingKey("APP".into(), "manifest"),
            ]
        );
    }

    #[test]
    fn test_malformed_pattern() {
        let errors = Config::builder(DEFAULT)
            .output_dir("dist")
            .manifest("stats.json")
            .include("[main")
            .finish()
            .unwrap_err();

        assert!(matches!(&errors[..], [ConfigError::Pattern(name, source, _)] if name == DEFAULT && source == "[main"));
    }

    #[test]
    fn test_invalid_durations() {
        let errors = Config::builder(DEFAULT)
            .output_dir("dist")
            .manifest("stats.json")
            .poll_interval(Duration::ZERO)
            .finish()
            .unwrap_err();

        assert!(matches!(&errors[..], [ConfigError::Invalid(..)]));

        let settings = Settings {
            output_dir: Some("dist".into()),
            manifest: Some("stats.json".into()),
            timeout: Some(-1.0),
            ..Settings::default()
        };
        let errors = Registry::from_settings([(DEFAULT.to_string(), settings)]).unwrap_err();
        assert!(matches!(&errors[..], [ConfigError::Invalid(..)]));
    }

    #[test]
    fn test_registry_requires_default() {
        let config = Config::builder("OTHER")
            .output_dir("dist")
            .manifest("stats.json")
            .finish()
            .unwrap();

        let errors = Registry::new([config]).unwrap_err();
        assert_eq!(errors, vec![ConfigError::MissingDefault]);
    }

    #[test]
    fn test_registry_rejects_duplicate_names() {
        let other = Config::builder(DEFAULT)
            .output_dir("other/bundles")
            .manifest("other-stats.json")
            .finish()
            .unwrap();

        let errors = Registry::new([default_config(), other]).unwrap_err();
        assert_eq!(
            errors,
            vec![ConfigError::Invalid(
                DEFAULT.to_string(),
                "duplicate configuration name".to_string()
            )]
        );

        let settings = Settings {
            output_dir: Some("dist".into()),
            manifest: Some("stats.json".into()),
            ..Settings::default()
        };
        let errors = Registry::from_settings([
            (DEFAULT.to_string(), settings.clone()),
            (DEFAULT.to_string(), settings),
        ])
        .unwrap_err();
        assert!(matches!(&errors[..], [ConfigError::Invalid(name, _)] if name == DEFAULT));
    }

    #[test]
    fn test_registry_get() {
        let registry = Registry::new([default_config()]).unwrap();

        assert_eq!(registry.get(DEFAULT).unwrap().name(), DEFAULT);
        assert!(matches!(
            registry.get("NOPE"),
            Err(LoaderError::ConfigNotFound(name)) if name == "NOPE"
        ));
        assert!(registry.validate_all().is_empty());
    }

    #[test]
    fn test_from_value_flat_config() {
        let errors = Registry::from_value(json!({
            "output_dir": "assets/bundles",
            "manifest": "stats.json",
        }))
        .unwrap_err();

        assert_eq!(errors, vec![ConfigError::Flat]);
    }

    #[test]
    fn test_from_value_named_configs() {
        let registry = Registry::from_value(json!({
            "DEFAULT": {
                "output_dir": "assets/bundles",
                "manifest": "stats.json",
                "debug": true,
                "timeout": 0.5,
            },
            "NO_IGNORE": {
                "output_dir": "assets/bundles",
                "manifest": "stats.json",
                "exclude": [],
            },
        }))
        .unwrap();

        let default = registry.get(DEFAULT).unwrap();
        assert!(default.wait_for_completion());
        assert_eq!(default.timeout(), Some(Duration::from_millis(500)));

        let no_ignore = registry.get("NO_IGNORE").unwrap();
        assert!(no_ignore.accepts("main.js.map"));
    }

    #[test]
    fn test_from_value_unknown_key() {
        let errors = Registry::from_value(json!({
            "DEFAULT": {
                "output_dir": "dist",
                "manifest": "stats.json",
                "stats_file": "oops.json",
            },
        }))
        .unwrap_err();

        assert!(matches!(&errors[..], [ConfigError::Invalid(name, _)] if name == DEFAULT));
    }

    #[test]
    fn test_from_value_empty_default() {
        let errors = Registry::from_value(json!({ "DEFAULT": {} })).unwrap_err();

        assert_eq!(errors.len(), 2);
        assert!(!errors.contains(&ConfigError::MissingDefault));
    }
}
