//! Waiting for the build tool to settle.
//!
//! The build tool rewrites the manifest non-atomically, so while waiting a
//! failed read is treated as a torn write and retried. The very first read is
//! never retried: a missing or garbled manifest outside of a wait is fatal.

use std::thread;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::LoaderError;
use crate::io::as_overhead;
use crate::manifest::Manifest;
use crate::source::ManifestSource;

/// Loads the current manifest, blocking while the build is in progress if the
/// configuration asks for it.
///
/// With waiting disabled an in-progress snapshot is returned as is. With
/// waiting enabled the manifest is re-read every [`Config::poll_interval`]
/// until it leaves the `compile` state or [`Config::timeout`] elapses.
pub fn load(source: &dyn ManifestSource, config: &Config) -> Result<Manifest, LoaderError> {
    let manifest = source.read(config)?;

    if !manifest.is_compiling() || !config.wait_for_completion() {
        return Ok(manifest);
    }

    wait(source, config)
}

fn wait(source: &dyn ManifestSource, config: &Config) -> Result<Manifest, LoaderError> {
    let start = Instant::now();
    // A timeout too large to represent as an instant never expires.
    let deadline = config
        .timeout()
        .and_then(|timeout| Some((start.checked_add(timeout)?, timeout)));
    let interval = config.poll_interval();

    tracing::info!(
        config = config.name(),
        manifest = %config.manifest(),
        "build in progress, waiting for it to finish"
    );

    loop {
        let pause = match deadline {
            Some((deadline, timeout)) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(timed_out(start, timeout));
                }
                interval.min(remaining)
            }
            None => interval,
        };

        thread::sleep(pause);

        if let Some((deadline, timeout)) = deadline {
            if Instant::now() >= deadline {
                return Err(timed_out(start, timeout));
            }
        }

        match source.read(config) {
            Ok(Manifest::Compile) => continue,
            Ok(manifest) => {
                tracing::info!(
                    "build settled with status {:?} {}",
                    manifest.status(),
                    as_overhead(start.elapsed())
                );
                return Ok(manifest);
            }
            Err(err) => {
                tracing::debug!("transient manifest read failure, retrying: {err}");
            }
        }
    }
}

fn timed_out(start: Instant, timeout: Duration) -> LoaderError {
    let elapsed = start.elapsed();
    tracing::warn!(
        "gave up waiting for the build after {:?} {}",
        timeout,
        as_overhead(elapsed)
    );

    LoaderError::PollTimeout { elapsed, timeout }
}
