//! Best-effort check for a newer release.
//!
//! The check runs as a background task while the sync proceeds and reports
//! through a oneshot channel. Whatever it has found by the end of the run is
//! logged; an unfinished check is abandoned.

use std::time::Duration;

use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use semver::{Prerelease, Version};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// Redirects to the tag of the most recent release.
pub const RELEASES_URL: &str = concat!(env!("CARGO_PKG_REPOSITORY"), "/releases/latest");

const CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// A release newer than the running binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInfo {
    /// Release tag as published, e.g. `v0.4.0`.
    pub latest: String,
}

/// Handle to a running update check.
#[derive(Debug)]
pub struct UpdateCheck {
    handle: JoinHandle<()>,
    result: oneshot::Receiver<Option<UpdateInfo>>,
}

impl UpdateCheck {
    /// Starts checking whether a release newer than `current` exists.
    pub fn spawn(current: &str) -> Self {
        Self::spawn_with_url(current, RELEASES_URL)
    }

    pub fn spawn_with_url(current: &str, url: &str) -> Self {
        let (tx, result) = oneshot::channel();
        let current = current.to_string();
        let url = url.to_string();
        let handle = tokio::spawn(async move {
            let info = check(&current, &url).await;
            let _ = tx.send(info);
        });
        Self { handle, result }
    }

    /// Returns what the check found so far without waiting, then stops it.
    pub fn finish(mut self) -> Option<UpdateInfo> {
        let info = self.result.try_recv().ok().flatten();
        self.handle.abort();
        info
    }
}

/// Asks `url` for its redirect target and compares the release tag with
/// `current`.
pub async fn check(current: &str, url: &str) -> Option<UpdateInfo> {
    if current.contains("dev") {
        debug!(version = current, "development build, skipping update check");
        return None;
    }

    let client = match reqwest::Client::builder()
        .redirect(Policy::none())
        .timeout(CHECK_TIMEOUT)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            debug!(error = %e, "cannot build update check client");
            return None;
        }
    };

    let response = match client.head(url).send().await {
        Ok(response) => response,
        Err(e) => {
            debug!(error = %e, "update check failed");
            return None;
        }
    };
    if !response.status().is_redirection() {
        debug!(status = %response.status(), "update check got no redirect");
        return None;
    }

    let location = response.headers().get(LOCATION)?.to_str().ok()?;
    let latest = tag_from_location(location)?;
    is_newer(&latest, current).then_some(UpdateInfo { latest })
}

/// Last path segment of a release redirect, e.g. `v1.2.3`.
pub fn tag_from_location(location: &str) -> Option<String> {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|tag| !tag.is_empty() && *tag != "latest")
        .map(str::to_string)
}

fn strip_v(version: &str) -> &str {
    let version = version.trim();
    version.strip_prefix('v').unwrap_or(version)
}

/// Parses a release tag or build version as semver.
///
/// A missing patch component reads as zero, and a `git describe` suffix
/// such as `-3-gabc123` is dropped since it marks a build after that tag.
fn parse_version(version: &str) -> Option<Version> {
    let version = strip_v(version);
    let mut parsed = Version::parse(version)
        .or_else(|_| Version::parse(&format!("{version}.0")))
        .ok()?;
    if is_describe_suffix(parsed.pre.as_str()) {
        parsed.pre = Prerelease::EMPTY;
    }
    Some(parsed)
}

fn is_describe_suffix(pre: &str) -> bool {
    pre.split_once("-g").is_some_and(|(commits, hash)| {
        !commits.is_empty()
            && commits.bytes().all(|b| b.is_ascii_digit())
            && !hash.is_empty()
            && hash.bytes().all(|b| b.is_ascii_hexdigit())
    })
}

/// True if `latest` is a newer release than `current`.
///
/// Versions compare by semver precedence. A tag semver rejects counts as
/// newer when it differs from `current`.
pub fn is_newer(latest: &str, current: &str) -> bool {
    match (parse_version(latest), parse_version(current)) {
        (Some(latest), Some(current)) => latest > current,
        _ => strip_v(latest) != strip_v(current),
    }
}
