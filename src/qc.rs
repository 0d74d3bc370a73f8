use std::collections::BTreeSet;
use std::fs::File;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use tempfile::TempDir;
use tracing::{info, warn};

use crate::error::BridgeError;
use crate::fs_util::{extract_bridge_from_zip, gunzip};
use crate::store::StoreSummary;

/// A previously released store to compare against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorRelease {
    Local(Utf8PathBuf),
    Remote(String),
}

impl PriorRelease {
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.starts_with("http://") || value.starts_with("https://") {
            PriorRelease::Remote(value.to_string())
        } else {
            PriorRelease::Local(Utf8PathBuf::from(value))
        }
    }

    pub fn describe(&self) -> &str {
        match self {
            PriorRelease::Local(path) => path.as_str(),
            PriorRelease::Remote(url) => url.as_str(),
        }
    }
}

/// A prior release available on disk. Downloaded copies live in a temporary
/// directory that is removed when this value is dropped.
#[derive(Debug)]
pub struct FetchedRelease {
    path: Utf8PathBuf,
    _scratch: Option<TempDir>,
}

impl FetchedRelease {
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

pub trait ReleaseFetcher {
    fn fetch(&self, release: &PriorRelease) -> Result<FetchedRelease, BridgeError>;
}

#[derive(Clone)]
pub struct HttpReleaseFetcher {
    client: Client,
}

impl HttpReleaseFetcher {
    pub fn new() -> Result<Self, BridgeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("wd2bridge/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| BridgeError::ReleaseFetch(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(None::<Duration>)
            .build()
            .map_err(|err| BridgeError::ReleaseFetch(err.to_string()))?;
        Ok(Self { client })
    }

    fn download(&self, url: &str) -> Result<FetchedRelease, BridgeError> {
        let scratch = tempfile::Builder::new()
            .prefix("wd2bridge-release")
            .tempdir()
            .map_err(|err| BridgeError::Filesystem(err.to_string()))?;
        let file_name = url
            .rsplit('/')
            .next()
            .map(|name| name.split(['?', '#']).next().unwrap_or(name))
            .filter(|name| !name.is_empty())
            .unwrap_or("previous.bridge");
        let download_path = scratch.path().join(file_name);

        info!(%url, "downloading previous release");
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| BridgeError::ReleaseFetch(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "download failed".to_string());
            return Err(BridgeError::ReleaseStatus { status, message });
        }
        let mut file = File::create(&download_path)
            .map_err(|err| BridgeError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| BridgeError::ReleaseFetch(err.to_string()))?;
        drop(file);

        let store_path = if file_name.ends_with(".zip") {
            extract_bridge_from_zip(&download_path, scratch.path())?
        } else if let Some(stem) = file_name.strip_suffix(".gz") {
            let target = scratch.path().join(stem);
            gunzip(&download_path, &target)?;
            target
        } else {
            download_path
        };

        let path = Utf8PathBuf::from_path_buf(store_path)
            .map_err(|_| BridgeError::Filesystem("invalid temp path".to_string()))?;
        Ok(FetchedRelease {
            path,
            _scratch: Some(scratch),
        })
    }
}

impl ReleaseFetcher for HttpReleaseFetcher {
    fn fetch(&self, release: &PriorRelease) -> Result<FetchedRelease, BridgeError> {
        match release {
            PriorRelease::Local(path) => Ok(FetchedRelease {
                path: path.clone(),
                _scratch: None,
            }),
            PriorRelease::Remote(url) => self.download(url),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InfoChange {
    pub key: String,
    pub old: Option<String>,
    pub new: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountChange {
    pub name: String,
    pub old: u64,
    pub new: u64,
    /// Relative change against the old count; absent when the old count is zero.
    pub percent: Option<f64>,
}

impl CountChange {
    fn new(name: &str, old: u64, new: u64) -> Self {
        let percent = (old > 0).then(|| (new as f64 - old as f64) * 100.0 / old as f64);
        Self {
            name: name.to_string(),
            old,
            new,
            percent,
        }
    }

    pub fn is_change(&self) -> bool {
        self.old != self.new
    }
}

/// Differences between a prior release and a freshly built store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QcReport {
    pub old: String,
    pub new: String,
    pub info: Vec<InfoChange>,
    pub added_sources: Vec<String>,
    pub removed_sources: Vec<String>,
    pub identifiers: Vec<CountChange>,
    pub links: CountChange,
    pub attributes: Vec<CountChange>,
}

impl QcReport {
    pub fn compare(old_label: &str, old: &StoreSummary, new_label: &str, new: &StoreSummary) -> Self {
        let keys: BTreeSet<&String> = old.info.keys().chain(new.info.keys()).collect();
        let info = keys
            .into_iter()
            .filter(|key| key.as_str() != "BUILDDATE")
            .filter_map(|key| {
                let before = old.info.get(key);
                let after = new.info.get(key);
                (before != after).then(|| InfoChange {
                    key: key.clone(),
                    old: before.cloned(),
                    new: after.cloned(),
                })
            })
            .collect();

        let added_sources = new
            .identifiers
            .keys()
            .filter(|code| !old.identifiers.contains_key(*code))
            .cloned()
            .collect();
        let removed_sources = old
            .identifiers
            .keys()
            .filter(|code| !new.identifiers.contains_key(*code))
            .cloned()
            .collect();

        let codes: BTreeSet<&String> = old.identifiers.keys().chain(new.identifiers.keys()).collect();
        let identifiers = codes
            .into_iter()
            .map(|code| {
                CountChange::new(
                    code,
                    old.identifiers.get(code).copied().unwrap_or(0),
                    new.identifiers.get(code).copied().unwrap_or(0),
                )
            })
            .collect();

        let names: BTreeSet<&String> = old.attributes.keys().chain(new.attributes.keys()).collect();
        let attributes = names
            .into_iter()
            .map(|name| {
                CountChange::new(
                    name,
                    old.attributes.get(name).copied().unwrap_or(0),
                    new.attributes.get(name).copied().unwrap_or(0),
                )
            })
            .collect();

        Self {
            old: old_label.to_string(),
            new: new_label.to_string(),
            info,
            added_sources,
            removed_sources,
            identifiers,
            links: CountChange::new("links", old.links, new.links),
            attributes,
        }
    }

    pub fn has_differences(&self) -> bool {
        !self.info.is_empty()
            || !self.added_sources.is_empty()
            || !self.removed_sources.is_empty()
            || self.identifiers.iter().any(CountChange::is_change)
            || self.links.is_change()
            || self.attributes.iter().any(CountChange::is_change)
    }

    pub fn log(&self) {
        info!(old = %self.old, new = %self.new, "quality control");
        for change in &self.info {
            warn!(key = %change.key, old = ?change.old, new = ?change.new, "header changed");
        }
        for code in &self.added_sources {
            info!(%code, "new data source");
        }
        for code in &self.removed_sources {
            warn!(%code, "data source missing from new store");
        }
        for change in self.identifiers.iter().chain(self.attributes.iter()) {
            log_count(change);
        }
        log_count(&self.links);
        if !self.has_differences() {
            info!("no differences found");
        }
    }
}

fn log_count(change: &CountChange) {
    if !change.is_change() {
        return;
    }
    match change.percent {
        Some(percent) if percent < 0.0 => warn!(
            name = %change.name,
            old = change.old,
            new = change.new,
            "count dropped by {:.1}%",
            -percent
        ),
        Some(percent) => info!(
            name = %change.name,
            old = change.old,
            new = change.new,
            "count grew by {:.1}%",
            percent
        ),
        None => info!(name = %change.name, new = change.new, "new count"),
    }
}

/// Fetches `release` if needed and compares it with the store at `new_store`.
pub fn run_qc<F: ReleaseFetcher + ?Sized>(
    fetcher: &F,
    release: &PriorRelease,
    new_store: &Utf8Path,
) -> Result<QcReport, BridgeError> {
    let fetched = fetcher.fetch(release)?;
    let old = StoreSummary::open(fetched.path())?;
    let new = StoreSummary::open(new_store)?;
    Ok(QcReport::compare(
        release.describe(),
        &old,
        new_store.as_str(),
        &new,
    ))
}
