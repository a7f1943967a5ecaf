use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::config::REGISTRY_SOURCES;
use crate::types::FatalError;

/// Downloads the configured registry documents.
pub fn fetch() -> Result<(), FatalError> {
    fetch_sources(REGISTRY_SOURCES)
}

/// Downloads each (url, destination) pair. Every file lands atomically: the
/// body goes to a temporary in the destination directory first and is
/// renamed over the destination only on full success, so a transport failure
/// never leaves a partial file behind.
pub fn fetch_sources(sources: &[(&str, &str)]) -> Result<(), FatalError> {
    for &(url, destination) in sources {
        fetch_one(url, Path::new(destination))?;
    }
    Ok(())
}

fn fetch_one(url: &str, destination: &Path) -> Result<(), FatalError> {
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    info!("downloading {} to {}", url, destination.display());
    let response = minreq::get(url).send().map_err(|source| FatalError::Fetch {
        url: String::from(url),
        source,
    })?;
    if !(200..300).contains(&response.status_code) {
        return Err(FatalError::FetchStatus {
            url: String::from(url),
            status: response.status_code,
        });
    }

    let temporary = part_file(destination);
    let written = fs::write(&temporary, response.as_bytes())
        .and_then(|_| fs::rename(&temporary, destination));
    if written.is_err() {
        let _ = fs::remove_file(&temporary);
    }
    written.map_err(FatalError::from)
}

fn part_file(destination: &Path) -> PathBuf {
    let mut name = OsString::from(destination.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}
