use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use flate2::read::GzDecoder;
use zip::ZipArchive;

use crate::error::BridgeError;

/// `<output_dir>/<yyyy-MM-dd>/<base>-<yyyy-MM-dd>.bridge`
pub fn dated_output_path(output_dir: &Utf8Path, base: &str, date: NaiveDate) -> Utf8PathBuf {
    let stamp = date.format("%Y-%m-%d").to_string();
    output_dir.join(&stamp).join(format!("{base}-{stamp}.bridge"))
}

pub fn ensure_parent(path: &Utf8Path) -> Result<(), BridgeError> {
    if let Some(parent) = path.parent() {
        if !parent.as_str().is_empty() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| BridgeError::Filesystem(err.to_string()))?;
        }
    }
    Ok(())
}

pub fn file_size(path: &Utf8Path) -> Result<u64, BridgeError> {
    fs::metadata(path.as_std_path())
        .map(|meta| meta.len())
        .map_err(|err| BridgeError::Filesystem(format!("stat {path}: {err}")))
}

/// Extracts the first `.bridge` entry of a zip archive (or its only file)
/// into `target_dir` and returns the extracted path.
pub fn extract_bridge_from_zip(zip_path: &Path, target_dir: &Path) -> Result<PathBuf, BridgeError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| BridgeError::Filesystem(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| BridgeError::Filesystem(err.to_string()))?;

    let mut first_bridge = None;
    let mut file_indexes = Vec::new();
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|err| BridgeError::Filesystem(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        if entry.enclosed_name().is_none() {
            return Err(BridgeError::Filesystem(
                "zip entry path traversal detected".to_string(),
            ));
        }
        if first_bridge.is_none() && entry.name().ends_with(".bridge") {
            first_bridge = Some(i);
        }
        file_indexes.push(i);
    }
    let index = match (first_bridge, file_indexes.as_slice()) {
        (Some(index), _) => index,
        (None, [only]) => *only,
        _ => {
            return Err(BridgeError::ReleaseFetch(format!(
                "no .bridge file inside {}",
                zip_path.display()
            )));
        }
    };

    let mut entry = archive
        .by_index(index)
        .map_err(|err| BridgeError::Filesystem(err.to_string()))?;
    let name = entry
        .enclosed_name()
        .and_then(|path| path.file_name().map(|name| name.to_owned()))
        .ok_or_else(|| BridgeError::Filesystem("zip entry has no file name".to_string()))?;
    let target = target_dir.join(name);
    let mut outfile =
        fs::File::create(&target).map_err(|err| BridgeError::Filesystem(err.to_string()))?;
    io::copy(&mut entry, &mut outfile).map_err(|err| BridgeError::Filesystem(err.to_string()))?;
    Ok(target)
}

pub fn gunzip(source: &Path, target: &Path) -> Result<(), BridgeError> {
    let file = fs::File::open(source)
        .map_err(|err| BridgeError::Filesystem(format!("open {}: {err}", source.display())))?;
    let mut decoder = GzDecoder::new(file);
    let mut outfile =
        fs::File::create(target).map_err(|err| BridgeError::Filesystem(err.to_string()))?;
    io::copy(&mut decoder, &mut outfile)
        .map_err(|err| BridgeError::Filesystem(format!("decompress {}: {err}", source.display())))?;
    Ok(())
}
