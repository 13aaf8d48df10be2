//! Per-component installation records and the reconciliation rules built on
//! them.
//!
//! A manifest is one hidden JSON file per (output directory, component id).
//! It records the set of files a previous successful install wrote, plus the
//! origin it was installed from, and is the sole input for deciding whether a
//! re-run has anything to do and which files have gone stale.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{PrepError, Result};

pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// How the current install was produced. Used only for equality comparison
/// against the desired state; never used to replay an install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Origin {
    #[serde(rename = "version")]
    VersionCoordinates {
        project: String,
        version: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        build: Option<String>,
    },
    #[serde(rename = "url")]
    RemoteUrl { url: String },
    #[serde(rename = "local")]
    LocalFile {},
}

fn default_format_version() -> u32 {
    // Files written before the field existed are format 1
    MANIFEST_FORMAT_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "formatVersion", default = "default_format_version")]
    pub format_version: u32,
    /// Paths relative to the output directory, always inside it
    pub files: BTreeSet<String>,
    pub origin: Origin,
}

impl Manifest {
    pub fn new(origin: Origin, files: BTreeSet<String>) -> Self {
        Self {
            format_version: MANIFEST_FORMAT_VERSION,
            files,
            origin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallDecision {
    Skip,
    Install,
    ForceInstall,
}

fn manifest_path(dir: &Path, id: &str) -> Result<PathBuf> {
    if id.is_empty() || id.contains(['/', '\\']) {
        return Err(PrepError::InvalidParameter(format!(
            "invalid component id {id:?}"
        )));
    }
    Ok(dir.join(format!(".{id}.mcprep-manifest.json")))
}

/// Join a manifest-recorded relative path onto the output directory,
/// rejecting anything that could resolve outside of it.
fn safe_join(dir: &Path, relative: &str) -> Result<PathBuf> {
    let rel = Path::new(relative);
    let escapes = rel.is_absolute()
        || rel
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
    if escapes {
        return Err(PrepError::InvalidParameter(format!(
            "manifest path {relative:?} resolves outside the output directory"
        )));
    }
    Ok(dir.join(rel))
}

/// Load the manifest for a component, if any.
///
/// A file that is missing is `None`. A file that exists but fails to parse is
/// also `None`: the caller proceeds as though no prior install exists. That
/// is logged but never aborts the command.
pub fn load(dir: &Path, id: &str) -> Result<Option<Manifest>> {
    let path = manifest_path(dir, id)?;
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    match serde_json::from_slice(&bytes) {
        Ok(manifest) => Ok(Some(manifest)),
        Err(e) => {
            log::warn!(
                "Discarding unreadable manifest {}: {e}",
                path.display()
            );
            Ok(None)
        }
    }
}

/// Serialize and write the manifest, overwriting any previous file for the
/// same component. Only called after a successful install.
pub fn save(dir: &Path, id: &str, manifest: &Manifest) -> Result<()> {
    let path = manifest_path(dir, id)?;
    let json = serde_json::to_vec_pretty(manifest)?;
    fs::write(&path, json)?;
    Ok(())
}

/// True iff every file the manifest records still exists under `dir`.
pub fn all_files_present(dir: &Path, manifest: &Manifest) -> bool {
    manifest
        .files
        .iter()
        .all(|f| safe_join(dir, f).map(|p| p.exists()).unwrap_or(false))
}

/// Decide whether an install run has work to do.
pub fn decide(
    dir: &Path,
    prev: Option<&Manifest>,
    desired: &Origin,
    force: bool,
) -> InstallDecision {
    if force {
        return InstallDecision::ForceInstall;
    }
    match prev {
        None => InstallDecision::Install,
        Some(manifest) if &manifest.origin != desired => InstallDecision::Install,
        Some(manifest) if !all_files_present(dir, manifest) => InstallDecision::Install,
        Some(_) => InstallDecision::Skip,
    }
}

/// Delete files recorded by the previous install that the new install no
/// longer owns.
///
/// The stale set is computed strictly from the two manifests, never by
/// re-scanning the directory. Deleting an already-absent file is a no-op.
pub fn cleanup<F>(
    dir: &Path,
    prev: Option<&Manifest>,
    new: &Manifest,
    mut on_remove: F,
) -> Result<()>
where
    F: FnMut(&str),
{
    let Some(prev) = prev else {
        return Ok(());
    };

    for stale in prev.files.difference(&new.files) {
        let path = match safe_join(dir, stale) {
            Ok(path) => path,
            Err(e) => {
                // A tampered manifest must not let cleanup reach outside dir
                log::warn!("Skipping stale entry {stale:?}: {e}");
                continue;
            }
        };
        on_remove(stale);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
