//! The reusable install sequence every provider follows:
//! load manifest, decide, fetch, verify, reconcile, save.
//!
//! The provider-specific part, resolving the desired origin and producing
//! the artifact files, is handed in as an async closure. Everything before
//! the final save leaves the previous manifest untouched, so a failed run
//! retries from scratch.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::manifest::{self, InstallDecision, Manifest, Origin};
use crate::{PrepError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Previous install still matches the desired state; nothing was fetched
    UpToDate,
    /// A new manifest was written covering these relative paths
    Installed { files: Vec<String> },
}

/// Run one component's install to completion.
///
/// `produce` performs the provider-specific fetch (and hash verification)
/// and returns the absolute paths of every file it wrote. Each returned path
/// must lie inside `dir`.
pub async fn install<F, Fut>(
    dir: &Path,
    id: &str,
    origin: Origin,
    force: bool,
    produce: F,
) -> Result<InstallOutcome>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<Vec<PathBuf>>>,
{
    let prev = manifest::load(dir, id)?;

    match manifest::decide(dir, prev.as_ref(), &origin, force) {
        InstallDecision::Skip => {
            log::info!("{id} is already installed and up to date");
            return Ok(InstallOutcome::UpToDate);
        }
        decision => {
            log::debug!("Install decision for {id}: {decision:?}");
        }
    }

    let written = produce().await?;

    let mut files = BTreeSet::new();
    for path in &written {
        files.insert(relative_to(dir, path)?);
    }
    let new = Manifest::new(origin, files);

    manifest::cleanup(dir, prev.as_ref(), &new, |stale| {
        log::info!("Removing stale file {stale}");
    })?;
    manifest::save(dir, id, &new)?;

    Ok(InstallOutcome::Installed {
        files: new.files.into_iter().collect(),
    })
}

fn relative_to(dir: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(dir).map_err(|_| {
        PrepError::InvalidParameter(format!(
            "installed file {} is outside the output directory {}",
            path.display(),
            dir.display()
        ))
    })?;
    Ok(relative.to_string_lossy().replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn url_origin(url: &str) -> Origin {
        Origin::RemoteUrl {
            url: url.to_string(),
        }
    }

    async fn fake_install(dir: &Path, names: &[&str]) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for name in names {
            let path = dir.join(name);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, name.as_bytes()).await?;
            written.push(path);
        }
        Ok(written)
    }

    #[tokio::test]
    async fn test_first_run_installs_and_writes_manifest() {
        let dir = TempDir::new().unwrap();
        let origin = url_origin("https://example.com/server.jar");

        let outcome = install(dir.path(), "server", origin.clone(), false, || {
            fake_install(dir.path(), &["server.jar"])
        })
        .await
        .unwrap();

        assert_eq!(
            outcome,
            InstallOutcome::Installed {
                files: vec!["server.jar".to_string()]
            }
        );

        let saved = manifest::load(dir.path(), "server").unwrap().unwrap();
        assert_eq!(saved.origin, origin);
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let origin = url_origin("https://example.com/server.jar");
        let fetches = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let fetches = Arc::clone(&fetches);
            let root = dir.path();
            install(root, "server", origin.clone(), false, || async move {
                fetches.fetch_add(1, Ordering::SeqCst);
                fake_install(root, &["server.jar"]).await
            })
            .await
            .unwrap();
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_force_refetches_despite_matching_origin() {
        let dir = TempDir::new().unwrap();
        let origin = url_origin("https://example.com/server.jar");
        let fetches = Arc::new(AtomicUsize::new(0));

        for force in [false, true] {
            let fetches = Arc::clone(&fetches);
            let root = dir.path();
            install(root, "server", origin.clone(), force, || async move {
                fetches.fetch_add(1, Ordering::SeqCst);
                fake_install(root, &["server.jar"]).await
            })
            .await
            .unwrap();
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_origin_change_triggers_reinstall_and_cleanup() {
        let dir = TempDir::new().unwrap();

        install(
            dir.path(),
            "pack",
            url_origin("https://example.com/pack-v1.zip"),
            false,
            || fake_install(dir.path(), &["mods/old.jar", "config.yml"]),
        )
        .await
        .unwrap();

        let outcome = install(
            dir.path(),
            "pack",
            url_origin("https://example.com/pack-v2.zip"),
            false,
            || fake_install(dir.path(), &["mods/new.jar", "config.yml"]),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, InstallOutcome::Installed { .. }));
        assert!(!dir.path().join("mods/old.jar").exists());
        assert!(dir.path().join("mods/new.jar").exists());
        assert!(dir.path().join("config.yml").exists());
    }

    #[tokio::test]
    async fn test_failed_produce_leaves_previous_manifest_intact() {
        let dir = TempDir::new().unwrap();
        let v1 = url_origin("https://example.com/v1");

        install(dir.path(), "pack", v1.clone(), false, || {
            fake_install(dir.path(), &["a.jar"])
        })
        .await
        .unwrap();

        let err = install(
            dir.path(),
            "pack",
            url_origin("https://example.com/v2"),
            false,
            || async {
                Err(PrepError::Integrity {
                    path: "a.jar".to_string(),
                    algorithm: crate::verify::HashAlgorithm::Sha256,
                    expected: "aa".to_string(),
                    actual: "bb".to_string(),
                })
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PrepError::Integrity { .. }));

        let manifest = manifest::load(dir.path(), "pack").unwrap().unwrap();
        assert_eq!(manifest.origin, v1);
        assert!(dir.path().join("a.jar").exists());
    }

    #[tokio::test]
    async fn test_file_outside_dir_is_rejected() {
        let outer = TempDir::new().unwrap();
        let dir = outer.path().join("server");
        fs::create_dir(&dir).unwrap();
        let escape = outer.path().join("escape.jar");

        let err = install(
            &dir,
            "server",
            url_origin("https://example.com"),
            false,
            || async move {
                tokio::fs::write(&escape, b"x").await?;
                Ok(vec![escape.clone()])
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PrepError::InvalidParameter(_)));
        assert!(manifest::load(&dir, "server").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_file_on_disk_triggers_reinstall() {
        let dir = TempDir::new().unwrap();
        let origin = url_origin("https://example.com/server.jar");
        let fetches = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let fetches = Arc::clone(&fetches);
            let root = dir.path();
            install(root, "server", origin.clone(), false, || async move {
                fetches.fetch_add(1, Ordering::SeqCst);
                fake_install(root, &["server.jar"]).await
            })
            .await
            .unwrap();
            fs::remove_file(dir.path().join("server.jar")).unwrap();
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }
}
