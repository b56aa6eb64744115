//! Bounded file-system helpers shared by the file-backed services.

use std::{
    future::Future,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::{fs, io::AsyncWriteExt, task, time::timeout};
use tracing::warn;

use crate::base::error::{CaseError, CaseRes};

/// Run a storage step, turning both I/O failures and timeouts into `StorageUnavailable`.
pub async fn bounded<T, F>(path: &Path, limit: Duration, step: F) -> CaseRes<T>
where
    F: Future<Output = io::Result<T>>,
{
    match timeout(limit, step).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(CaseError::storage(path, err)),
        Err(_) => Err(timed_out(path, limit)),
    }
}

/// Read a file, returning `None` when it does not exist.
pub async fn read_optional(path: &Path, limit: Duration) -> CaseRes<Option<Vec<u8>>> {
    bounded(path, limit, async {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    })
    .await
}

/// Sibling file a replacement is staged in before it is renamed over `path`.
pub fn staging_path(path: &Path) -> PathBuf {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    PathBuf::from(staging)
}

/// Remove a staging file left behind by an earlier process.
pub async fn remove_stale_staging(path: &Path, limit: Duration) {
    let staging = staging_path(path);

    match timeout(limit, fs::remove_file(&staging)).await {
        Ok(Ok(())) => warn!("Removed stale staging file `{}`.", staging.display()),
        Ok(Err(err)) if err.kind() == io::ErrorKind::NotFound => {}
        Ok(Err(err)) => warn!("Could not remove staging file `{}`: {err}", staging.display()),
        Err(_) => warn!("Timed out removing staging file `{}`.", staging.display()),
    }
}

/// Where a replacement is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Staging,
    Abandoned,
    Renaming,
}

fn lock(phase: &Mutex<Phase>) -> MutexGuard<'_, Phase> {
    phase.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Replace a file's contents by writing a sibling staging file and renaming it over the target.
///
/// The whole sequence runs as one blocking task. If `limit` passes while the
/// staging file is still being written, the task is told to give up before the
/// rename and the call fails with a `TimedOut` source; the target is untouched.
/// If the rename has already started, its outcome is awaited and reported, so a
/// returned error always means the previous contents are still in place.
pub async fn write_replace(path: &Path, bytes: &[u8], limit: Duration) -> CaseRes<()> {
    let phase = Arc::new(Mutex::new(Phase::Staging));

    let mut handle = {
        let target = path.to_path_buf();
        let bytes = bytes.to_vec();
        let phase = phase.clone();
        task::spawn_blocking(move || replace_blocking(&target, &bytes, &phase))
    };

    let joined = match timeout(limit, &mut handle).await {
        Ok(joined) => joined,
        Err(_) => {
            let renaming = {
                let mut phase = lock(&phase);
                if *phase == Phase::Staging {
                    *phase = Phase::Abandoned;
                }
                *phase == Phase::Renaming
            };

            if !renaming {
                return Err(timed_out(path, limit));
            }

            warn!("Rename of `{}` outlived the storage timeout, awaiting it.", path.display());
            handle.await
        }
    };

    joined
        .map_err(|e| CaseError::storage(path, io::Error::other(e)))?
        .map_err(|e| CaseError::storage(path, e))
}

fn replace_blocking(path: &Path, bytes: &[u8], phase: &Mutex<Phase>) -> io::Result<()> {
    let staging = staging_path(path);
    let mut created = false;

    let result = (|| {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        // `create_new` keeps an abandoned writer and a fresh one off the same file.
        let mut file = std::fs::OpenOptions::new().write(true).create_new(true).open(&staging)?;
        created = true;

        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);

        {
            let mut phase = lock(phase);
            if *phase == Phase::Abandoned {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "replacement abandoned before rename"));
            }
            *phase = Phase::Renaming;
        }

        std::fs::rename(&staging, path)
    })();

    if result.is_err() && created {
        let _ = std::fs::remove_file(&staging);
    }

    result
}

fn timed_out(path: &Path, limit: Duration) -> CaseError {
    CaseError::storage(
        path,
        io::Error::new(io::ErrorKind::TimedOut, format!("storage step exceeded {}s", limit.as_secs_f64())),
    )
}

/// Append text to a file, creating it if needed.
///
/// Returns `true` when this call created the file.
pub async fn append_text(path: &Path, header: Option<&str>, text: &str, limit: Duration) -> CaseRes<bool> {
    bounded(path, limit, async {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let (mut file, created) = match fs::OpenOptions::new().write(true).create_new(true).open(path).await {
            Ok(file) => (file, true),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => (fs::OpenOptions::new().append(true).open(path).await?, false),
            Err(err) => return Err(err),
        };

        let mut contents = String::with_capacity(text.len() + header.map_or(0, str::len));
        if created {
            contents.push_str(header.unwrap_or_default());
        }
        contents.push_str(text);

        file.write_all(contents.as_bytes()).await?;
        file.flush().await?;

        Ok(created)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_write_replace_overwrites_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.json");

        write_replace(&path, b"first", LIMIT).await.unwrap();
        write_replace(&path, b"second", LIMIT).await.unwrap();

        assert_eq!(read_optional(&path, LIMIT).await.unwrap().unwrap(), b"second");
        assert!(!dir.path().join("nested").join("data.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_read_optional_missing_file() {
        let dir = tempfile::tempdir().unwrap();

        assert!(read_optional(&dir.path().join("absent"), LIMIT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_append_text_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");

        assert!(append_text(&path, Some("H\n"), "a\n", LIMIT).await.unwrap());
        assert!(!append_text(&path, Some("H\n"), "b\n", LIMIT).await.unwrap());

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "H\na\nb\n");
    }

    #[tokio::test]
    async fn test_write_replace_reports_unwritable_location() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        // A regular file cannot act as a parent directory.
        let err = write_replace(&blocker.join("data.json"), b"{}", LIMIT).await.unwrap_err();

        assert!(matches!(err, CaseError::StorageUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_bounded_times_out_with_timed_out_source() {
        let err = bounded(Path::new("stuck.json"), Duration::from_millis(20), std::future::pending::<io::Result<()>>())
            .await
            .unwrap_err();

        match err {
            CaseError::StorageUnavailable { path, source } => {
                assert_eq!(path, PathBuf::from("stuck.json"));
                assert_eq!(source.kind(), io::ErrorKind::TimedOut);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_abandoned_replacement_skips_rename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "old").unwrap();

        let phase = Mutex::new(Phase::Abandoned);
        let err = replace_blocking(&path, b"new", &phase).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old");
        assert!(!staging_path(&path).exists());
    }

    #[tokio::test]
    async fn test_occupied_staging_file_fails_without_touching_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "old").unwrap();
        std::fs::write(staging_path(&path), "in flight").unwrap();

        let err = write_replace(&path, b"new", LIMIT).await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old");
        assert_eq!(std::fs::read_to_string(staging_path(&path)).unwrap(), "in flight");
    }

    #[tokio::test]
    async fn test_remove_stale_staging() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(staging_path(&path), "leftover").unwrap();

        remove_stale_staging(&path, LIMIT).await;

        assert!(!staging_path(&path).exists());
    }
}
