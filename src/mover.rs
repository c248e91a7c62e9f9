//! Retry-safe relocation of finished artifacts into durable storage.
//!
//! Copies go to a sibling `.part` file which is then renamed over the
//! destination, so readers never see a half-written file. Sharing
//! violations (another process briefly holding the file, typically an
//! antivirus scanner or an indexer on Windows) are retried with a fixed
//! delay. If every attempt hits a lock, one streaming copy is tried before
//! the first lock error is reported. The source is left in place.
//!
//! Destinations in a shared directory are claimed with
//! [`reserve_destination`] before anything is copied there.

use crate::config::RetryPolicy;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Windows `ERROR_SHARING_VIOLATION` / `ERROR_LOCK_VIOLATION`.
#[cfg(windows)]
const WINDOWS_LOCK_ERRORS: &[i32] = &[32, 33];

/// True for errors caused by another process holding the file.
pub fn is_transient(e: &io::Error) -> bool {
    #[cfg(windows)]
    if e.raw_os_error().is_some_and(|c| WINDOWS_LOCK_ERRORS.contains(&c)) {
        return true;
    }
    matches!(
        e.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::ResourceBusy | io::ErrorKind::WouldBlock
    )
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempts are used up. `op` receives the 1-based attempt number.
///
/// On exhaustion the first transient error is returned.
pub async fn retry_transient<T, F, Fut>(policy: RetryPolicy, mut op: F) -> io::Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut first_err: Option<io::Error> = None;

    for attempt in 1..=attempts {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if is_transient(&e) => {
                debug!("Attempt {attempt}/{attempts} hit a lock: {e}");
                first_err.get_or_insert(e);
                if attempt < attempts {
                    tokio::time::sleep(Duration::from_millis(policy.delay_ms)).await;
                }
            }
            Err(e) => return Err(e),
        }
    }
    Err(first_err.unwrap_or_else(|| io::Error::other("no attempt was made")))
}

/// Copy `source` to `destination` through a `.part` sibling and a rename.
///
/// Each call writes its own part file, so relocations into the same
/// directory never share scratch space.
pub async fn relocate(source: &Path, destination: &Path, policy: RetryPolicy) -> io::Result<()> {
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let part = part_path(destination);

    let outcome = retry_transient(policy, |_| async {
        let result = async {
            tokio::fs::copy(source, &part).await?;
            tokio::fs::rename(&part, destination).await
        }
        .await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(&part).await;
        }
        result
    })
    .await;

    match outcome {
        Ok(()) => Ok(()),
        Err(e) if is_transient(&e) => {
            warn!(
                "Atomic copy to {} kept failing ({e}); trying a streaming copy",
                destination.display()
            );
            match stream_copy(source, &part, destination).await {
                Ok(()) => Ok(()),
                Err(fallback) => {
                    debug!("Streaming copy failed too: {fallback}");
                    let _ = tokio::fs::remove_file(&part).await;
                    Err(e)
                }
            }
        }
        Err(e) => Err(e),
    }
}

/// Most names tried by [`reserve_destination`] before giving up.
const RESERVE_ATTEMPTS: usize = 16;

/// Claim a destination for one artifact: `dir/name` if free, otherwise
/// `dir/{8 hex}_{name}`.
///
/// The name is claimed by creating an empty placeholder with `create_new`,
/// so concurrent callers asking for the same name always get distinct
/// paths. [`relocate`] later renames the real file over the placeholder;
/// remove it if that never happens.
pub async fn reserve_destination(dir: &Path, name: &str) -> io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let mut candidate = dir.join(name);
    for _ in 0..RESERVE_ATTEMPTS {
        let claimed = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await;
        match claimed {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                candidate = dir.join(format!("{}_{name}", short_hex()));
            }
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free name for '{name}' in {}", dir.display()),
    ))
}

fn short_hex() -> String {
    uuid::Uuid::new_v4().simple().to_string().chars().take(8).collect()
}

/// Private scratch sibling of `destination`: `{destination}.{8 hex}.part`.
fn part_path(destination: &Path) -> PathBuf {
    let mut s = destination.as_os_str().to_owned();
    s.push(format!(".{}.part", short_hex()));
    PathBuf::from(s)
}

async fn stream_copy(source: &Path, part: &Path, destination: &Path) -> io::Result<()> {
    let mut reader = tokio::fs::File::open(source).await?;
    let mut writer = tokio::fs::File::create(part).await?;
    tokio::io::copy(&mut reader, &mut writer).await?;
    writer.sync_all().await?;
    drop(writer);
    tokio::fs::rename(part, destination).await
}
