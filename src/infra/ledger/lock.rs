//! Advisory file lock with bounded retry and stale-lock recovery.
//!
//! The lock is an exclusive `flock` on a sidecar `<file>.lock`. Each
//! acquisition opens its own descriptor, so two holders inside one process
//! exclude each other just like two processes do. The kernel drops the lock
//! when a holder dies; a holder that is alive but stuck is treated as
//! abandoned once its stamp is older than [`LockOptions::stale`], and a
//! contender unlinks the sidecar so the next attempt locks a fresh inode.
//!
//! A holder writes `<pid> <millis>` into the sidecar once it owns it and
//! truncates it again on release, so an empty sidecar under contention
//! belongs to a holder that has not stamped yet and is never stale.
//! Stamping a new hold and breaking a stale one both run under a second
//! `<file>.lock.break` guard: a breaker either sees the fresh stamp and
//! backs off, or unlinks first and the new holder notices its inode is gone.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;
use tracing::{debug, warn};

use crate::core::{MailerError, MailerResult};
use crate::util::clock::now_ms;

/// Retry and staleness policy for [`FileLock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Retries after the first failed attempt.
    pub retries: u32,
    /// Backoff multiplier between retries.
    pub factor: u32,
    /// Delay before the first retry.
    pub min_timeout: Duration,
    /// Upper bound on any single delay.
    pub max_timeout: Duration,
    /// Age after which a held lock is considered abandoned.
    pub stale: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            retries: 5,
            factor: 2,
            min_timeout: Duration::from_millis(100),
            max_timeout: Duration::from_millis(2000),
            stale: Duration::from_millis(5000),
        }
    }
}

impl LockOptions {
    /// Delay to wait after failed attempt number `attempt` (zero-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.factor.max(1).saturating_pow(attempt);
        self.min_timeout
            .saturating_mul(factor)
            .min(self.max_timeout)
    }

    /// Total attempts made before giving up.
    pub const fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Held exclusive lock on a target file. Released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    lock_path: PathBuf,
}

impl FileLock {
    /// Sidecar lock path for `target`.
    pub fn lock_path_for(target: &Path) -> PathBuf {
        let mut name = target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        target.with_file_name(name)
    }

    /// Acquire the lock for `target`, retrying with exponential backoff.
    ///
    /// # Errors
    ///
    /// Returns [`MailerError::LockAcquisition`] once every attempt found the
    /// lock held, or [`MailerError::Io`] if the sidecar cannot be opened.
    pub async fn acquire(target: &Path, options: &LockOptions) -> MailerResult<Self> {
        let lock_path = Self::lock_path_for(target);
        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let attempts = options.attempts();
        for attempt in 0..attempts {
            if let Some(lock) = Self::try_acquire(&lock_path, options.stale)? {
                debug!(path = %target.display(), attempt, "acquired ledger lock");
                return Ok(lock);
            }
            if attempt + 1 < attempts {
                tokio::time::sleep(options.backoff(attempt)).await;
            }
        }

        warn!(path = %target.display(), attempts, "gave up acquiring ledger lock");
        Err(MailerError::LockAcquisition {
            path: target.to_path_buf(),
            attempts,
        })
    }

    fn try_acquire(lock_path: &Path, stale: Duration) -> MailerResult<Option<Self>> {
        let file = open_rw(lock_path)?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                let Some(_guard) = BreakGuard::try_acquire(lock_path)? else {
                    let _ = FileExt::unlock(&file);
                    return Ok(None);
                };
                stamp(&file)?;
                // A breaker may have unlinked the path before we stamped;
                // holding an orphaned inode excludes nobody.
                if !same_file(&file, lock_path) {
                    let _ = file.set_len(0);
                    let _ = FileExt::unlock(&file);
                    return Ok(None);
                }
                Ok(Some(Self {
                    file,
                    lock_path: lock_path.to_path_buf(),
                }))
            }
            Err(e) if is_contended(&e) => {
                break_if_stale(&file, lock_path, stale)?;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Path of the sidecar lock file.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.set_len(0) {
            warn!(path = %self.lock_path.display(), error = %e, "failed to clear lock stamp");
        }
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.lock_path.display(), error = %e, "failed to release ledger lock");
        } else {
            debug!(path = %self.lock_path.display(), "released ledger lock");
        }
    }
}

fn is_contended(err: &io::Error) -> bool {
    let contended = fs2::lock_contended_error();
    err.kind() == contended.kind() || err.raw_os_error() == contended.raw_os_error()
}

/// Short-lived exclusive lock on `<file>.lock.break`, serializing a new
/// holder's stamp against a contender's stale check. Never unlinked.
struct BreakGuard(File);

impl BreakGuard {
    fn try_acquire(lock_path: &Path) -> MailerResult<Option<Self>> {
        let mut name = lock_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".break");
        let file = open_rw(&lock_path.with_file_name(name))?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(Self(file))),
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for BreakGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.0);
    }
}

fn open_rw(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
}

/// Record the holder and when it took the lock.
fn stamp(file: &File) -> io::Result<()> {
    file.set_len(0)?;
    let mut handle = file;
    handle.seek(SeekFrom::Start(0))?;
    write!(handle, "{} {}", std::process::id(), now_ms())?;
    handle.flush()
}

/// Millisecond timestamp of the current holder, if it has stamped.
fn read_stamp(file: &File) -> Option<u128> {
    let mut handle = file;
    let mut raw = String::new();
    handle.seek(SeekFrom::Start(0)).ok()?;
    handle.read_to_string(&mut raw).ok()?;
    raw.split_whitespace().nth(1)?.parse().ok()
}

/// Unlink the sidecar behind `file` if its holder stamped longer than
/// `stale` ago. Unstamped sidecars belong to a holder mid-acquire.
fn break_if_stale(file: &File, lock_path: &Path, stale: Duration) -> MailerResult<()> {
    let Some(_guard) = BreakGuard::try_acquire(lock_path)? else {
        return Ok(());
    };
    let Some(stamped_at) = read_stamp(file) else {
        return Ok(());
    };
    let age_ms = now_ms().saturating_sub(stamped_at);
    if age_ms <= stale.as_millis() || !same_file(file, lock_path) {
        return Ok(());
    }
    warn!(
        path = %lock_path.display(),
        age_ms,
        "ledger lock is stale, force-releasing"
    );
    if let Err(e) = fs::remove_file(lock_path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %lock_path.display(), error = %e, "failed to remove stale lock");
        }
    }
    Ok(())
}

#[cfg(unix)]
fn same_file(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (file.metadata(), fs::metadata(path)) {
        (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_file(_file: &File, path: &Path) -> bool {
    path.exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_then_caps() {
        let options = LockOptions::default();
        assert_eq!(options.backoff(0), Duration::from_millis(100));
        assert_eq!(options.backoff(1), Duration::from_millis(200));
        assert_eq!(options.backoff(3), Duration::from_millis(800));
        assert_eq!(options.backoff(5), Duration::from_millis(2000));
        assert_eq!(options.backoff(40), Duration::from_millis(2000));
        assert_eq!(options.attempts(), 6);
    }

    #[test]
    fn sidecar_sits_next_to_target() {
        let path = FileLock::lock_path_for(Path::new("local_db/sent_emails.json"));
        assert_eq!(path, PathBuf::from("local_db/sent_emails.json.lock"));
    }

    #[tokio::test]
    async fn second_holder_is_refused_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("ledger.json");
        let options = LockOptions {
            retries: 1,
            min_timeout: Duration::from_millis(5),
            max_timeout: Duration::from_millis(5),
            ..LockOptions::default()
        };

        let held = FileLock::acquire(&target, &options).await.unwrap();
        let err = FileLock::acquire(&target, &options).await.unwrap_err();
        assert!(matches!(err, MailerError::LockAcquisition { attempts: 2, .. }));

        drop(held);
        assert!(FileLock::acquire(&target, &options).await.is_ok());
    }

    #[tokio::test]
    async fn stale_lock_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("ledger.json");
        let options = LockOptions {
            retries: 3,
            min_timeout: Duration::from_millis(20),
            max_timeout: Duration::from_millis(20),
            stale: Duration::from_millis(10),
            ..LockOptions::default()
        };

        let _stuck = FileLock::acquire(&target, &options).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let recovered = FileLock::acquire(&target, &options).await;
        assert!(recovered.is_ok());
    }

    #[tokio::test]
    async fn release_clears_the_stamp() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("ledger.json");
        let held = FileLock::acquire(&target, &LockOptions::default()).await.unwrap();
        let sidecar = held.lock_path().to_path_buf();
        let stamped = fs::read_to_string(&sidecar).unwrap();
        assert_eq!(
            stamped.split_whitespace().next(),
            Some(std::process::id().to_string().as_str())
        );

        drop(held);
        assert_eq!(fs::read_to_string(&sidecar).unwrap(), "");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn idle_gap_does_not_break_a_holder_that_has_not_stamped() {
        use std::os::unix::fs::MetadataExt;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("ledger.json");
        let options = LockOptions {
            retries: 2,
            min_timeout: Duration::from_millis(5),
            max_timeout: Duration::from_millis(5),
            stale: Duration::from_millis(10),
            ..LockOptions::default()
        };

        let sidecar = FileLock::acquire(&target, &options)
            .await
            .unwrap()
            .lock_path()
            .to_path_buf();
        tokio::time::sleep(Duration::from_millis(30)).await;

        // Locked but not yet stamped, as a holder is right after its flock.
        let just_locked = open_rw(&sidecar).unwrap();
        FileExt::try_lock_exclusive(&just_locked).unwrap();
        let inode = just_locked.metadata().unwrap().ino();

        let err = FileLock::acquire(&target, &options).await.unwrap_err();
        assert!(matches!(err, MailerError::LockAcquisition { .. }));
        assert_eq!(fs::metadata(&sidecar).unwrap().ino(), inode);
    }
}
