//! Session management for the Telegram client
//!
//! Provides:
//! - File-based session locking so two runs never share one session
//! - Opening the SQLite session file
//! - Client creation and guaranteed disconnect

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use grammers_client::client::updates::UpdatesLike;
use grammers_client::Client;
use grammers_mtsender::{SenderPool, SenderPoolHandle};
use grammers_session::storages::SqliteSession;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};

/// Session lock guard that ensures exclusive access to the Telegram session.
pub struct SessionLock {
    path: PathBuf,
    lock_file: Option<File>,
}

impl SessionLock {
    /// Acquire an exclusive lock on the session.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Error::LockError(format!("Failed to open lock file: {}", e)))?;

        match lock_file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                path,
                lock_file: Some(lock_file),
            }),
            Err(_) => {
                eprintln!(
                    "The session is already in use by another process. \
                     Wait for it to finish and try again."
                );
                Err(Error::SessionLocked)
            }
        }
    }

    /// Release the lock manually
    pub fn release(&mut self) {
        if let Some(file) = self.lock_file.take() {
            let _ = file.unlock();
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Whether a session file from an earlier login is present.
pub fn session_exists(config: &Config) -> bool {
    Path::new(&config.session_file()).exists()
}

/// Open the session file, creating it on first use.
pub fn open_session(config: &Config) -> Result<Arc<SqliteSession>> {
    let session_file = config.session_file();
    let session = SqliteSession::open(&session_file).map_err(|e| {
        Error::SessionNotFound(format!("Failed to open {}: {}", session_file, e))
    })?;
    Ok(Arc::new(session))
}

/// Holder for SenderPool components and Client
pub struct TelegramClient {
    pub client: Client,
    handle: SenderPoolHandle,
    _updates: mpsc::UnboundedReceiver<UpdatesLike>,
    runner: Option<tokio::task::JoinHandle<()>>,
}

impl TelegramClient {
    /// Create a new TelegramClient from session
    pub async fn connect(session: Arc<SqliteSession>, api_id: i32) -> Result<Self> {
        let pool = SenderPool::new(session, api_id);

        // Create client from pool (need reference to whole pool)
        let client = Client::new(&pool);

        let SenderPool {
            runner,
            updates,
            handle,
        } = pool;

        let runner = tokio::spawn(async move {
            runner.run().await;
        });
        debug!("sender pool started");

        Ok(Self {
            client,
            handle,
            _updates: updates,
            runner: Some(runner),
        })
    }

    /// Stop the sender pool and wait for its runner to exit.
    pub async fn disconnect(mut self) {
        self.handle.quit();
        if let Some(runner) = self.runner.take() {
            let _ = runner.await;
        }
        debug!("disconnected");
    }
}

impl Drop for TelegramClient {
    fn drop(&mut self) {
        if let Some(runner) = self.runner.take() {
            self.handle.quit();
            runner.abort();
        }
    }
}

// Implement Deref to allow using TelegramClient as &Client
impl std::ops::Deref for TelegramClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

/// Open the session and connect a client for it.
pub async fn get_client(config: &Config) -> Result<TelegramClient> {
    let session = open_session(config)?;
    TelegramClient::connect(session, config.api_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config_in(dir: &Path) -> Config {
        Config {
            session_name: dir.join("test").to_string_lossy().into_owned(),
            ..Config::default()
        }
    }

    #[test]
    fn release_removes_lock_file() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("s.lock");

        let mut lock = SessionLock::acquire(&path).expect("lock");
        assert!(path.exists());
        lock.release();
        assert!(!path.exists());
    }

    #[test]
    fn lock_dropped_releases_automatically() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("s.lock");

        {
            let _lock = SessionLock::acquire(&path).expect("lock");
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn double_release_is_safe() {
        let temp = tempdir().expect("tempdir");
        let mut lock = SessionLock::acquire(temp.path().join("s.lock")).expect("lock");
        lock.release();
        lock.release();
    }

    #[test]
    fn lock_can_be_reacquired_after_release() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("s.lock");

        let mut first = SessionLock::acquire(&path).expect("first");
        first.release();
        assert!(SessionLock::acquire(&path).is_ok());
    }

    #[test]
    fn acquire_fails_in_missing_directory() {
        let result = SessionLock::acquire("/nonexistent/dir/s.lock");
        assert!(matches!(result, Err(Error::LockError(_))));
    }

    #[test]
    fn session_exists_follows_file() {
        let temp = tempdir().expect("tempdir");
        let config = config_in(temp.path());

        assert!(!session_exists(&config));
        File::create(config.session_file()).expect("create session file");
        assert!(session_exists(&config));
    }

    #[test]
    fn open_session_creates_file() {
        let temp = tempdir().expect("tempdir");
        let config = config_in(temp.path());

        open_session(&config).expect("open session");
        assert!(session_exists(&config));
    }
}
