//! SQLite-backed key-value store.
//!
//! rusqlite connections are blocking, so a single worker thread owns the
//! connection and async callers hand it closures over a channel.

use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::oneshot;

use super::{migrations::run_migrations, KeyValueStore};

type StoreTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum StoreCommand {
    Execute(StoreTask),
    Shutdown,
}

struct Worker {
    sender: mpsc::Sender<StoreCommand>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let mut guard = match self.handle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(StoreCommand::Shutdown) {
                error!("Failed to send shutdown to snapshot store thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join snapshot store thread: {join_err:?}");
            }
        }
    }
}

enum Location {
    File(PathBuf),
    Memory,
}

impl Location {
    fn open(&self) -> rusqlite::Result<Connection> {
        match self {
            Location::File(path) => Connection::open(path),
            Location::Memory => Connection::open_in_memory(),
        }
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    worker: Arc<Worker>,
    path: Option<Arc<PathBuf>>,
}

impl SqliteStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create snapshot store directory {}", parent.display())
            })?;
        }

        let worker = spawn_worker(Location::File(path.clone()))?;
        info!("Snapshot store opened at {}", path.display());

        Ok(Self {
            worker: Arc::new(worker),
            path: Some(Arc::new(path)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            worker: Arc::new(spawn_worker(Location::Memory)?),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref().map(PathBuf::as_path)
    }

    async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = StoreCommand::Execute(Box::new(move |conn| {
            if reply_tx.send(task(conn)).is_err() {
                error!("Snapshot store caller dropped before receiving result");
            }
        }));

        self.worker
            .sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to snapshot store thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("snapshot store thread terminated unexpectedly"))?
    }
}

fn spawn_worker(location: Location) -> Result<Worker> {
    let (command_tx, command_rx) = mpsc::channel::<StoreCommand>();
    let (ready_tx, ready_rx) = mpsc::channel();

    let handle = thread::Builder::new()
        .name("session-timer-store".into())
        .spawn(move || {
            let mut conn = match location.open() {
                Ok(conn) => conn,
                Err(err) => {
                    let _ = ready_tx.send(Err(
                        anyhow::Error::new(err).context("failed to open snapshot store")
                    ));
                    return;
                }
            };

            if let Location::File(_) = location {
                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }
            }

            let init = run_migrations(&mut conn).context("failed to migrate snapshot store");
            if ready_tx.send(init).is_err() {
                return;
            }

            while let Ok(command) = command_rx.recv() {
                match command {
                    StoreCommand::Execute(task) => task(&mut conn),
                    StoreCommand::Shutdown => break,
                }
            }

            info!("Snapshot store thread shutting down");
        })
        .context("failed to spawn snapshot store thread")?;

    ready_rx
        .recv()
        .context("snapshot store thread exited before signaling readiness")??;

    Ok(Worker {
        sender: command_tx,
        handle: Mutex::new(Some(handle)),
    })
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn save(&self, key: &str, value: String) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO timer_snapshots (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("failed to write snapshot {key}"))?;
            Ok(())
        })
        .await
    }

    async fn load(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.query_row(
                "SELECT value FROM timer_snapshots WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("failed to read snapshot {key}"))
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute("DELETE FROM timer_snapshots WHERE key = ?1", params![key])
                .with_context(|| format!("failed to delete snapshot {key}"))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upserts_and_deletes() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.load("session_timer_1").await.unwrap().is_none());

        store.save("session_timer_1", "a".into()).await.unwrap();
        store.save("session_timer_1", "b".into()).await.unwrap();
        assert_eq!(store.load("session_timer_1").await.unwrap().as_deref(), Some("b"));

        store.delete("session_timer_1").await.unwrap();
        store.delete("session_timer_1").await.unwrap();
        assert!(store.load("session_timer_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("timers.sqlite3");

        {
            let store = SqliteStore::open(path.clone()).unwrap();
            assert_eq!(store.path(), Some(path.as_path()));
            store.save("session_timer_9", "{}".into()).await.unwrap();
        }

        let reopened = SqliteStore::open(path).unwrap();
        assert_eq!(reopened.load("session_timer_9").await.unwrap().as_deref(), Some("{}"));
    }
}
