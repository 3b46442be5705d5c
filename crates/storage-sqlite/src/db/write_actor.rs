//! Single-writer actor.
//!
//! SQLite allows one writer at a time. Every mutation is funnelled through a
//! dedicated task that owns one pooled connection and runs each job inside
//! `BEGIN IMMEDIATE`, so read-check-write sequences inside a job are atomic
//! with respect to every other writer in the process.

use std::any::Any;

use diesel::SqliteConnection;
use log::{debug, error};
use tokio::sync::{mpsc, oneshot};

use holdwatch_core::errors::{DatabaseError, Error, Result};

use super::DbPool;
use crate::errors::StorageError;

type AnyBox = Box<dyn Any + Send + 'static>;
type Job = Box<dyn FnOnce(&mut SqliteConnection) -> Result<AnyBox> + Send + 'static>;
type Envelope = (Job, oneshot::Sender<Result<AnyBox>>);

const QUEUE_DEPTH: usize = 1024;

/// Cloneable handle for submitting write jobs.
#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::Sender<Envelope>,
}

impl WriteHandle {
    /// Runs `job` on the writer connection inside an immediate transaction.
    ///
    /// An `Err` from the job rolls the transaction back.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let erased: Job = Box::new(move |conn| job(conn).map(|value| Box::new(value) as AnyBox));

        self.tx
            .send((erased, reply_tx))
            .await
            .map_err(|_| writer_gone("the writer task has stopped"))?;

        let boxed = reply_rx
            .await
            .map_err(|_| writer_gone("the writer task dropped the reply"))??;

        boxed
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| {
                Error::Database(DatabaseError::Internal(
                    "Writer returned an unexpected type".to_string(),
                ))
            })
    }
}

fn writer_gone(detail: &str) -> Error {
    Error::Database(DatabaseError::TransactionFailed(format!(
        "Write rejected: {}",
        detail
    )))
}

/// Spawns the writer task on the current Tokio runtime.
///
/// The task checks a connection out of `pool` per job and exits when every
/// [`WriteHandle`] has been dropped.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, mut rx) = mpsc::channel::<Envelope>(QUEUE_DEPTH);

    tokio::spawn(async move {
        let mut conn = None;

        while let Some((job, reply_tx)) = rx.recv().await {
            if conn.is_none() {
                match pool.get() {
                    Ok(c) => conn = Some(c),
                    Err(e) => {
                        error!("Writer could not acquire a connection: {}", e);
                        let _ = reply_tx.send(Err(StorageError::from(e).into()));
                        continue;
                    }
                }
            }
            let Some(c) = conn.as_mut() else { continue };

            let result: Result<AnyBox> = c
                .immediate_transaction::<_, StorageError, _>(|tx| job(tx).map_err(StorageError::from))
                .map_err(Error::from);

            // The caller may have gone away; the transaction outcome stands.
            let _ = reply_tx.send(result);
        }

        debug!("Writer task stopped: all handles dropped");
    });

    WriteHandle { tx }
}
