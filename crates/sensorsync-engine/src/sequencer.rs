//! Per-key ordered execution

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Unit of work queued behind a key
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Runs jobs for the same key one at a time, in submission order
///
/// Each key with pending work has one queue drained by one spawned task.
/// Jobs for different keys run concurrently. A drained queue removes itself,
/// so idle keys hold no resources.
pub struct KeyedSequencer<K> {
    queues: Arc<Mutex<HashMap<K, mpsc::UnboundedSender<Job>>>>,
}

impl<K> Default for KeyedSequencer<K> {
    fn default() -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K> std::fmt::Debug for KeyedSequencer<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedSequencer")
            .field("active", &self.queues.lock().len())
            .finish()
    }
}

impl<K> KeyedSequencer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `job` behind every job already submitted for `key`
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, key: K, job: Job) {
        let mut queues = self.queues.lock();
        let job = match queues.get(&key) {
            // The drain task removes its entry before dropping the receiver,
            // so a present sender always has a live receiver
            Some(tx) => match tx.send(job) {
                Ok(()) => return,
                Err(mpsc::error::SendError(job)) => job,
            },
            None => job,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        // Cannot fail: rx is alive
        let _ = tx.send(job);
        queues.insert(key.clone(), tx);
        drop(queues);

        tokio::spawn(drain(self.queues.clone(), key, rx));
    }

    /// Number of keys with queued or running jobs
    pub fn active(&self) -> usize {
        self.queues.lock().len()
    }
}

async fn drain<K: Eq + Hash>(
    queues: Arc<Mutex<HashMap<K, mpsc::UnboundedSender<Job>>>>,
    key: K,
    mut rx: mpsc::UnboundedReceiver<Job>,
) {
    loop {
        let job = match rx.try_recv() {
            Ok(job) => job,
            Err(_) => {
                // Re-check under the map lock so no submit slips in between
                let mut queues = queues.lock();
                match rx.try_recv() {
                    Ok(job) => job,
                    Err(_) => {
                        queues.remove(&key);
                        return;
                    }
                }
            }
        };
        job.await;
    }
}
