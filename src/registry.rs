//! Active request registry: maps opaque request ids to cancellation signals
//! so the request-handling layer can wire client disconnects to `cancel`.
//!
//! Entries are evicted on a fixed timer after registration, independent of
//! whether the dispatch has finished. This bounds registry size without a
//! completion callback, at a known cost: a request that outlives its entry
//! (e.g. a long stream) can no longer be cancelled through the registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::RngCore;
use tokio_util::sync::CancellationToken;

/// How long an entry survives after registration.
pub const EVICTION_DELAY: Duration = Duration::from_secs(300);

struct RegistryEntry {
    signal: CancellationToken,
    created_at: Instant,
}

/// Owned, injectable table of in-flight requests. Clones share the same
/// underlying table.
#[derive(Clone)]
pub struct RequestRegistry {
    entries: Arc<Mutex<HashMap<String, RegistryEntry>>>,
    eviction_delay: Duration,
}

impl Default for RequestRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::with_eviction_delay(EVICTION_DELAY)
    }

    /// Custom eviction delay, for tests.
    pub fn with_eviction_delay(eviction_delay: Duration) -> Self {
        RequestRegistry {
            entries: Arc::new(Mutex::new(HashMap::new())),
            eviction_delay,
        }
    }

    /// Register a new in-flight request. Spawns the eviction timer at
    /// registration time; it fires unconditionally after the delay.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register(&self) -> (String, CancellationToken) {
        let id = request_id();
        let signal = CancellationToken::new();

        {
            let mut entries = self.entries.lock().expect("registry lock poisoned");
            entries.insert(
                id.clone(),
                RegistryEntry {
                    signal: signal.clone(),
                    created_at: Instant::now(),
                },
            );
        }

        let entries = Arc::clone(&self.entries);
        let delay = self.eviction_delay;
        let evict_id = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let removed = entries
                .lock()
                .expect("registry lock poisoned")
                .remove(&evict_id);
            if let Some(entry) = removed {
                tracing::debug!(
                    id = %evict_id,
                    age_secs = entry.created_at.elapsed().as_secs(),
                    "evicted request registry entry"
                );
            }
        });

        (id, signal)
    }

    /// Set the cancellation signal for a request. Idempotent; cancelling an
    /// unknown or already-evicted id is a no-op. Returns whether an entry was
    /// found.
    pub fn cancel(&self, id: &str) -> bool {
        let entries = self.entries.lock().expect("registry lock poisoned");
        match entries.get(id) {
            Some(entry) => {
                entry.signal.cancel();
                true
            }
            None => false,
        }
    }

    /// The cancellation signal for a live entry, if any.
    pub fn signal(&self, id: &str) -> Option<CancellationToken> {
        let entries = self.entries.lock().expect("registry lock poisoned");
        entries.get(id).map(|entry| entry.signal.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Opaque request identifier: 16 random bytes, hex-rendered.
fn request_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
