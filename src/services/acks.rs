use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rand_core::{OsRng, RngCore};
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::domains::envelope::Envelope;
use crate::error::{IpcError, Result};

pub const CORRELATION_ID_LEN: usize = 32;

const ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Mints a 32 character alphanumeric correlation id from the OS CSPRNG.
pub fn new_correlation_id() -> String {
    let mut id = String::with_capacity(CORRELATION_ID_LEN);
    let mut raw = [0u8; 48];
    while id.len() < CORRELATION_ID_LEN {
        OsRng.fill_bytes(&mut raw);
        // 248 is the largest multiple of 62 below 256; rejecting above it keeps the draw uniform.
        for byte in raw.iter().filter(|b| **b < 248) {
            id.push(ALPHABET[(*byte % 62) as usize] as char);
            if id.len() == CORRELATION_ID_LEN {
                break;
            }
        }
    }
    id
}

struct Pending {
    token: u64,
    remaining: usize,
    seen: HashSet<Option<u16>>,
    tx: mpsc::Sender<Envelope>,
}

struct Inner {
    entries: Mutex<HashMap<String, Pending>>,
    next_token: AtomicU64,
}

/// In-flight correlation ids awaiting their responses.
///
/// Every removal happens under one lock, so for a given id exactly one of
/// "final delivery" and "expiry" takes the entry out; the other sees it gone.
#[derive(Clone)]
pub struct AckRegistry {
    inner: Arc<Inner>,
}

impl Default for AckRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AckRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                next_token: AtomicU64::new(1),
            }),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Pending>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers `id` for up to `expected` distinct responses.
    pub fn register(&self, id: &str, expected: usize) -> Result<Waiter> {
        let (tx, rx) = mpsc::channel(expected.max(1));
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        if expected > 0 {
            let mut entries = self.entries();
            if entries.contains_key(id) {
                return Err(IpcError::RegistryCollision(id.to_string()));
            }
            entries.insert(
                id.to_string(),
                Pending {
                    token,
                    remaining: expected,
                    seen: HashSet::new(),
                    tx,
                },
            );
        }
        Ok(Waiter {
            id: id.to_string(),
            expected,
            token,
            rx,
            registry: self.clone(),
        })
    }

    /// Delivers `envelope` to the waiter registered under `id`.
    ///
    /// Returns false when no entry exists (already resolved, expired, or owned by
    /// another process) or when this responder already answered.
    pub fn resolve(&self, id: &str, envelope: Envelope) -> bool {
        let mut entries = self.entries();
        let Some(pending) = entries.get_mut(id) else {
            return false;
        };
        if !pending.seen.insert(envelope.responder()) {
            return false;
        }
        if pending.tx.try_send(envelope).is_err() {
            entries.remove(id);
            return false;
        }
        pending.remaining -= 1;
        if pending.remaining == 0 {
            entries.remove(id);
        }
        true
    }

    /// Removes `id` without delivering anything. Returns whether an entry was removed.
    pub fn expire(&self, id: &str) -> bool {
        self.entries().remove(id).is_some()
    }

    fn expire_owned(&self, id: &str, token: u64) -> bool {
        let mut entries = self.entries();
        match entries.get(id) {
            Some(pending) if pending.token == token => entries.remove(id).is_some(),
            _ => false,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

/// Responses gathered by [`Waiter::collect`].
#[derive(Debug, Clone)]
pub struct Collected {
    pub envelopes: Vec<Envelope>,
    pub expected: usize,
}

impl Collected {
    pub fn is_complete(&self) -> bool {
        self.envelopes.len() >= self.expected
    }
}

/// Receiving end of a registration. Dropping it expires the entry.
pub struct Waiter {
    id: String,
    expected: usize,
    token: u64,
    rx: mpsc::Receiver<Envelope>,
    registry: AckRegistry,
}

impl Waiter {
    pub fn correlation_id(&self) -> &str {
        &self.id
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Next delivered envelope, or `None` once the entry is gone and drained.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Expires the entry now and returns whatever was delivered before the removal.
    pub fn expire(&mut self) -> Vec<Envelope> {
        if self.registry.expire_owned(&self.id, self.token) {
            debug!(correlation_id = %self.id, "expired pending response");
        }
        let mut late = Vec::new();
        while let Ok(envelope) = self.rx.try_recv() {
            late.push(envelope);
        }
        late
    }

    /// Waits until `expected` responses arrived or `timeout` elapsed.
    /// A timeout too large to express as a deadline waits without one.
    pub async fn collect(mut self, timeout: Duration) -> Collected {
        let deadline = Instant::now().checked_add(timeout);
        let mut envelopes = Vec::with_capacity(self.expected);
        while envelopes.len() < self.expected {
            let next = match deadline {
                Some(deadline) => timeout_at(deadline, self.rx.recv()).await.ok().flatten(),
                None => self.rx.recv().await,
            };
            match next {
                Some(envelope) => envelopes.push(envelope),
                None => break,
            }
        }
        if envelopes.len() < self.expected {
            envelopes.extend(self.expire());
        }
        Collected {
            envelopes,
            expected: self.expected,
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        self.registry.expire_owned(&self.id, self.token);
    }
}
