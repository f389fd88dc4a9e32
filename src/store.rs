//! Temporary artifact store: checked documents waiting for their conversion.
//!
//! Every precheck registers one entry under a fresh [`ArtifactToken`]. An
//! entry moves through a small state machine:
//!
//! ```text
//!            checkout            commit
//! Pending ─────────────▶ Converting ─────────▶ Consumed
//!    │                       │
//!    │ abort                 │ lease dropped
//!    ▼                       ▼
//! Aborted ◀──────────────────┘
//!
//! Pending ── ttl elapsed ──▶ Expired
//! ```
//!
//! `Converting` is internal: a lookup sees only `Pending` entries, so two
//! requests racing on one token get exactly one [`EntryLease`] and one
//! [`Pdf2ZipError::TokenNotFound`]. Every transition happens under one lock.
//!
//! The spooled [`Document`] is owned by exactly one place at a time (the
//! entry, then the lease) and its file is deleted when it is dropped, so a
//! document is released once on every path out of `Pending`. Terminal
//! entries linger as tombstones for one TTL so [`ArtifactStore::state`] can
//! still report what happened, then the sweep purges them.

use crate::config::ImageEncoding;
use crate::error::Pdf2ZipError;
use crate::gate::{AccessDecision, DocumentMetrics};
use crate::pipeline::render::DocumentInfo;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tempfile::TempPath;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Opaque handle to a stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactToken(Uuid);

impl ArtifactToken {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ArtifactToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ArtifactToken {
    type Err = Pdf2ZipError;

    /// Anything that is not a UUID cannot name an entry.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| Pdf2ZipError::TokenNotFound)
    }
}

/// Lifecycle state of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Pending,
    Converting,
    Consumed,
    Expired,
    Aborted,
}

impl EntryState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EntryState::Consumed | EntryState::Expired | EntryState::Aborted
        )
    }
}

/// An accepted upload, spooled to a temporary file.
///
/// Dropping it deletes the file.
pub struct Document {
    path: TempPath,
    size_bytes: u64,
    info: DocumentInfo,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("path", &self.path.to_path_buf())
            .field("size_bytes", &self.size_bytes)
            .field("page_count", &self.info.page_count)
            .field("password_protected", &self.info.password_protected)
            .finish()
    }
}

impl Document {
    pub fn new(path: TempPath, size_bytes: u64, info: DocumentInfo) -> Self {
        Self {
            path,
            size_bytes,
            info,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn page_count(&self) -> usize {
        self.info.page_count
    }

    pub fn password_protected(&self) -> bool {
        self.info.password_protected
    }
}

/// What the check step learned and the convert step reuses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInputs {
    pub metrics: DocumentMetrics,
    pub decision: AccessDecision,
    /// Password that opened the document at check time.
    pub password: Option<String>,
    pub range: String,
    pub encoding: ImageEncoding,
    pub dpi: u32,
    /// Gateway order the payment must be made against.
    pub order_id: Option<String>,
}

/// Read-only view of a `Pending` entry.
#[derive(Debug, Clone)]
pub struct EntrySnapshot {
    pub token: ArtifactToken,
    pub inputs: EntryInputs,
    pub password_protected: bool,
    /// Spooled document, valid while the entry stays `Pending`.
    pub path: PathBuf,
    /// Time left before the entry expires.
    pub expires_in: Duration,
}

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// `Pending` entries that passed their TTL.
    pub expired: usize,
    /// Terminal tombstones removed from the map.
    pub purged: usize,
}

struct Slot {
    state: EntryState,
    document: Option<Document>,
    inputs: EntryInputs,
    expires_at: Instant,
    /// When the entry reached a terminal state.
    settled_at: Option<Instant>,
}

impl Slot {
    /// Move a `Pending` entry to `Expired` once its TTL has passed.
    fn expire_if_due(&mut self, now: Instant) -> Option<Document> {
        if self.state == EntryState::Pending && now > self.expires_at {
            self.state = EntryState::Expired;
            self.settled_at = Some(now);
            self.document.take()
        } else {
            None
        }
    }

    fn settle(&mut self, state: EntryState, now: Instant) -> Option<Document> {
        self.state = state;
        self.settled_at = Some(now);
        self.document.take()
    }
}

/// Token → entry map with TTL expiry.
pub struct ArtifactStore {
    entries: Mutex<HashMap<ArtifactToken, Slot>>,
    ttl: Duration,
}

impl fmt::Debug for ArtifactStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactStore")
            .field("entries", &self.entries.lock().len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl ArtifactStore {
    pub fn new(ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Register a checked document. The entry starts `Pending`.
    pub fn insert(&self, document: Document, inputs: EntryInputs) -> ArtifactToken {
        let token = ArtifactToken::generate();
        let expires_at = Instant::now() + self.ttl;
        debug!(
            %token,
            pages = document.page_count(),
            bytes = document.size_bytes(),
            chargeable = inputs.decision.chargeable,
            "Entry registered"
        );
        self.entries.lock().insert(
            token,
            Slot {
                state: EntryState::Pending,
                document: Some(document),
                inputs,
                expires_at,
                settled_at: None,
            },
        );
        token
    }

    /// Read the metadata of a `Pending` entry.
    pub fn snapshot(&self, token: &ArtifactToken) -> Result<EntrySnapshot, Pdf2ZipError> {
        let now = Instant::now();
        let (result, released) = {
            let mut entries = self.entries.lock();
            match entries.get_mut(token) {
                None => (Err(Pdf2ZipError::TokenNotFound), None),
                Some(slot) => {
                    let released = slot.expire_if_due(now);
                    let result = match (&slot.state, &slot.document) {
                        (EntryState::Pending, Some(doc)) => Ok(EntrySnapshot {
                            token: *token,
                            inputs: slot.inputs.clone(),
                            password_protected: doc.password_protected(),
                            path: doc.path().to_path_buf(),
                            expires_in: slot.expires_at.saturating_duration_since(now),
                        }),
                        _ => Err(Pdf2ZipError::TokenNotFound),
                    };
                    (result, released)
                }
            }
        };
        log_expired(token, released);
        result
    }

    /// Attach the gateway order a payment must be made against.
    pub fn bind_order(
        &self,
        token: &ArtifactToken,
        order_id: impl Into<String>,
    ) -> Result<(), Pdf2ZipError> {
        let order_id = order_id.into();
        let now = Instant::now();
        let (result, released) = {
            let mut entries = self.entries.lock();
            match entries.get_mut(token) {
                None => (Err(Pdf2ZipError::TokenNotFound), None),
                Some(slot) => {
                    let released = slot.expire_if_due(now);
                    let result = if slot.state == EntryState::Pending {
                        slot.inputs.order_id = Some(order_id);
                        Ok(())
                    } else {
                        Err(Pdf2ZipError::TokenNotFound)
                    };
                    (result, released)
                }
            }
        };
        log_expired(token, released);
        result
    }

    /// Claim a `Pending` entry for conversion, taking its document.
    ///
    /// At most one caller ever receives a lease for a given token.
    pub fn checkout(self: &Arc<Self>, token: &ArtifactToken) -> Result<EntryLease, Pdf2ZipError> {
        let now = Instant::now();
        let (result, released) = {
            let mut entries = self.entries.lock();
            match entries.get_mut(token) {
                None => (Err(Pdf2ZipError::TokenNotFound), None),
                Some(slot) => {
                    let released = slot.expire_if_due(now);
                    let result = match (slot.state, slot.document.take()) {
                        (EntryState::Pending, Some(document)) => {
                            slot.state = EntryState::Converting;
                            Ok(EntryLease {
                                store: Arc::clone(self),
                                token: *token,
                                document: Some(document),
                                inputs: slot.inputs.clone(),
                                committed: false,
                            })
                        }
                        (_, document) => {
                            slot.document = document;
                            Err(Pdf2ZipError::TokenNotFound)
                        }
                    };
                    (result, released)
                }
            }
        };
        log_expired(token, released);
        if result.is_ok() {
            debug!(%token, "Entry checked out");
        }
        result
    }

    /// Abort a `Pending` entry, releasing its document.
    ///
    /// Returns `false` when there was nothing to abort; calling it again is
    /// harmless.
    pub fn abort(&self, token: &ArtifactToken) -> bool {
        let now = Instant::now();
        let (aborted, released) = {
            let mut entries = self.entries.lock();
            let Some(slot) = entries.get_mut(token) else {
                return false;
            };
            let expired = slot.expire_if_due(now);
            if slot.state == EntryState::Pending {
                (true, slot.settle(EntryState::Aborted, now))
            } else {
                (false, expired)
            }
        };
        if aborted {
            drop(released);
            info!(%token, "Entry aborted");
        } else {
            log_expired(token, released);
        }
        aborted
    }

    /// Current state of `token`, if the store still remembers it.
    pub fn state(&self, token: &ArtifactToken) -> Option<EntryState> {
        let now = Instant::now();
        let (state, released) = {
            let mut entries = self.entries.lock();
            let slot = entries.get_mut(token)?;
            let released = slot.expire_if_due(now);
            (slot.state, released)
        };
        log_expired(token, released);
        Some(state)
    }

    /// Number of entries still `Pending` or `Converting`.
    pub fn live_count(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|s| !s.state.is_terminal())
            .count()
    }

    /// Expire overdue `Pending` entries and purge old tombstones.
    pub fn sweep_expired(&self) -> SweepReport {
        let now = Instant::now();
        let ttl = self.ttl;
        let mut released = Vec::new();
        let mut report = SweepReport::default();
        {
            let mut entries = self.entries.lock();
            for slot in entries.values_mut() {
                if let Some(doc) = slot.expire_if_due(now) {
                    released.push(doc);
                    report.expired += 1;
                }
            }
            let before = entries.len();
            entries.retain(|_, slot| match slot.settled_at {
                Some(at) if slot.state.is_terminal() => now.saturating_duration_since(at) <= ttl,
                _ => true,
            });
            report.purged = before - entries.len();
        }
        drop(released);

        if report.expired > 0 || report.purged > 0 {
            info!(
                expired = report.expired,
                purged = report.purged,
                "Swept artifact store"
            );
        }
        report
    }

    /// Run [`ArtifactStore::sweep_expired`] every `interval` until the store
    /// is dropped.
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match store.upgrade() {
                    Some(store) => {
                        store.sweep_expired();
                    }
                    None => {
                        debug!("Artifact store dropped; reaper exiting");
                        break;
                    }
                }
            }
        })
    }

    /// Terminal transition for a lease. The document has already left the
    /// slot.
    fn settle_lease(&self, token: &ArtifactToken, state: EntryState) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if let Some(slot) = entries.get_mut(token) {
            if slot.state == EntryState::Converting {
                let _ = slot.settle(state, now);
            }
        }
    }
}

fn log_expired(token: &ArtifactToken, released: Option<Document>) {
    if let Some(doc) = released {
        warn!(%token, pages = doc.page_count(), "Entry expired before conversion");
        drop(doc);
    }
}

/// Exclusive claim on one entry for one conversion attempt.
///
/// [`EntryLease::commit`] marks the entry `Consumed`. Dropping the lease
/// without committing marks it `Aborted`. The document is deleted either
/// way.
pub struct EntryLease {
    store: Arc<ArtifactStore>,
    token: ArtifactToken,
    document: Option<Document>,
    inputs: EntryInputs,
    committed: bool,
}

impl fmt::Debug for EntryLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryLease")
            .field("token", &self.token)
            .field("document", &self.document)
            .field("committed", &self.committed)
            .finish()
    }
}

impl EntryLease {
    pub fn token(&self) -> ArtifactToken {
        self.token
    }

    pub fn inputs(&self) -> &EntryInputs {
        &self.inputs
    }

    pub fn document(&self) -> Result<&Document, Pdf2ZipError> {
        self.document
            .as_ref()
            .ok_or_else(|| Pdf2ZipError::Internal("lease has no document".into()))
    }

    /// Finish the conversion successfully.
    pub fn commit(mut self) {
        self.committed = true;
        drop(self.document.take());
        self.store.settle_lease(&self.token, EntryState::Consumed);
        info!(token = %self.token, "Entry consumed");
    }
}

impl Drop for EntryLease {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        drop(self.document.take());
        self.store.settle_lease(&self.token, EntryState::Aborted);
        warn!(token = %self.token, "Conversion abandoned; entry aborted");
    }
}
