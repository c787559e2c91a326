//! OfflineQueue - durable FIFO of undelivered events
//!
//! One JSON file per record, named by the event sequence number so that a
//! directory listing restores the order after a restart. Writes go to a
//! `.tmp` file first and are renamed into place.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use contracts::{ContractError, Event, OfflineRecord};
use tracing::{debug, error, info, instrument, warn};

use crate::error::DispatcherError;
use crate::metrics::DeliveryMetrics;

pub use contracts::DATA_LOSS_TARGET;

const RECORD_EXT: &str = "json";
const TMP_EXT: &str = "tmp";
const QUARANTINE_DIR: &str = "quarantine";

#[derive(Debug, Clone)]
struct QueueEntry {
    id: String,
    path: PathBuf,
}

#[derive(Debug)]
struct QueueInner {
    dir: PathBuf,
    quarantine_dir: PathBuf,
    device: String,
    max_records: usize,
    entries: BTreeMap<u64, QueueEntry>,
}

/// Result of an enqueue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Stored without loss
    Stored,
    /// Stored after evicting the oldest record (id of the dropped event)
    StoredWithEviction { evicted: String },
    /// The incoming event was itself the oldest and was dropped
    Dropped,
}

/// Read-only view of a queue directory, see [`OfflineQueue::inspect`]
#[derive(Debug, Clone, Default)]
pub struct QueueSnapshot {
    /// Records this device would deliver
    pub depth: usize,
    /// Sequence number an agent opening the directory would continue from
    pub next_sequence: u64,
    /// Oldest deliverable record
    pub oldest: Option<OfflineRecord>,
    /// Records the next open would quarantine (undecodable or another device's)
    pub unreadable: usize,
    /// `.tmp` files: a write in progress, or one interrupted by a crash
    pub in_flight: usize,
    /// Files already moved to quarantine
    pub quarantined: usize,
}

/// Durable FIFO of undelivered events
///
/// Cheap to clone; clones share the same directory index. Safe to use from
/// the sampling loop (spill) and the sync worker at the same time.
#[derive(Debug, Clone)]
pub struct OfflineQueue {
    inner: Arc<Mutex<QueueInner>>,
    metrics: Arc<DeliveryMetrics>,
}

impl OfflineQueue {
    /// Open (or create) the queue directory and index its records
    ///
    /// Leftover `.tmp` files from interrupted writes are deleted. Records that
    /// cannot be decoded, or that belong to another device, are quarantined.
    #[instrument(
        name = "offline_queue_open",
        skip_all,
        fields(path = %dir.as_ref().display(), max_records = max_records)
    )]
    pub fn open(
        dir: impl AsRef<Path>,
        max_records: usize,
        device: impl Into<String>,
        metrics: Arc<DeliveryMetrics>,
    ) -> Result<Self, DispatcherError> {
        let dir = dir.as_ref().to_path_buf();
        let quarantine_dir = dir.join(QUARANTINE_DIR);
        fs::create_dir_all(&quarantine_dir)
            .map_err(|e| DispatcherError::queue_open(&dir, e.to_string()))?;

        let mut inner = QueueInner {
            dir: dir.clone(),
            quarantine_dir,
            device: device.into(),
            max_records: max_records.max(1),
            entries: BTreeMap::new(),
        };

        let listing =
            fs::read_dir(&dir).map_err(|e| DispatcherError::queue_open(&dir, e.to_string()))?;
        let mut stale_tmp = 0usize;
        for entry in listing {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            match path.extension().and_then(|e| e.to_str()) {
                Some(TMP_EXT) => {
                    fs::remove_file(&path)?;
                    stale_tmp += 1;
                }
                Some(RECORD_EXT) => inner.index_existing(&path, &metrics),
                _ => debug!(path = %path.display(), "ignoring foreign file in queue directory"),
            }
        }

        let depth = inner.entries.len();
        metrics.set_queue_depth(depth);
        metrics::gauge!("altimon_offline_queue_depth").set(depth as f64);
        info!(
            path = %dir.display(),
            records = depth,
            stale_tmp,
            max_records = inner.max_records,
            "offline queue opened"
        );

        let queue = Self {
            inner: Arc::new(Mutex::new(inner)),
            metrics,
        };
        queue.enforce_bound()?;
        Ok(queue)
    }

    /// Look at a queue directory without touching it
    ///
    /// Nothing is created, deleted, renamed or evicted, so this is safe to run
    /// against the directory of a live agent. `None` when the directory does
    /// not exist.
    pub fn inspect(
        dir: impl AsRef<Path>,
        device: &str,
    ) -> Result<Option<QueueSnapshot>, DispatcherError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Ok(None);
        }

        let listing =
            fs::read_dir(dir).map_err(|e| DispatcherError::queue_open(dir, e.to_string()))?;
        let mut snapshot = QueueSnapshot::default();
        let mut newest = 0u64;
        for entry in listing {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            match path.extension().and_then(|e| e.to_str()) {
                Some(TMP_EXT) => snapshot.in_flight += 1,
                Some(RECORD_EXT) => match read_record(&path) {
                    Ok(record) if record.event.device == device => {
                        let sequence = record.event.sequence;
                        snapshot.depth += 1;
                        newest = newest.max(sequence);
                        let older = match &snapshot.oldest {
                            Some(oldest) => sequence < oldest.event.sequence,
                            None => true,
                        };
                        if older {
                            snapshot.oldest = Some(record);
                        }
                    }
                    // delivered and removed between listing and read
                    Err(ContractError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
                    _ => snapshot.unreadable += 1,
                },
                _ => {}
            }
        }

        let quarantine_dir = dir.join(QUARANTINE_DIR);
        if quarantine_dir.is_dir() {
            snapshot.quarantined = fs::read_dir(&quarantine_dir)?.count();
        }
        snapshot.next_sequence = newest + 1;
        Ok(Some(snapshot))
    }

    /// Persist an event
    ///
    /// When the queue is full the oldest record is evicted and the eviction
    /// is logged on the data-loss target.
    ///
    /// # Errors
    /// Storage failure; the event is not stored
    pub fn enqueue(&self, event: Event) -> Result<EnqueueOutcome, ContractError> {
        let mut inner = self.lock();
        let sequence = event.sequence;

        if inner.entries.contains_key(&sequence) {
            // same event re-offered (e.g. live copy after a restart); keep the stored one
            debug!(event_id = %event.id, sequence, "event already queued");
            return Ok(EnqueueOutcome::Stored);
        }

        let mut outcome = EnqueueOutcome::Stored;
        if inner.entries.len() >= inner.max_records {
            let oldest = inner.entries.keys().next().copied();
            match oldest {
                Some(oldest) if sequence < oldest => {
                    error!(
                        target: DATA_LOSS_TARGET,
                        event_id = %event.id,
                        sequence,
                        max_records = inner.max_records,
                        "offline queue full, incoming event is older than every queued record and was dropped"
                    );
                    self.record_loss();
                    return Ok(EnqueueOutcome::Dropped);
                }
                Some(oldest) => {
                    if let Some(evicted) = inner.evict(oldest)? {
                        error!(
                            target: DATA_LOSS_TARGET,
                            event_id = %evicted,
                            sequence = oldest,
                            max_records = inner.max_records,
                            "offline queue full, oldest event dropped"
                        );
                        self.record_loss();
                        outcome = EnqueueOutcome::StoredWithEviction { evicted };
                    }
                }
                None => {}
            }
        }

        let id = event.id.clone();
        let record = OfflineRecord::new(event);
        let path = inner.record_path(sequence);
        write_atomic(&path, &record)?;
        inner.entries.insert(sequence, QueueEntry { id: id.clone(), path });

        self.publish_depth(inner.entries.len());
        debug!(event_id = %id, sequence, depth = inner.entries.len(), "event queued offline");
        Ok(outcome)
    }

    /// Oldest deliverable record
    ///
    /// Unreadable or foreign-device records found on the way are quarantined.
    pub fn peek_oldest(&self) -> Result<Option<OfflineRecord>, ContractError> {
        let mut inner = self.lock();
        loop {
            let Some((&sequence, entry)) = inner.entries.iter().next() else {
                return Ok(None);
            };
            let entry = entry.clone();

            match read_record(&entry.path) {
                Ok(record) if record.event.device == inner.device => return Ok(Some(record)),
                Ok(record) => {
                    let reason = format!("belongs to device '{}'", record.event.device);
                    inner.quarantine(sequence, &reason)?;
                }
                Err(ContractError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(path = %entry.path.display(), "queued record vanished from disk");
                    inner.entries.remove(&sequence);
                }
                Err(e) => inner.quarantine(sequence, &e.to_string())?,
            }

            self.record_loss();
            self.publish_depth(inner.entries.len());
        }
    }

    /// Delete a delivered record
    ///
    /// Returns `false` if no record with this id is queued.
    pub fn remove(&self, id: &str) -> Result<bool, ContractError> {
        let mut inner = self.lock();
        let Some(sequence) = inner.sequence_of(id) else {
            return Ok(false);
        };
        if let Some(entry) = inner.entries.remove(&sequence) {
            match fs::remove_file(&entry.path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    inner.entries.insert(sequence, entry);
                    return Err(ContractError::storage(&inner.dir, e.to_string()));
                }
            }
        }
        self.publish_depth(inner.entries.len());
        Ok(true)
    }

    /// Count one more failed attempt on a queued record
    pub fn record_failure(&self, id: &str, error: &str) -> Result<(), ContractError> {
        let inner = self.lock();
        let Some(sequence) = inner.sequence_of(id) else {
            return Ok(());
        };
        let path = inner.entries[&sequence].path.clone();
        let mut record = read_record(&path)?;
        record.record_failure(error);
        write_atomic(&path, &record)
    }

    /// Number of queued records
    pub fn count(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Sequence number to continue from after a restart
    pub fn next_sequence(&self) -> u64 {
        self.lock()
            .entries
            .keys()
            .next_back()
            .map(|s| s + 1)
            .unwrap_or(1)
    }

    /// Queue directory
    pub fn path(&self) -> PathBuf {
        self.lock().dir.clone()
    }

    /// Ids in delivery order
    pub fn ids(&self) -> Vec<String> {
        self.lock().entries.values().map(|e| e.id.clone()).collect()
    }

    fn enforce_bound(&self) -> Result<(), ContractError> {
        let mut inner = self.lock();
        while inner.entries.len() > inner.max_records {
            let Some(oldest) = inner.entries.keys().next().copied() else {
                break;
            };
            if let Some(evicted) = inner.evict(oldest)? {
                error!(
                    target: DATA_LOSS_TARGET,
                    event_id = %evicted,
                    sequence = oldest,
                    max_records = inner.max_records,
                    "offline queue over its bound at startup, oldest event dropped"
                );
                self.record_loss();
            }
        }
        self.publish_depth(inner.entries.len());
        Ok(())
    }

    fn record_loss(&self) {
        self.metrics.inc_data_lost();
        metrics::counter!("altimon_data_loss_total").increment(1);
    }

    fn publish_depth(&self, depth: usize) {
        self.metrics.set_queue_depth(depth);
        metrics::gauge!("altimon_offline_queue_depth").set(depth as f64);
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        // the index is rebuilt from disk on restart, a poisoned guard is still usable
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl QueueInner {
    fn record_path(&self, sequence: u64) -> PathBuf {
        self.dir.join(format!("{sequence:020}.{RECORD_EXT}"))
    }

    fn sequence_of(&self, id: &str) -> Option<u64> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.id == id)
            .map(|(seq, _)| *seq)
    }

    fn index_existing(&mut self, path: &Path, metrics: &DeliveryMetrics) {
        let outcome = read_record(path).and_then(|record| {
            if record.event.device != self.device {
                return Err(ContractError::corrupt_record(
                    path,
                    format!("belongs to device '{}'", record.event.device),
                ));
            }
            Ok(record)
        });

        match outcome {
            Ok(record) => {
                let sequence = record.event.sequence;
                let expected = self.record_path(sequence);
                if expected != path {
                    warn!(
                        path = %path.display(),
                        sequence,
                        "record file name does not match its sequence"
                    );
                }
                self.entries.insert(
                    sequence,
                    QueueEntry {
                        id: record.event.id,
                        path: path.to_path_buf(),
                    },
                );
            }
            Err(e) => {
                metrics.inc_data_lost();
                metrics::counter!("altimon_data_loss_total").increment(1);
                self.move_to_quarantine(path, &e.to_string());
            }
        }
    }

    fn quarantine(&mut self, sequence: u64, reason: &str) -> Result<(), ContractError> {
        if let Some(entry) = self.entries.remove(&sequence) {
            self.move_to_quarantine(&entry.path, reason);
        }
        Ok(())
    }

    fn move_to_quarantine(&self, path: &Path, reason: &str) {
        let Some(target) = self.quarantine_target(path) else {
            return;
        };
        metrics::counter!("altimon_quarantined_records_total").increment(1);
        match fs::rename(path, &target) {
            Ok(()) => error!(
                target: DATA_LOSS_TARGET,
                path = %path.display(),
                quarantined_to = %target.display(),
                reason,
                "offline record quarantined"
            ),
            Err(e) => {
                error!(
                    target: DATA_LOSS_TARGET,
                    path = %path.display(),
                    reason,
                    error = %e,
                    "offline record could not be quarantined, deleting"
                );
                let _ = fs::remove_file(path);
            }
        }
    }

    /// Sequences restart at 1 once the queue drains, so the name alone could
    /// overwrite an earlier quarantined record
    fn quarantine_target(&self, path: &Path) -> Option<PathBuf> {
        let stem = path.file_stem()?.to_string_lossy();
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%6f");
        let mut target = self
            .quarantine_dir
            .join(format!("{stem}-{stamp}.{RECORD_EXT}"));
        let mut n = 1u32;
        while target.exists() {
            target = self
                .quarantine_dir
                .join(format!("{stem}-{stamp}-{n}.{RECORD_EXT}"));
            n += 1;
        }
        Some(target)
    }

    fn evict(&mut self, sequence: u64) -> Result<Option<String>, ContractError> {
        let Some(entry) = self.entries.remove(&sequence) else {
            return Ok(None);
        };
        match fs::remove_file(&entry.path) {
            Ok(()) => Ok(Some(entry.id)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Some(entry.id)),
            Err(e) => {
                let path = entry.path.clone();
                self.entries.insert(sequence, entry);
                Err(ContractError::storage(path, e.to_string()))
            }
        }
    }
}

fn read_record(path: &Path) -> Result<OfflineRecord, ContractError> {
    let bytes = fs::read(path)?;
    if bytes.is_empty() {
        return Err(ContractError::corrupt_record(path, "empty file"));
    }
    serde_json::from_slice(&bytes).map_err(|e| ContractError::corrupt_record(path, e.to_string()))
}

fn write_atomic(path: &Path, record: &OfflineRecord) -> Result<(), ContractError> {
    let tmp = path.with_extension(TMP_EXT);
    let data = serde_json::to_vec_pretty(record)
        .map_err(|e| ContractError::storage(path, format!("serialize: {e}")))?;

    let result = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&data)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    result.map_err(|e| {
        let _ = fs::remove_file(&tmp);
        ContractError::storage(path, e.to_string())
    })
}
