//! # Player Journal
//!
//! Append-only log behind [`DurableStore`].
//!
//! Before any player record changes in memory, the change is written to the
//! WAL and synced. If the process dies mid-transaction, reopening recovers:
//! - Committed transactions: replayed in commit order
//! - Uncommitted or rolled-back transactions: discarded
//! - A torn or corrupt tail: truncated at the last intact record
//!
//! ## Format
//!
//! ```text
//! header  := "AWAL" | format u32 | first_lsn u64
//! record  := lsn u64 | kind u8 | len u32 | payload[len] | crc32 u32
//! kind    := 1 begin | 2 op | 3 commit | 4 rollback
//!
//! All integers little-endian; the CRC covers lsn through payload.
//! ```
//!
//! OP, COMMIT and ROLLBACK payloads start with the 8-byte transaction ID
//! (the LSN of its BEGIN), so recovery never has to guess which open
//! transaction a record belongs to.
//!
//! ## Poisoning
//!
//! After a failed write or sync the file may hold a record that memory
//! never saw, such as a COMMIT whose sync failed. The log then refuses
//! every write until [`WriteAheadLog::compact`] rewrites it from memory.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::combat::ActorStats;
use crate::error::{StoreError, StoreResult};
use crate::inventory::{Inventory, InventoryDelta};
use crate::store::{with_skill, with_stats, MemoryStore, PlayerId, PlayerSnapshot, StateStore};

/// File signature.
const WAL_MAGIC: &[u8; 4] = b"AWAL";

/// On-disk format revision.
const WAL_VERSION: u32 = 2;

/// Header size: magic + version + LSN.
const HEADER_LEN: u64 = 16;

/// Fixed bytes around a payload: LSN + type + length + CRC.
const RECORD_OVERHEAD: u64 = 8 + 1 + 4 + 4;

/// Larger payload lengths are treated as damage.
const MAX_PAYLOAD: u32 = 16 * 1024 * 1024;

/// Kind byte of a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Opens a transaction; empty payload.
    Begin = 1,
    /// One encoded [`WalOperation`].
    Operation = 2,
    /// Seals a transaction; replayed on open.
    Commit = 3,
    /// Abandons a transaction.
    Rollback = 4,
}

impl RecordType {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Begin),
            2 => Some(Self::Operation),
            3 => Some(Self::Commit),
            4 => Some(Self::Rollback),
            _ => None,
        }
    }
}

/// A logged player mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalOperation {
    /// Insert or overwrite a full player record.
    PutPlayer(PlayerSnapshot),
    /// Apply a delta against a known version.
    ApplyDelta {
        /// Player ID.
        player: PlayerId,
        /// Version the delta was validated against.
        expected_version: u64,
        /// The change.
        delta: InventoryDelta,
    },
    /// Replace combat stats.
    UpdateStats {
        /// Player ID.
        player: PlayerId,
        /// New stats.
        stats: ActorStats,
    },
    /// Learn a skill or change its trained level.
    LearnSkill {
        /// Player ID.
        player: PlayerId,
        /// Skill name.
        skill: String,
        /// Trained level.
        level: u32,
    },
}

impl WalOperation {
    /// Tag byte, then fields in declaration order.
    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        match self {
            Self::PutPlayer(snapshot) => {
                buf.push(1); // Type tag
                encode_snapshot(&mut buf, snapshot);
            }
            Self::ApplyDelta { player, expected_version, delta } => {
                buf.push(2);
                buf.extend_from_slice(&player.to_le_bytes());
                buf.extend_from_slice(&expected_version.to_le_bytes());
                encode_delta(&mut buf, delta);
            }
            Self::UpdateStats { player, stats } => {
                buf.push(3);
                buf.extend_from_slice(&player.to_le_bytes());
                encode_stats(&mut buf, stats);
            }
            Self::LearnSkill { player, skill, level } => {
                buf.push(4);
                buf.extend_from_slice(&player.to_le_bytes());
                put_str(&mut buf, skill);
                buf.extend_from_slice(&level.to_le_bytes());
            }
        }

        buf
    }

    /// `None` on an unknown tag, short input or trailing bytes.
    fn deserialize(data: &[u8]) -> Option<Self> {
        let mut cursor = Cursor::new(data);
        let op = match cursor.u8()? {
            1 => Self::PutPlayer(decode_snapshot(&mut cursor)?),
            2 => Self::ApplyDelta {
                player: cursor.u64()?,
                expected_version: cursor.u64()?,
                delta: decode_delta(&mut cursor)?,
            },
            3 => Self::UpdateStats {
                player: cursor.u64()?,
                stats: decode_stats(&mut cursor)?,
            },
            4 => Self::LearnSkill {
                player: cursor.u64()?,
                skill: cursor.string()?,
                level: cursor.u32()?,
            },
            _ => return None,
        };
        cursor.is_exhausted().then_some(op)
    }

    /// Player the operation touches.
    #[must_use]
    pub fn player(&self) -> PlayerId {
        match self {
            Self::PutPlayer(snapshot) => snapshot.player_id,
            Self::ApplyDelta { player, .. }
            | Self::UpdateStats { player, .. }
            | Self::LearnSkill { player, .. } => *player,
        }
    }
}

fn put_str(buf: &mut Vec<u8>, value: &str) {
    put_len(buf, value.len());
    buf.extend_from_slice(value.as_bytes());
}

#[allow(clippy::cast_possible_truncation)]
fn put_len(buf: &mut Vec<u8>, len: usize) {
    buf.extend_from_slice(&(len as u32).to_le_bytes());
}

fn encode_stats(buf: &mut Vec<u8>, stats: &ActorStats) {
    buf.extend_from_slice(&stats.attack.to_le_bytes());
    buf.extend_from_slice(&stats.defense.to_le_bytes());
    buf.extend_from_slice(&stats.level.to_le_bytes());
}

fn encode_delta(buf: &mut Vec<u8>, delta: &InventoryDelta) {
    let items: Vec<(&str, i64)> = delta.item_changes().collect();
    put_len(buf, items.len());
    for (item, change) in items {
        put_str(buf, item);
        buf.extend_from_slice(&change.to_le_bytes());
    }
    buf.extend_from_slice(&delta.currency().to_le_bytes());
    let unlocks: Vec<&str> = delta.unlocks().collect();
    put_len(buf, unlocks.len());
    for station in unlocks {
        put_str(buf, station);
    }
}

fn encode_snapshot(buf: &mut Vec<u8>, snapshot: &PlayerSnapshot) {
    buf.extend_from_slice(&snapshot.player_id.to_le_bytes());
    buf.extend_from_slice(&snapshot.version.to_le_bytes());
    encode_stats(buf, &snapshot.stats);
    buf.extend_from_slice(&snapshot.currency.to_le_bytes());

    put_len(buf, snapshot.inventory.distinct_items());
    for (item, count) in snapshot.inventory.iter() {
        put_str(buf, item);
        buf.extend_from_slice(&count.to_le_bytes());
    }
    put_len(buf, snapshot.unlocked_stations.len());
    for station in &snapshot.unlocked_stations {
        put_str(buf, station);
    }
    put_len(buf, snapshot.skills.len());
    for (skill, level) in &snapshot.skills {
        put_str(buf, skill);
        buf.extend_from_slice(&level.to_le_bytes());
    }
}

fn decode_stats(cursor: &mut Cursor<'_>) -> Option<ActorStats> {
    Some(ActorStats::new(cursor.u64()?, cursor.u64()?, cursor.u32()?))
}

fn decode_delta(cursor: &mut Cursor<'_>) -> Option<InventoryDelta> {
    let mut delta = InventoryDelta::new();
    for _ in 0..cursor.u32()? {
        let item = cursor.string()?;
        let change = cursor.i64()?;
        delta.change_item(&item, change);
    }
    delta.change_currency(cursor.i128()?);
    for _ in 0..cursor.u32()? {
        delta.unlock_station(&cursor.string()?);
    }
    Some(delta)
}

fn decode_snapshot(cursor: &mut Cursor<'_>) -> Option<PlayerSnapshot> {
    let player_id = cursor.u64()?;
    let version = cursor.u64()?;
    let stats = decode_stats(cursor)?;
    let currency = cursor.u64()?;

    let mut items = Vec::new();
    for _ in 0..cursor.u32()? {
        items.push((cursor.string()?, cursor.u32()?));
    }
    let mut snapshot = PlayerSnapshot::new(player_id, stats);
    snapshot.version = version;
    snapshot.currency = currency;
    snapshot.inventory = Inventory::from_items(items);

    for _ in 0..cursor.u32()? {
        snapshot.unlocked_stations.insert(cursor.string()?);
    }
    for _ in 0..cursor.u32()? {
        let skill = cursor.string()?;
        snapshot.skills.insert(skill, cursor.u32()?);
    }
    Some(snapshot)
}

/// Bounds-checked little-endian reader over a payload.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let bytes = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(bytes)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn u32(&mut self) -> Option<u32> {
        Some(u32::from_le_bytes(self.take(4)?.try_into().ok()?))
    }

    fn u64(&mut self) -> Option<u64> {
        Some(u64::from_le_bytes(self.take(8)?.try_into().ok()?))
    }

    fn i64(&mut self) -> Option<i64> {
        Some(i64::from_le_bytes(self.take(8)?.try_into().ok()?))
    }

    fn i128(&mut self) -> Option<i128> {
        Some(i128::from_le_bytes(self.take(16)?.try_into().ok()?))
    }

    fn string(&mut self) -> Option<String> {
        let len = usize::try_from(self.u32()?).ok()?;
        String::from_utf8(self.take(len)?.to_vec()).ok()
    }

    fn is_exhausted(&self) -> bool {
        self.pos == self.data.len()
    }
}

/// One decoded record.
#[derive(Clone, Debug)]
pub struct WalRecord {
    /// Position in the log; strictly increasing.
    pub lsn: u64,
    /// Kind.
    pub record_type: RecordType,
    /// Raw payload.
    pub payload: Vec<u8>,
}

/// What recovery found when the log was opened.
#[derive(Clone, Debug, Default)]
pub struct Recovery {
    /// Operations of committed transactions, in commit order.
    pub committed: Vec<WalOperation>,
    /// Transactions discarded because they never committed.
    pub uncommitted: usize,
    /// Transactions discarded because they rolled back.
    pub rolled_back: usize,
    /// Bytes cut from a torn or corrupt tail.
    pub truncated_bytes: u64,
}

/// An open transaction. Dropping it unsealed writes a rollback.
pub struct Transaction<'a> {
    wal: &'a WriteAheadLog,
    /// LSN of the begin record.
    pub txn_id: u64,
    /// Operations written so far.
    operations: usize,
    /// Set once committed or rolled back.
    finalized: bool,
}

impl Transaction<'_> {
    /// Appends `op`. Not durable until [`Transaction::commit`].
    ///
    /// # Errors
    ///
    /// `Unavailable` if the write fails.
    pub fn add_operation(&mut self, op: &WalOperation) -> StoreResult<()> {
        let mut payload = self.txn_id.to_le_bytes().to_vec();
        payload.extend_from_slice(&op.serialize());
        self.wal.write_record(RecordType::Operation, &payload)?;
        self.operations += 1;
        Ok(())
    }

    /// Writes the commit record and fsyncs. Returns the operation count.
    ///
    /// # Errors
    ///
    /// `Unavailable` if the write or sync fails. A commit that was written
    /// but not synced may still reach disk, so the log is poisoned and no
    /// rollback is appended.
    pub fn commit(mut self) -> StoreResult<usize> {
        self.wal.write_record(RecordType::Commit, &self.txn_id.to_le_bytes())?;
        self.finalized = true;
        self.wal.sync()?;
        Ok(self.operations)
    }

    /// Writes a rollback record. Nothing is synced.
    ///
    /// # Errors
    ///
    /// `Unavailable` if the write fails.
    pub fn rollback(mut self) -> StoreResult<()> {
        self.finalized = true;
        self.wal.write_record(RecordType::Rollback, &self.txn_id.to_le_bytes())?;
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finalized {
            let _ = self
                .wal
                .write_record(RecordType::Rollback, &self.txn_id.to_le_bytes());
        }
    }
}

fn io_error(context: &str, e: &std::io::Error) -> StoreError {
    StoreError::Unavailable(format!("{context}: {e}"))
}

/// The journal file and its next LSN.
pub struct WriteAheadLog {
    path: PathBuf,
    /// Next LSN to hand out.
    current_lsn: AtomicU64,
    /// Buffered append handle.
    file: Mutex<BufWriter<File>>,
    /// Set when the file may disagree with memory.
    poisoned: AtomicBool,
    #[cfg(test)]
    fail_next_sync: AtomicBool,
}

impl WriteAheadLog {
    /// Opens or creates a WAL file and recovers its committed operations.
    ///
    /// A torn or corrupt tail is truncated so new records append after the
    /// last intact one.
    ///
    /// # Errors
    ///
    /// `Unavailable` on I/O failure, `Corrupt` on a bad header.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<(Self, Recovery)> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| io_error("failed to open WAL", &e))?;

        let len = file
            .metadata()
            .map_err(|e| io_error("failed to read WAL metadata", &e))?
            .len();
        if len == 0 {
            file.write_all(&encode_header(0))
                .map_err(|e| io_error("failed to write WAL header", &e))?;
            file.sync_all()
                .map_err(|e| io_error("failed to sync WAL header", &e))?;
        }

        let (recovery, next_lsn, good_len) = Self::recover(&path)?;
        let file_len = file
            .metadata()
            .map_err(|e| io_error("failed to read WAL metadata", &e))?
            .len();
        if good_len < file_len {
            file.set_len(good_len)
                .map_err(|e| io_error("failed to truncate WAL tail", &e))?;
        }
        file.seek(SeekFrom::End(0))
            .map_err(|e| io_error("failed to seek WAL", &e))?;

        let wal = Self {
            path,
            current_lsn: AtomicU64::new(next_lsn),
            file: Mutex::new(BufWriter::new(file)),
            poisoned: AtomicBool::new(false),
            #[cfg(test)]
            fail_next_sync: AtomicBool::new(false),
        };
        Ok((wal, recovery))
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes a begin record and returns its handle.
    ///
    /// # Errors
    ///
    /// `Unavailable` if the write fails.
    pub fn begin_transaction(&self) -> StoreResult<Transaction<'_>> {
        let lsn = self.write_record(RecordType::Begin, &[])?;

        Ok(Transaction {
            wal: self,
            txn_id: lsn,
            operations: 0,
            finalized: false,
        })
    }

    /// Returns true once a failed write or sync has made the log unusable.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    fn poison(&self, error: StoreError) -> StoreError {
        self.poisoned.store(true, Ordering::SeqCst);
        tracing::error!(path = %self.path.display(), %error, "WAL poisoned; writes refused until compaction");
        error
    }

    fn write_record(&self, record_type: RecordType, payload: &[u8]) -> StoreResult<u64> {
        let mut file = self.file.lock();
        if self.is_poisoned() {
            return Err(StoreError::Unavailable(
                "WAL is poisoned by an earlier I/O failure".to_owned(),
            ));
        }
        let lsn = self.current_lsn.fetch_add(1, Ordering::SeqCst);
        file.write_all(&encode_record(lsn, record_type, payload))
            .map_err(|e| self.poison(io_error("WAL write failed", &e)))?;
        Ok(lsn)
    }

    /// Flushes the buffer and fsyncs. Poisons the log on failure.
    fn sync(&self) -> StoreResult<()> {
        let mut file = self.file.lock();
        if self.injected_sync_failure() {
            return Err(self.poison(StoreError::Unavailable("WAL sync failed: injected".to_owned())));
        }
        file.flush()
            .map_err(|e| self.poison(io_error("WAL sync failed", &e)))?;
        file.get_ref()
            .sync_all()
            .map_err(|e| self.poison(io_error("WAL sync failed", &e)))?;
        Ok(())
    }

    #[cfg(test)]
    fn injected_sync_failure(&self) -> bool {
        self.fail_next_sync.swap(false, Ordering::SeqCst)
    }

    #[cfg(not(test))]
    #[allow(clippy::unused_self)]
    const fn injected_sync_failure(&self) -> bool {
        false
    }

    /// Scans the file and collects committed operations.
    ///
    /// Returns the recovery report, the next LSN and the length of the
    /// intact prefix.
    fn recover(path: &Path) -> StoreResult<(Recovery, u64, u64)> {
        let file = File::open(path).map_err(|e| io_error("failed to open WAL for recovery", &e))?;
        let mut reader = BufReader::new(file);

        // Read and verify header
        let mut header = [0u8; 16];
        reader
            .read_exact(&mut header)
            .map_err(|e| StoreError::Corrupt(format!("truncated WAL header: {e}")))?;
        if &header[0..4] != WAL_MAGIC {
            return Err(StoreError::Corrupt("invalid WAL magic".to_owned()));
        }
        let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if version != WAL_VERSION {
            return Err(StoreError::Corrupt(format!("unsupported WAL version: {version}")));
        }
        let mut lsn_bytes = [0u8; 8];
        lsn_bytes.copy_from_slice(&header[8..16]);
        let mut next_lsn = u64::from_le_bytes(lsn_bytes);

        let mut recovery = Recovery::default();
        let mut open_transactions: HashMap<u64, Vec<WalOperation>> = HashMap::new();
        let mut good_len = HEADER_LEN;

        // Read records until EOF or the first damaged one
        while let Some(record) = Self::read_record(&mut reader) {
            good_len += RECORD_OVERHEAD + record.payload.len() as u64;
            next_lsn = next_lsn.max(record.lsn + 1);

            match record.record_type {
                RecordType::Begin => {
                    open_transactions.insert(record.lsn, Vec::new());
                }
                RecordType::Operation => {
                    let Some((txn_id, body)) = split_txn(&record.payload) else {
                        tracing::warn!(lsn = record.lsn, "WAL operation without transaction id");
                        continue;
                    };
                    match (open_transactions.get_mut(&txn_id), WalOperation::deserialize(body)) {
                        (Some(ops), Some(op)) => ops.push(op),
                        (None, _) => {
                            tracing::warn!(lsn = record.lsn, txn_id, "WAL operation for unknown transaction");
                        }
                        (Some(_), None) => {
                            return Err(StoreError::Corrupt(format!(
                                "undecodable operation at LSN {}",
                                record.lsn
                            )));
                        }
                    }
                }
                RecordType::Commit => {
                    if let Some(ops) = split_txn(&record.payload)
                        .and_then(|(txn_id, _)| open_transactions.remove(&txn_id))
                    {
                        recovery.committed.extend(ops);
                    }
                }
                RecordType::Rollback => {
                    if split_txn(&record.payload)
                        .and_then(|(txn_id, _)| open_transactions.remove(&txn_id))
                        .is_some()
                    {
                        recovery.rolled_back += 1;
                    }
                }
            }
        }

        let file_len = fs::metadata(path)
            .map_err(|e| io_error("failed to read WAL metadata", &e))?
            .len();
        recovery.truncated_bytes = file_len.saturating_sub(good_len);
        recovery.uncommitted = open_transactions.len();

        if recovery.truncated_bytes > 0 {
            tracing::warn!(bytes = recovery.truncated_bytes, "WAL recovery: truncating damaged tail");
        }
        if recovery.uncommitted > 0 {
            tracing::warn!(count = recovery.uncommitted, "WAL recovery: uncommitted transactions discarded");
        }

        Ok((recovery, next_lsn, good_len))
    }

    /// Reads a single record. Returns `None` at EOF or on any damage.
    fn read_record(reader: &mut impl Read) -> Option<WalRecord> {
        let mut prefix = [0u8; 13];
        reader.read_exact(&mut prefix).ok()?;
        let lsn = u64::from_le_bytes(prefix[0..8].try_into().ok()?);
        let record_type = RecordType::from_u8(prefix[8])?;
        let payload_len = u32::from_le_bytes(prefix[9..13].try_into().ok()?);
        if payload_len > MAX_PAYLOAD {
            return None;
        }

        let mut payload = vec![0u8; usize::try_from(payload_len).ok()?];
        reader.read_exact(&mut payload).ok()?;

        let mut crc_bytes = [0u8; 4];
        reader.read_exact(&mut crc_bytes).ok()?;
        let stored_crc = u32::from_le_bytes(crc_bytes);

        // Verify CRC
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&prefix);
        hasher.update(&payload);
        if hasher.finalize() != stored_crc {
            return None;
        }

        Some(WalRecord {
            lsn,
            record_type,
            payload,
        })
    }

    /// Replaces the log with a single committed transaction of
    /// `PutPlayer` records, one per snapshot.
    ///
    /// The new log is written beside the old one and renamed over it. A
    /// successful compaction clears poisoning: the new file holds exactly
    /// `snapshots`.
    ///
    /// # Errors
    ///
    /// `Unavailable` on I/O failure; the old log stays in place.
    pub fn compact(&self, snapshots: &[PlayerSnapshot]) -> StoreResult<()> {
        let mut file = self.file.lock();
        if !self.is_poisoned() {
            file.flush()
                .map_err(|e| io_error("WAL flush failed", &e))?;
        }

        let start = self.current_lsn.load(Ordering::SeqCst);
        let mut lsn = start;
        let mut bytes = encode_header(start).to_vec();

        let txn_id = lsn;
        bytes.extend_from_slice(&encode_record(lsn, RecordType::Begin, &[]));
        for snapshot in snapshots {
            lsn += 1;
            let mut payload = txn_id.to_le_bytes().to_vec();
            payload.extend_from_slice(&WalOperation::PutPlayer(snapshot.clone()).serialize());
            bytes.extend_from_slice(&encode_record(lsn, RecordType::Operation, &payload));
        }
        lsn += 1;
        bytes.extend_from_slice(&encode_record(lsn, RecordType::Commit, &txn_id.to_le_bytes()));

        let staging = self.path.with_extension("compact");
        {
            let mut out = File::create(&staging)
                .map_err(|e| io_error("failed to create compacted WAL", &e))?;
            out.write_all(&bytes)
                .map_err(|e| io_error("failed to write compacted WAL", &e))?;
            out.sync_all()
                .map_err(|e| io_error("failed to sync compacted WAL", &e))?;
        }
        fs::rename(&staging, &self.path)
            .map_err(|e| io_error("failed to replace WAL", &e))?;

        let mut reopened = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| io_error("failed to reopen WAL", &e))?;
        reopened
            .seek(SeekFrom::End(0))
            .map_err(|e| io_error("failed to seek WAL", &e))?;

        *file = BufWriter::new(reopened);
        self.current_lsn.store(lsn + 1, Ordering::SeqCst);
        self.poisoned.store(false, Ordering::SeqCst);

        tracing::info!(players = snapshots.len(), "WAL compacted");
        Ok(())
    }
}

fn encode_header(next_lsn: u64) -> [u8; 16] {
    let mut header = [0u8; 16];
    header[0..4].copy_from_slice(WAL_MAGIC);
    header[4..8].copy_from_slice(&WAL_VERSION.to_le_bytes());
    header[8..16].copy_from_slice(&next_lsn.to_le_bytes());
    header
}

#[allow(clippy::cast_possible_truncation)]
fn encode_record(lsn: u64, record_type: RecordType, payload: &[u8]) -> Vec<u8> {
    let mut record = Vec::with_capacity(RECORD_OVERHEAD as usize + payload.len());
    record.extend_from_slice(&lsn.to_le_bytes());
    record.push(record_type as u8);
    record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    record.extend_from_slice(payload);

    // CRC32 over everything above
    let crc = crc32fast::hash(&record);
    record.extend_from_slice(&crc.to_le_bytes());
    record
}

fn split_txn(payload: &[u8]) -> Option<(u64, &[u8])> {
    if payload.len() < 8 {
        return None;
    }
    let (id, body) = payload.split_at(8);
    Some((u64::from_le_bytes(id.try_into().ok()?), body))
}

/// A [`MemoryStore`] whose every mutation is logged to a WAL first.
///
/// The log write happens under the store's write lock, after validation
/// and before the new state becomes visible. If the log write fails, the
/// in-memory state is unchanged.
pub struct DurableStore {
    memory: MemoryStore,
    wal: WriteAheadLog,
}

impl DurableStore {
    /// Opens the log at `path` and rebuilds state from it.
    ///
    /// # Errors
    ///
    /// `Unavailable` on I/O failure, `Corrupt` if the log is unreadable or a
    /// committed operation does not replay cleanly.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let (wal, recovery) = WriteAheadLog::open(path)?;
        let memory = MemoryStore::new();

        let replayed = recovery.committed.len();
        for op in recovery.committed {
            replay(&memory, op)?;
        }

        tracing::info!(
            path = %wal.path().display(),
            replayed,
            players = memory.len(),
            discarded = recovery.uncommitted + recovery.rolled_back,
            "durable store opened"
        );
        Ok(Self { memory, wal })
    }

    /// Registers a new player.
    ///
    /// # Errors
    ///
    /// `PlayerExists` if the ID is taken, `Unavailable` if logging fails.
    pub fn create_player(&self, player: PlayerId, stats: ActorStats) -> StoreResult<PlayerSnapshot> {
        self.memory.insert_with(PlayerSnapshot::new(player, stats), |snapshot| {
            self.log(&WalOperation::PutPlayer(snapshot.clone()))
        })
    }

    /// Replaces a player's combat stats.
    ///
    /// # Errors
    ///
    /// `PlayerNotFound` if absent, `Unavailable` if logging fails.
    pub fn set_stats(&self, player: PlayerId, stats: ActorStats) -> StoreResult<u64> {
        self.memory.update_with(
            player,
            None,
            |current| Ok(with_stats(current, stats)),
            |_| self.log(&WalOperation::UpdateStats { player, stats }),
        )
    }

    /// Sets the trained level of a skill, learning it if new.
    ///
    /// # Errors
    ///
    /// `PlayerNotFound` if absent, `Unavailable` if logging fails.
    pub fn set_skill_level(&self, player: PlayerId, skill: &str, level: u32) -> StoreResult<u64> {
        self.memory.update_with(
            player,
            None,
            |current| Ok(with_skill(current, skill, level)),
            |_| {
                self.log(&WalOperation::LearnSkill {
                    player,
                    skill: skill.to_owned(),
                    level,
                })
            },
        )
    }

    /// Rewrites the log as one snapshot per player.
    ///
    /// Writers block until compaction finishes.
    ///
    /// # Errors
    ///
    /// `Unavailable` on I/O failure.
    pub fn compact(&self) -> StoreResult<()> {
        self.memory.with_exclusive(|snapshots| self.wal.compact(snapshots))
    }

    /// Number of players stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    /// Returns true if no players are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    /// All snapshots, ordered by player ID.
    #[must_use]
    pub fn snapshots(&self) -> Vec<PlayerSnapshot> {
        self.memory.snapshots()
    }

    fn log(&self, op: &WalOperation) -> StoreResult<()> {
        let mut txn = self.wal.begin_transaction()?;
        txn.add_operation(op)?;
        txn.commit()?;
        Ok(())
    }
}

impl StateStore for DurableStore {
    fn load(&self, player: PlayerId) -> StoreResult<PlayerSnapshot> {
        self.memory.load(player)
    }

    fn apply_delta(
        &self,
        player: PlayerId,
        expected_version: u64,
        delta: &InventoryDelta,
    ) -> StoreResult<u64> {
        self.memory.update_with(
            player,
            Some(expected_version),
            |current| Ok(current.with_delta(delta)?),
            |_| {
                self.log(&WalOperation::ApplyDelta {
                    player,
                    expected_version,
                    delta: delta.clone(),
                })
            },
        )
    }
}

/// Applies one recovered operation to the rebuilt store.
fn replay(memory: &MemoryStore, op: WalOperation) -> StoreResult<()> {
    let player = op.player();
    let result = match op {
        WalOperation::PutPlayer(snapshot) => {
            memory.put(snapshot);
            Ok(())
        }
        WalOperation::ApplyDelta { player, expected_version, delta } => memory
            .update_with(
                player,
                Some(expected_version),
                |current| Ok(current.with_delta(&delta)?),
                |_| Ok(()),
            )
            .map(drop),
        WalOperation::UpdateStats { player, stats } => memory.set_stats(player, stats).map(drop),
        WalOperation::LearnSkill { player, skill, level } => {
            memory.set_skill_level(player, &skill, level).map(drop)
        }
    };
    result.map_err(|e| StoreError::Corrupt(format!("replay failed for player {player}: {e}")))
}
