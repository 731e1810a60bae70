use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use serde::de::DeserializeOwned;
use slotmap::{SlotMap, new_key_type};
use uuid::Uuid;

use crate::domain::utils::id::SegmentId;
use crate::error::{Error, Result};

new_key_type! {
    pub struct CellKey;
}

/// One resident element. `seq` is the element's position in append order.
#[derive(Debug)]
struct Cell<V> {
    seq: u64,
    value: V,
    next: Option<CellKey>,
}

/// A run of elements `[start, end)` (in append order) that lives in a file on disk.
#[derive(Debug)]
struct Segment {
    id: SegmentId,
    path: PathBuf,
    start: u64,
    end: u64,
}

impl Segment {
    fn len(&self) -> usize {
        (self.end - self.start) as usize
    }
}

/// Logical cursor positions, expressed as append sequence numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamCursors {
    pub head: Option<u64>,
    pub spill_boundary: u64,
    pub tail: Option<u64>,
}

#[derive(Debug)]
struct StreamInner<V> {
    /// Arena holding every resident cell. Cells are chained in append order from `head` to `tail`;
    /// spilled runs are left out of the chain and tracked in `segments`.
    cells: SlotMap<CellKey, Cell<V>>,
    head: Option<CellKey>,
    tail: Option<CellKey>,

    /// Cells with `seq >= spill_boundary` have never been written to disk.
    spill_boundary: u64,

    /// Spilled runs, ordered by `start`.
    segments: VecDeque<Segment>,
    spilled_len: usize,
    next_seq: u64,
    next_segment: u64,
}

impl<V> StreamInner<V> {
    fn new() -> Self {
        StreamInner {
            cells: SlotMap::with_key(),
            head: None,
            tail: None,
            spill_boundary: 0,
            segments: VecDeque::new(),
            spilled_len: 0,
            next_seq: 0,
            next_segment: 1,
        }
    }

    fn seq_of(&self, key: Option<CellKey>) -> Option<u64> {
        key.and_then(|k| self.cells.get(k)).map(|cell| cell.seq)
    }

    /// True when the oldest live element sits on disk rather than at `head`.
    fn front_is_spilled(&self) -> bool {
        match self.segments.front() {
            Some(segment) => self.seq_of(self.head).is_none_or(|seq| seq >= segment.start),
            None => false,
        }
    }
}

/// Append-mostly sequence that can move its cold middle to disk.
///
/// Elements are consumed from the front with [`StreamBuffer::head`] in exactly the order they were
/// appended, regardless of how many spill and restore cycles happened in between. All operations
/// take a single per-buffer lock, so one thread may append while another consumes.
#[derive(Debug)]
pub struct StreamBuffer<V> {
    id: Uuid,
    spill_dir: PathBuf,

    /// Number of never-spilled cells that triggers an automatic spill on append. Restored cells do
    /// not count, since they cannot be spilled again. `0` disables it.
    spill_threshold: usize,
    inner: Mutex<StreamInner<V>>,
}

impl<V> StreamBuffer<V> {
    pub fn new(spill_dir: impl Into<PathBuf>) -> Self {
        Self::with_threshold(spill_dir, 0)
    }

    pub fn with_threshold(spill_dir: impl Into<PathBuf>, spill_threshold: usize) -> Self {
        StreamBuffer { id: Uuid::new_v4(), spill_dir: spill_dir.into(), spill_threshold, inner: Mutex::new(StreamInner::new()) }
    }

    fn lock(&self) -> MutexGuard<'_, StreamInner<V>> {
        self.inner.lock().expect("stream lock poisoned")
    }

    /// A new, empty buffer spilling into the same directory with the same threshold.
    pub fn sibling<R>(&self) -> StreamBuffer<R> {
        StreamBuffer::with_threshold(self.spill_dir.clone(), self.spill_threshold)
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.lock();
        inner.head.is_none() && inner.segments.is_empty()
    }

    /// Live elements, resident and spilled.
    pub fn len(&self) -> usize {
        let inner = self.lock();
        inner.cells.len() + inner.spilled_len
    }

    pub fn resident_len(&self) -> usize {
        self.lock().cells.len()
    }

    pub fn segment_count(&self) -> usize {
        self.lock().segments.len()
    }

    pub fn cursors(&self) -> StreamCursors {
        let inner = self.lock();
        StreamCursors { head: inner.seq_of(inner.head), spill_boundary: inner.spill_boundary, tail: inner.seq_of(inner.tail) }
    }

    fn segment_path(&self, segment: SegmentId) -> PathBuf {
        self.spill_dir.join(format!("{}-{}.seg", self.id, segment.id))
    }
}

impl<V> StreamBuffer<V>
where
    V: Serialize + DeserializeOwned,
{
    /// Appends `value` behind the current tail. Never fails; a failing automatic spill is logged and
    /// the value simply stays in memory.
    pub fn append(&self, value: V) {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let seq = inner.next_seq;
        inner.next_seq += 1;
        let key = inner.cells.insert(Cell { seq, value, next: None });

        match inner.tail.and_then(|tail| inner.cells.get_mut(tail)) {
            Some(tail) => tail.next = Some(key),
            None => inner.head = Some(key),
        }
        inner.tail = Some(key);

        let unspilled = (inner.next_seq - inner.spill_boundary) as usize;
        if self.spill_threshold > 0 && unspilled >= self.spill_threshold {
            if let Err(e) = self.spill_locked(inner) {
                log::error!("Automatic spill of stream {} failed, keeping data in memory: {}", self.id, e);
            }
        }
    }

    /// Removes and returns the oldest element, reading the next disk segment back in when needed.
    pub fn head(&self) -> Result<V> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        if inner.front_is_spilled() {
            if let Some(segment) = inner.segments.pop_front() {
                self.restore_locked(inner, segment)?;
            }
        }

        let key = inner.head.ok_or(Error::EmptySequence)?;
        let cell = inner.cells.remove(key).ok_or(Error::EmptySequence)?;

        inner.head = cell.next;
        match inner.seq_of(inner.head) {
            Some(seq) => inner.spill_boundary = inner.spill_boundary.max(seq),
            None => {
                inner.tail = None;
                if inner.segments.is_empty() {
                    inner.spill_boundary = inner.next_seq;
                }
            }
        }

        Ok(cell.value)
    }

    /// Writes every resident cell that was never spilled, except the tail, into a new segment.
    pub fn spill_to_disk(&self) -> Result<()> {
        let mut guard = self.lock();
        self.spill_locked(&mut guard)
    }

    fn spill_locked(&self, inner: &mut StreamInner<V>) -> Result<()> {
        let Some(tail) = inner.tail else {
            return Ok(());
        };

        // Walk the chain: cells below the boundary stay, the rest (up to the tail) leave.
        let mut last_kept: Option<CellKey> = None;
        let mut to_spill = Vec::new();
        let mut cursor = inner.head;
        while let Some(key) = cursor {
            if key == tail {
                break;
            }
            let cell = &inner.cells[key];
            if cell.seq >= inner.spill_boundary {
                to_spill.push(key);
            } else {
                last_kept = Some(key);
            }
            cursor = cell.next;
        }

        if to_spill.is_empty() {
            log::debug!("Nothing to spill for stream {}.", self.id);
            return Ok(());
        }

        let segment_id = SegmentId::new(inner.next_segment);
        let path = self.segment_path(segment_id);
        let start = inner.cells[to_spill[0]].seq;
        let end = inner.cells[tail].seq;

        {
            let values: Vec<&V> = to_spill.iter().map(|key| &inner.cells[*key].value).collect();
            if let Err(e) = self.write_segment(&path, &values) {
                let _ = fs::remove_file(&path);
                return Err(Error::SpillFailure { segment: segment_id.id, reason: e.to_string() });
            }
        }

        for key in &to_spill {
            inner.cells.remove(*key);
        }
        match last_kept {
            Some(key) => inner.cells[key].next = Some(tail),
            None => inner.head = Some(tail),
        }

        inner.next_segment += 1;
        inner.spill_boundary = end;
        inner.spilled_len += to_spill.len();
        inner.segments.push_back(Segment { id: segment_id, path, start, end });

        log::debug!("Spilled {} cells of stream {} into segment {}.", to_spill.len(), self.id, segment_id.id);
        Ok(())
    }

    fn write_segment(&self, path: &Path, values: &Vec<&V>) -> Result<()> {
        fs::create_dir_all(&self.spill_dir)?;
        let mut writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(&mut writer, values)?;
        writer.flush()?;
        Ok(())
    }

    fn read_segment(path: &Path) -> Result<Vec<V>> {
        let reader = BufReader::new(File::open(path)?);
        Ok(bincode::deserialize_from(reader)?)
    }

    /// Links the contents of `segment` back into the chain at its place in append order.
    ///
    /// The segment is consumed either way: on failure its elements are lost for this run.
    fn restore_locked(&self, inner: &mut StreamInner<V>, segment: Segment) -> Result<()> {
        inner.spilled_len -= segment.len();

        let values = match Self::read_segment(&segment.path) {
            Ok(values) if values.len() == segment.len() => values,
            Ok(values) => {
                let reason = format!("expected {} elements, found {}", segment.len(), values.len());
                return Err(self.restore_failed(&segment, reason));
            }
            Err(e) => return Err(self.restore_failed(&segment, e.to_string())),
        };

        // Predecessor: the last resident cell that precedes the segment.
        let mut predecessor: Option<CellKey> = None;
        let mut cursor = inner.head;
        while let Some(key) = cursor {
            let cell = &inner.cells[key];
            if cell.seq >= segment.start {
                break;
            }
            predecessor = Some(key);
            cursor = cell.next;
        }

        let successor = match predecessor {
            Some(key) => inner.cells[key].next,
            None => inner.head,
        };

        let mut next = successor;
        let mut last_inserted = None;
        for (offset, value) in values.into_iter().enumerate().rev() {
            let key = inner.cells.insert(Cell { seq: segment.start + offset as u64, value, next });
            if last_inserted.is_none() {
                last_inserted = Some(key);
            }
            next = Some(key);
        }

        match predecessor {
            Some(key) => inner.cells[key].next = next,
            None => inner.head = next,
        }
        if successor.is_none() {
            inner.tail = last_inserted;
        }

        if let Err(e) = fs::remove_file(&segment.path) {
            log::warn!("Could not delete restored segment {:?}: {}", segment.path, e);
        }

        log::debug!("Restored segment {} of stream {} ({} cells).", segment.id.id, self.id, segment.len());
        Ok(())
    }

    fn restore_failed(&self, segment: &Segment, reason: String) -> Error {
        log::error!("Segment {} of stream {} could not be restored, {} elements are lost: {}", segment.id.id, self.id, segment.len(), reason);
        let _ = fs::remove_file(&segment.path);
        Error::RestoreFailure { segment: segment.id.id, reason }
    }

    /// Reads every spilled segment back into memory.
    ///
    /// A segment that fails is dropped and the remaining ones are still restored; the first failure
    /// is returned.
    pub fn restore_all(&self) -> Result<()> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let mut first_error = None;
        while let Some(segment) = inner.segments.pop_front() {
            if let Err(e) = self.restore_locked(inner, segment) {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Atomically empties the buffer and returns every live element in append order.
    ///
    /// Segments that cannot be restored are logged and skipped.
    pub fn drain_all(&self) -> Vec<V> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        while let Some(segment) = inner.segments.pop_front() {
            // Already logged by restore_locked.
            let _ = self.restore_locked(inner, segment);
        }

        let mut drained = Vec::with_capacity(inner.cells.len());
        let mut cursor = inner.head;
        while let Some(key) = cursor {
            match inner.cells.remove(key) {
                Some(cell) => {
                    cursor = cell.next;
                    drained.push(cell.value);
                }
                None => break,
            }
        }

        inner.cells.clear();
        inner.head = None;
        inner.tail = None;
        inner.spill_boundary = inner.next_seq;
        drained
    }

    /// Left fold over the resident elements. Spilled segments are not visited.
    pub fn fold_left<R, F>(&self, init: R, mut op: F) -> R
    where
        F: FnMut(R, &V) -> R,
    {
        let inner = self.lock();
        let mut acc = init;
        let mut cursor = inner.head;
        while let Some(key) = cursor {
            let cell = &inner.cells[key];
            acc = op(acc, &cell.value);
            cursor = cell.next;
        }
        acc
    }

    /// New buffer holding `op` applied to every resident element.
    pub fn map<R, F>(&self, mut op: F) -> StreamBuffer<R>
    where
        R: Serialize + DeserializeOwned,
        F: FnMut(&V) -> R,
    {
        let mapped = self.sibling();
        self.fold_left((), |_, value| mapped.append(op(value)));
        mapped
    }

    /// New buffer holding the resident elements for which `predicate` holds.
    pub fn filter<F>(&self, mut predicate: F) -> StreamBuffer<V>
    where
        V: Clone,
        F: FnMut(&V) -> bool,
    {
        let filtered = self.sibling();
        self.fold_left((), |_, value| {
            if predicate(value) {
                filtered.append(value.clone());
            }
        });
        filtered
    }
}

impl<V> Drop for StreamBuffer<V> {
    fn drop(&mut self) {
        let inner = match self.inner.get_mut() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        for segment in inner.segments.drain(..) {
            let _ = fs::remove_file(&segment.path);
        }
    }
}
