//! K-way merge of rebased input streams.
//!
//! Every active stream contributes exactly one look-ahead record to a
//! min-heap. Popping the heap yields the globally earliest record; the
//! stream it came from is then refilled, or retired once it reports the end
//! of its messages. Because rebasing is a constant shift per stream and each
//! bag is chronological, the emitted log times never decrease.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracing::{debug, trace};

use super::bag::BagSource;
use super::error::{MuxError, Result};
use super::record::BagRecord;
use super::sensors::timestamp::Timestamp;
use super::stream::InputStream;

struct HeapEntry {
    record: BagRecord,
    /// Position in `MergeScheduler::streams`.
    slot: usize,
    stream_id: usize,
}

impl HeapEntry {
    #[inline]
    fn key(&self) -> (Timestamp, usize) {
        (self.record.log_time, self.stream_id)
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: earliest time pops first, then the lowest stream id.
        self.key().cmp(&other.key()).reverse()
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for HeapEntry {}

pub struct MergeScheduler<S> {
    streams: Vec<Option<InputStream<S>>>,
    heap: BinaryHeap<HeapEntry>,
    primed: bool,
    /// Error hit while refilling after the record that was just emitted.
    pending_error: Option<MuxError>,
    done: bool,
    emitted: u64,
    total: u64,
}

impl<S: BagSource> MergeScheduler<S> {
    pub fn new(streams: Vec<InputStream<S>>) -> Self {
        let total = streams.iter().map(|s| s.len() as u64).sum();
        MergeScheduler {
            heap: BinaryHeap::with_capacity(streams.len()),
            streams: streams.into_iter().map(Some).collect(),
            primed: false,
            pending_error: None,
            done: false,
            emitted: 0,
            total,
        }
    }

    /// Messages across every stream, emitted or not.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Streams that still have a look-ahead record.
    pub fn active_streams(&self) -> usize {
        self.heap.len()
    }

    /// Pulls one look-ahead record from every stream. Streams that are
    /// already exhausted are dropped here.
    fn prime(&mut self) -> Result<()> {
        self.primed = true;
        for slot in 0..self.streams.len() {
            self.refill(slot)?;
        }
        debug!(
            "Merging {} streams, {} messages in total",
            self.heap.len(),
            self.total
        );
        Ok(())
    }

    fn refill(&mut self, slot: usize) -> Result<()> {
        let Some(stream) = self.streams[slot].as_mut() else {
            return Ok(());
        };
        match stream.advance()? {
            Some(record) => {
                let stream_id = stream.id();
                self.heap.push(HeapEntry {
                    record,
                    slot,
                    stream_id,
                });
            }
            None => {
                debug!("Stream {} ({}) exhausted", stream.id(), stream.path());
                // Releases the stream's mapping.
                self.streams[slot] = None;
            }
        }
        Ok(())
    }

    fn fail(&mut self, error: MuxError) -> Option<Result<BagRecord>> {
        self.done = true;
        self.heap.clear();
        self.streams.clear();
        Some(Err(error))
    }
}

impl<S: BagSource> Iterator for MergeScheduler<S> {
    type Item = Result<BagRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(error) = self.pending_error.take() {
            return self.fail(error);
        }
        if !self.primed {
            if let Err(error) = self.prime() {
                return self.fail(error);
            }
        }

        let Some(entry) = self.heap.pop() else {
            self.done = true;
            return None;
        };
        // The popped record is emitted even if its stream fails to refill;
        // the error comes out on the next call.
        if let Err(error) = self.refill(entry.slot) {
            self.pending_error = Some(error);
        }

        self.emitted += 1;
        trace!(
            "stream {} | {} | {}",
            entry.stream_id,
            entry.record.topic(),
            entry.record.log_time
        );
        Some(Ok(entry.record))
    }
}
