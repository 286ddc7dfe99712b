use std::time::Duration;

use camino::Utf8Path;
use tracing::debug;

use super::bag::BagSource;
use super::error::{MuxError, Result};
use super::rebase::{RebaseError, TimeRebaser};
use super::record::BagRecord;
use super::sensors::timestamp::{TimeOffset, Timestamp};

/// One input bag being consumed in order, with its own time shift.
pub struct InputStream<S> {
    id: usize,
    source: S,
    cursor: usize,
    rebaser: TimeRebaser,
}

impl<S: BagSource> InputStream<S> {
    /// Anchors the stream so its first message lands on `base_time + jitter`.
    pub fn open(id: usize, source: S, base_time: Timestamp, jitter: Duration) -> Result<Self> {
        if source.is_empty() {
            return Err(MuxError::EmptyStream {
                path: source.path().to_path_buf(),
            });
        }
        let first = source.first_timestamp()?;
        let rebaser = TimeRebaser::new(base_time, first, jitter)
            .map_err(|e| rebase_error(e, source.path(), 0))?;
        debug!(
            "Stream {} ({}): {} messages starting at {}, shifted by {}",
            id,
            source.path(),
            source.len(),
            first,
            rebaser.offset()
        );
        Ok(InputStream {
            id,
            source,
            cursor: 0,
            rebaser,
        })
    }

    /// Reads and rebases the next record, or `None` once every message has
    /// been returned. The cursor only moves past records that were read
    /// successfully.
    pub fn advance(&mut self) -> Result<Option<BagRecord>> {
        if self.cursor >= self.source.len() {
            return Ok(None);
        }
        let index = self.cursor;
        let record = self.source.read_at(index)?;
        let record = self
            .rebaser
            .rebase(record)
            .map_err(|e| rebase_error(e, self.source.path(), index))?;
        self.cursor += 1;
        Ok(Some(record))
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn path(&self) -> &Utf8Path {
        self.source.path()
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.source.len() - self.cursor
    }

    pub fn offset(&self) -> TimeOffset {
        self.rebaser.offset()
    }
}

fn rebase_error(error: RebaseError, path: &Utf8Path, index: usize) -> MuxError {
    match error {
        RebaseError::TimeOverflow { time, offset } => MuxError::TimeOverflow { time, offset },
        RebaseError::StampOverflow(stamp) => MuxError::StampOverflow(stamp),
        RebaseError::Payload(reason) => MuxError::corrupt(path, index, reason),
    }
}
