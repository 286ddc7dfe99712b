pub mod bag;
pub mod cli_common;
pub mod error;
pub mod io;
pub mod progress;
pub mod rebase;
pub mod record;
pub mod rosbag;
pub mod scheduler;
pub mod sensors;
pub mod sink;
pub mod stream;

#[cfg(test)]
mod test_fixtures;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use mcap::Compression;
use tracing::{info, warn};

use bag::{BagSource, McapBag};
use error::{MuxError, Result};
use progress::ProgressReporter;
use rebase::{Jitter, DEFAULT_MAX_JITTER};
use scheduler::MergeScheduler;
use sensors::timestamp::Timestamp;
use sink::{McapSink, RecordSink, SinkSummary};
use stream::InputStream;

/// Everything one run needs, usually built from the command line.
#[derive(Debug, Clone)]
pub struct MuxOptions {
    pub inputs: Vec<Utf8PathBuf>,
    /// `None` names the output after the base time.
    pub output: Option<Utf8PathBuf>,
    /// `None` means now.
    pub base_time: Option<Timestamp>,
    pub max_jitter: Duration,
    pub seed: Option<u64>,
    pub compression: Option<Compression>,
    pub progress: bool,
}

impl Default for MuxOptions {
    fn default() -> Self {
        MuxOptions {
            inputs: Vec::new(),
            output: None,
            base_time: None,
            max_jitter: DEFAULT_MAX_JITTER,
            seed: None,
            compression: None,
            progress: true,
        }
    }
}

impl MuxOptions {
    /// Checks the arguments alone, without touching the filesystem.
    pub fn validate(&self) -> Result<()> {
        if self.inputs.len() < 2 {
            return Err(MuxError::Usage(format!(
                "at least two input bags are needed, got {}",
                self.inputs.len()
            )));
        }
        if let Some(output) = &self.output {
            if output.as_str().is_empty() {
                return Err(MuxError::Usage("output path is empty".to_string()));
            }
            io::check_output_name(output)?;
        }
        Ok(())
    }

    fn output_or_default(&self, base_time: Timestamp) -> Utf8PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| default_output_name(base_time))
    }
}

/// `<seconds>.mcap` in the working directory.
pub fn default_output_name(base_time: Timestamp) -> Utf8PathBuf {
    let (sec, _) = base_time.get_sec_nsec();
    Utf8PathBuf::from(format!("{}.mcap", sec))
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct MuxReport {
    pub summary: SinkSummary,
    pub streams_merged: usize,
    /// Inputs left out because they held no messages.
    pub skipped: Vec<Utf8PathBuf>,
    pub output: Option<Utf8PathBuf>,
    pub metadata: Option<Utf8PathBuf>,
}

impl MuxReport {
    pub fn messages_written(&self) -> u64 {
        self.summary.message_count
    }

    /// Messages per topic.
    pub fn topic_counts(&self) -> Vec<(&str, u64)> {
        let mut counts: Vec<(&str, u64)> = Vec::new();
        for tally in self.summary.topics.values() {
            match counts.iter_mut().find(|(topic, _)| *topic == tally.topic) {
                Some((_, count)) => *count += tally.message_count,
                None => counts.push((tally.topic.as_str(), tally.message_count)),
            }
        }
        counts
    }
}

/// One merge run: the scheduler over every non-empty input.
pub struct Multiplexer<S> {
    scheduler: MergeScheduler<S>,
    streams_merged: usize,
    skipped: Vec<Utf8PathBuf>,
}

impl<S: BagSource> Multiplexer<S> {
    /// Opens one stream per source, in order. Stream ids follow the source
    /// positions, and each stream draws its own jitter. Empty sources are
    /// skipped with a warning.
    pub fn new(sources: Vec<S>, base_time: Timestamp, jitter: &mut Jitter) -> Result<Self> {
        let mut streams = Vec::with_capacity(sources.len());
        let mut skipped = Vec::new();
        for (id, source) in sources.into_iter().enumerate() {
            match InputStream::open(id, source, base_time, jitter.sample()) {
                Ok(stream) => streams.push(stream),
                Err(MuxError::EmptyStream { path }) => {
                    warn!("Skipping {}: it contains no messages", path);
                    skipped.push(path);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Multiplexer {
            streams_merged: streams.len(),
            scheduler: MergeScheduler::new(streams),
            skipped,
        })
    }

    pub fn total(&self) -> u64 {
        self.scheduler.total()
    }

    /// Drains the merge into `sink`.
    ///
    /// `cancel` is checked between records. Whatever happens, `sink` is
    /// finalized exactly once before this returns; on failure the error of
    /// the run takes precedence over a failure to finalize.
    pub fn run<K: RecordSink>(
        mut self,
        sink: &mut K,
        progress: &mut dyn ProgressReporter,
        cancel: &AtomicBool,
    ) -> Result<MuxReport> {
        let outcome = self.pump(sink, progress, cancel);
        let written = self.scheduler.emitted();
        let finalized = sink.finalize();
        progress.finish(written);

        match (outcome, finalized) {
            (Ok(()), Ok(summary)) => Ok(MuxReport {
                summary,
                streams_merged: self.streams_merged,
                skipped: self.skipped,
                output: None,
                metadata: None,
            }),
            (Ok(()), Err(e)) => Err(e),
            (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(finalize_error)) => {
                warn!("Output could not be closed either: {}", finalize_error);
                Err(e)
            }
        }
    }

    fn pump<K: RecordSink>(
        &mut self,
        sink: &mut K,
        progress: &mut dyn ProgressReporter,
        cancel: &AtomicBool,
    ) -> Result<()> {
        let total = self.scheduler.total();
        let mut written = 0;
        loop {
            if cancel.load(Ordering::Relaxed) {
                warn!("Cancelled after {} of {} messages", written, total);
                return Err(MuxError::Cancelled { written });
            }
            let Some(record) = self.scheduler.next() else {
                return Ok(());
            };
            sink.write(&record?)?;
            written += 1;
            progress.report(written, total);
        }
    }
}

fn open_inputs(inputs: &[Utf8PathBuf]) -> Result<(Vec<McapBag>, Vec<Utf8PathBuf>)> {
    let mut bags = Vec::with_capacity(inputs.len());
    let mut skipped = Vec::new();
    for input in inputs {
        let path = io::check_mcap_input_path(input)?;
        match McapBag::open(&path) {
            Ok(bag) => {
                let (start, end) = bag.time_range();
                info!(
                    "{}: {} messages on {} topics, {} to {}",
                    path,
                    bag.len(),
                    bag.topics().len(),
                    start,
                    end
                );
                bags.push(bag);
            }
            Err(MuxError::EmptyStream { path }) => {
                warn!("Skipping {}: it contains no messages", path);
                skipped.push(path);
            }
            Err(e) => return Err(e),
        }
    }
    Ok((bags, skipped))
}

/// Merges the bags named in `options` into a new rosbag2 bag.
///
/// Every input is opened and indexed before the output is created, so an
/// unreadable input leaves nothing behind. `metadata.yaml` is only written
/// once the bag has been closed successfully.
pub fn multiplex_bags(options: &MuxOptions, cancel: &AtomicBool) -> Result<MuxReport> {
    options.validate()?;
    let base_time = options.base_time.unwrap_or_else(Timestamp::now);

    let (bags, mut skipped) = open_inputs(&options.inputs)?;
    let mut jitter = Jitter::new(options.max_jitter, options.seed);
    let multiplexer = Multiplexer::new(bags, base_time, &mut jitter)?;
    info!(
        "Merging {} bags onto {} with up to {:?} of jitter",
        multiplexer.streams_merged,
        base_time,
        jitter.max()
    );

    let output_path = io::check_mcap_output_path(options.output_or_default(base_time))?;
    let mut sink = McapSink::create(&output_path, options.compression)?;
    let mut progress = progress::for_terminal(options.progress, multiplexer.total());
    let mut report = multiplexer.run(&mut sink, progress.as_mut(), cancel)?;

    let metadata_path = rosbag::save_metadata_file(&output_path, &report.summary)?;
    skipped.append(&mut report.skipped);
    report.skipped = skipped;
    report.output = Some(output_path);
    report.metadata = Some(metadata_path);
    info!(
        "Wrote {} messages to {}",
        report.messages_written(),
        report.output.as_deref().unwrap_or(Utf8Path::new(""))
    );
    Ok(report)
}
