use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Advisory status output for a run. Implementations only look at the
/// counters they are given.
pub trait ProgressReporter {
    fn report(&mut self, processed: u64, total: u64);
    fn finish(&mut self, processed: u64);
}

/// Picks a bar on a terminal and percentage lines otherwise, like the
/// conversion tools do.
pub fn for_terminal(enabled: bool, total: u64) -> Box<dyn ProgressReporter> {
    if !enabled {
        Box::new(NoProgress)
    } else if atty::is(atty::Stream::Stdout) {
        Box::new(BarProgress::new(total))
    } else {
        Box::new(PercentProgress::default())
    }
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&mut self, _processed: u64, _total: u64) {}
    fn finish(&mut self, _processed: u64) {}
}

pub struct BarProgress {
    pb: ProgressBar,
}

impl BarProgress {
    pub fn new(total: u64) -> BarProgress {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::with_template(
            "{msg} [{elapsed_precise}] {wide_bar} {pos}/{len} ({per_sec}, eta {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb.set_message("Merging bags");
        // Redraws while a slow chunk is being decompressed.
        pb.enable_steady_tick(Duration::from_secs(1));
        BarProgress { pb }
    }
}

impl ProgressReporter for BarProgress {
    fn report(&mut self, processed: u64, total: u64) {
        if self.pb.length() != Some(total) {
            self.pb.set_length(total);
        }
        self.pb.set_position(processed);
    }

    fn finish(&mut self, processed: u64) {
        self.pb.set_position(processed);
        self.pb.finish_with_message("Done");
    }
}

/// Logs every ten percent.
#[derive(Default)]
pub struct PercentProgress {
    last_decile: u64,
}

impl PercentProgress {
    fn decile(processed: u64, total: u64) -> u64 {
        if total == 0 {
            return 10;
        }
        (processed.min(total) * 10) / total
    }
}

impl ProgressReporter for PercentProgress {
    fn report(&mut self, processed: u64, total: u64) {
        let decile = Self::decile(processed, total);
        if decile != self.last_decile {
            info!("Reached {}0 %", decile);
            self.last_decile = decile;
        }
    }

    fn finish(&mut self, processed: u64) {
        info!("Merged {} messages", processed);
    }
}

#[test]
fn deciles_step_by_ten_percent() {
    assert_eq!(PercentProgress::decile(0, 200), 0);
    assert_eq!(PercentProgress::decile(19, 200), 0);
    assert_eq!(PercentProgress::decile(20, 200), 1);
    assert_eq!(PercentProgress::decile(199, 200), 9);
    assert_eq!(PercentProgress::decile(200, 200), 10);
    assert_eq!(PercentProgress::decile(500, 200), 10);
    assert_eq!(PercentProgress::decile(0, 0), 10);
}

#[test]
fn percent_progress_only_moves_forward_on_new_deciles() {
    let mut progress = PercentProgress::default();
    progress.report(5, 100);
    assert_eq!(progress.last_decile, 0);
    progress.report(35, 100);
    assert_eq!(progress.last_decile, 3);
    progress.report(39, 100);
    assert_eq!(progress.last_decile, 3);
}
