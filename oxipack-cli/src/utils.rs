//! Utility functions for the CLI.

use indicatif::{ProgressBar, ProgressStyle};
use oxipack_archive::{ArchiveStats, EntrySummary};
use oxipack_core::{Progress, ProgressSink};

/// Create a progress bar with standard styling.
pub fn create_progress_bar(len: u64, enable: bool) -> ProgressBar {
    if !enable {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
            .expect("progress bar template is valid")
            .progress_chars("█▓▒░ "),
    );
    pb
}

/// Progress sink that drives a progress bar.
pub struct BarSink {
    bar: ProgressBar,
}

impl BarSink {
    /// Create a sink with a bar labelled `message`.
    pub fn new(message: &'static str, enable: bool) -> Self {
        let bar = create_progress_bar(0, enable);
        bar.set_message(message);
        Self { bar }
    }

    /// Remove the bar from the terminal.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for BarSink {
    fn report(&mut self, processed: u64, total: u64) -> Progress {
        if self.bar.length() != Some(total) {
            self.bar.set_length(total);
        }
        self.bar.set_position(processed);
        Progress::Continue
    }
}

/// Print the statistics of a pack or unpack.
pub fn print_stats(verb: &str, stats: &ArchiveStats) {
    println!(
        "{} {} files, {} bytes -> {} byte artifact ({:.1}%)",
        verb,
        stats.files,
        stats.content_bytes,
        stats.artifact_bytes,
        stats.ratio() * 100.0
    );
}

/// Print entries in a formatted table.
pub fn print_entries(entries: &[EntrySummary]) {
    println!("{:>12}  Name", "Size");
    println!("{}", "-".repeat(60));

    let mut total_size = 0u64;
    let mut files = 0usize;
    for entry in entries {
        if entry.path.ends_with('/') {
            println!("{:>12}  d {}", "-", entry.path);
        } else {
            println!("{:>12}    {}", entry.size, entry.path);
            total_size += entry.size;
            files += 1;
        }
    }

    println!("{}", "-".repeat(60));
    println!("{:>12}    {} files", total_size, files);
}
