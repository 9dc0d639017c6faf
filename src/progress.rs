//! Progress reporting for the download chunk loop.
//!
//! [`TerminalProgress`] draws a 50-step bar for the command line and
//! [`PercentProgress`] feeds a 0-100 percentage to a host progress widget.
use indicatif::{ProgressBar, ProgressStyle};

pub const BAR_STEPS: u64 = 50;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub trait ProgressObserver {
    fn begin(&mut self, label: &str, total_bytes: u64);

    /// Called after every chunk. `total_bytes` is 0 when the server did not say.
    fn advance(&mut self, downloaded_bytes: u64, total_bytes: u64);

    fn finish(&mut self);
}

/// Completed steps out of `steps`, never more than `steps`; 0 while the total is unknown.
pub fn scaled(downloaded_bytes: u64, total_bytes: u64, steps: u64) -> u64 {
    if total_bytes == 0 {
        return 0;
    }
    let scaled = u128::from(downloaded_bytes) * u128::from(steps) / u128::from(total_bytes);
    scaled.min(u128::from(steps)) as u64
}

pub fn format_mb(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / BYTES_PER_MB)
}

#[derive(Default)]
pub struct TerminalProgress {
    bar: Option<ProgressBar>,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressObserver for TerminalProgress {
    fn begin(&mut self, label: &str, _total_bytes: u64) {
        let bar = ProgressBar::new(BAR_STEPS);
        bar.set_style(
            ProgressStyle::with_template("{prefix} [{bar:50}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_prefix(label.to_owned());
        self.bar = Some(bar);
    }

    fn advance(&mut self, downloaded_bytes: u64, total_bytes: u64) {
        let Some(bar) = &self.bar else {
            return;
        };
        bar.set_position(scaled(downloaded_bytes, total_bytes, BAR_STEPS));
        if total_bytes == 0 {
            bar.set_message(format!("{} MB", format_mb(downloaded_bytes)));
        } else {
            bar.set_message(format!(
                "{}/{} MB",
                format_mb(downloaded_bytes),
                format_mb(total_bytes)
            ));
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish();
        }
    }
}

/// Forwards `(label, percent)` to a callback whenever the percentage changes.
pub struct PercentProgress<F: FnMut(&str, u8)> {
    report: F,
    label: String,
    last: Option<u8>,
}

impl<F: FnMut(&str, u8)> PercentProgress<F> {
    pub fn new(report: F) -> Self {
        Self {
            report,
            label: String::new(),
            last: None,
        }
    }
}

impl<F: FnMut(&str, u8)> ProgressObserver for PercentProgress<F> {
    fn begin(&mut self, label: &str, _total_bytes: u64) {
        self.label = label.to_owned();
        self.last = None;
    }

    fn advance(&mut self, downloaded_bytes: u64, total_bytes: u64) {
        let percent = scaled(downloaded_bytes, total_bytes, 100) as u8;
        if self.last != Some(percent) {
            self.last = Some(percent);
            (self.report)(&self.label, percent);
        }
    }

    fn finish(&mut self) {
        if self.last != Some(100) {
            self.last = Some(100);
            (self.report)(&self.label, 100);
        }
    }
}

/// Discards all progress.
pub struct Silent;

impl ProgressObserver for Silent {
    fn begin(&mut self, _label: &str, _total_bytes: u64) {}
    fn advance(&mut self, _downloaded_bytes: u64, _total_bytes: u64) {}
    fn finish(&mut self) {}
}
