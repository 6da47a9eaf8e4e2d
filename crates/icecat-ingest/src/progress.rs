//! Coarse progress lines for long parses

use tracing::info;

/// Emits a progress line every `interval` processed rows and once at the end
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    total: u64,
    interval: u64,
    last_reported: Option<u64>,
}

impl ProgressReporter {
    pub fn new(total: u64, interval: u64) -> Self {
        Self {
            total,
            interval: interval.max(1),
            last_reported: None,
        }
    }

    /// Initial 0% line
    pub fn start(&mut self) {
        self.report(0);
    }

    /// Call after each processed row
    pub fn tick(&mut self, processed: u64) {
        if processed % self.interval == 0 {
            self.report(processed);
        }
    }

    /// Final line, unless `processed` was just reported
    pub fn finish(&mut self, processed: u64) {
        if self.last_reported != Some(processed) {
            self.report(processed);
        }
    }

    fn report(&mut self, processed: u64) {
        info!("{}", progress_line(processed, self.total));
        self.last_reported = Some(processed);
    }
}

/// `Processed  42.0%  |  1,234 rows`
pub fn progress_line(processed: u64, total: u64) -> String {
    let pct = if total == 0 {
        0.0
    } else {
        processed as f64 / total as f64 * 100.0
    };
    format!("Processed {pct:5.1}%  |  {} rows", group_thousands(processed))
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
