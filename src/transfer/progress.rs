// 进度显示
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;

/// Byte progress over one upload batch. Hidden unless asked for, so library
/// callers and tests see nothing on the terminal.
pub struct ProgressTracker {
    progress_bar: ProgressBar,
    transferred_bytes: u64,
    start_time: Instant,
}

impl ProgressTracker {
    pub fn new(total_size: u64, description: &str, visible: bool) -> Self {
        let progress_bar = if visible {
            ProgressBar::new(total_size)
        } else {
            ProgressBar::hidden()
        };
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        progress_bar.set_style(style);
        progress_bar.set_message(description.to_string());

        Self {
            progress_bar,
            transferred_bytes: 0,
            start_time: Instant::now(),
        }
    }

    pub fn add_bytes(&mut self, bytes: u64) {
        self.transferred_bytes += bytes;
        self.progress_bar.set_position(self.transferred_bytes);
    }

    pub fn transferred(&self) -> u64 {
        self.transferred_bytes
    }

    pub fn finish(&self, copied: usize, requested: usize) {
        let elapsed = self.start_time.elapsed().as_secs();
        let total = self.transferred();
        let avg_speed = if elapsed > 0 { total / elapsed } else { total };

        self.progress_bar.finish_with_message(format!(
            "{}/{} files uploaded (avg speed: {})",
            copied,
            requested,
            format_speed(avg_speed)
        ));
    }
}

// 格式化速度显示
fn format_speed(bytes_per_sec: u64) -> String {
    if bytes_per_sec < 1024 {
        format!("{} B/s", bytes_per_sec)
    } else if bytes_per_sec < 1024 * 1024 {
        format!("{:.2} KB/s", bytes_per_sec as f64 / 1024.0)
    } else if bytes_per_sec < 1024 * 1024 * 1024 {
        format!("{:.2} MB/s", bytes_per_sec as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB/s", bytes_per_sec as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
