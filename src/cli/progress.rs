//! Progress bar and summary reporting for CLI installs.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::{InstallProgress, InstallStats, format_bytes, format_duration};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Creates the bar counting stored assets.
pub fn make_install_bar(assets: usize) -> ProgressBar {
    let bar = ProgressBar::new(assets as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} - {msg}")
            .expect("progress template is valid")
            .progress_chars("━━╌"),
    );
    bar
}

/// Install observer drawing one bar across all assets.
pub struct BarProgress {
    multi: MultiProgress,
    bar: ProgressBar,
}

impl BarProgress {
    /// Creates the observer; the bar length is set on install start.
    pub fn new() -> Self {
        let multi = MultiProgress::new();
        let bar = multi.add(make_install_bar(0));
        Self { multi, bar }
    }

    /// Clears the bar from the terminal.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
        self.multi.clear().ok();
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallProgress for BarProgress {
    fn on_install_start(&self, cache_name: &str, assets: usize) {
        self.bar.set_length(assets as u64);
        self.bar.set_message(format!("pre-caching into {cache_name}"));
    }

    fn on_asset_start(&self, url: &str) {
        self.bar.set_message(url.to_string());
    }

    fn on_asset_fetched(&self, url: &str, bytes: u64) {
        self.bar.inc(1);
        let _ = self.multi.println(format!("  {url} - {}", format_bytes(bytes)));
    }

    fn on_asset_error(&self, url: &str, error: &str) {
        self.bar.abandon_with_message(format!("failed: {url}"));
        let _ = self.multi.println(format!("  {url} - ERROR: {error}"));
    }
}

/// Prints a summary of a successful install.
pub fn print_summary(stats: &InstallStats) {
    println!("\n{SEPARATOR}");
    println!("Install Summary");
    println!("{SEPARATOR}");
    println!("  Cache:             {}", stats.cache_name);
    println!("  Assets cached:     {}", stats.assets_cached);
    println!("  Total size:        {}", format_bytes(stats.total_bytes));
    println!("  Total time:        {}", format_duration(stats.elapsed));
    println!(
        "  Average speed:     {}/s",
        format_bytes(stats.average_speed())
    );
    println!("{SEPARATOR}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_bar_creation() {
        let bar = make_install_bar(2);
        assert_eq!(bar.length(), Some(2));
    }

    #[test]
    fn bar_progress_counts_assets() {
        let progress = BarProgress::new();
        progress.on_install_start("mkr1010-cache", 2);
        progress.on_asset_fetched("http://device.local/index.html", 14);
        assert_eq!(progress.bar.length(), Some(2));
        assert_eq!(progress.bar.position(), 1);
        progress.finish();
    }
}
