// Progress reporting for a running batch

use indicatif::{ProgressBar, ProgressStyle};

const TEMPLATE: &str = " {prefix} | {wide_bar} | {pos}/{len} | {elapsed_precise} | ETA {eta}";

/// A bar counting successful items on stderr, hidden when `quiet`
pub fn total_bar(len: u64, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new(len);
    let style =
        ProgressStyle::with_template(TEMPLATE).unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar.set_prefix("total");
    bar
}

/// Advance the bar for an item that finished successfully
pub fn record<T, E>(bar: &ProgressBar, result: &Result<T, E>) {
    if result.is_ok() {
        bar.inc(1);
    }
}
