use indicatif::{ProgressBar, ProgressStyle};

/// Lets a frontend render download and extraction progress.
pub trait ProgressHandler: Send + Sync {
    /// Registers `bar` with the renderer and returns the bar to drive.
    fn add_progress_bar(&self, bar: ProgressBar) -> ProgressBar;

    /// Style used for bars that count bytes.
    fn default_bytes_style(&self) -> ProgressStyle {
        default_bytes_style()
    }
}

/// Hands bars back untouched; nothing is drawn because they are never
/// attached to a terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgressHandler;

impl ProgressHandler for NoProgressHandler {
    fn add_progress_bar(&self, bar: ProgressBar) -> ProgressBar {
        bar.set_draw_target(indicatif::ProgressDrawTarget::hidden());
        bar
    }
}

pub fn default_bytes_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:<30!} [{elapsed_precise}] {wide_bar} {bytes}/{total_bytes}",
    )
    .expect("progress template is valid")
    .progress_chars("━ ")
}

/// Creates a byte counting bar labelled with `prefix` and registers it.
pub(crate) fn bytes_progress_bar(
    handler: &dyn ProgressHandler,
    len: u64,
    prefix: &str,
) -> ProgressBar {
    let bar = ProgressBar::new(len).with_style(handler.default_bytes_style());
    bar.set_prefix(prefix.to_string());
    handler.add_progress_bar(bar)
}
