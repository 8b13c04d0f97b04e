use std::{io, sync::LazyLock};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget};
use pkgfetch_package::ProgressHandler;
use tracing_subscriber::fmt::MakeWriter;

/// Returns the multi progress bar that every bar of this process is drawn in.
pub fn global_multi_progress() -> MultiProgress {
    static GLOBAL_MP: LazyLock<MultiProgress> = LazyLock::new(|| {
        let mp = MultiProgress::new();
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(20));
        mp
    });
    GLOBAL_MP.clone()
}

/// Draws download progress in a [`MultiProgress`].
#[derive(Debug, Clone)]
pub struct MultiProgressHandler {
    multi_progress: MultiProgress,
}

impl MultiProgressHandler {
    pub fn new(multi_progress: MultiProgress) -> Self {
        Self { multi_progress }
    }
}

impl Default for MultiProgressHandler {
    fn default() -> Self {
        Self::new(global_multi_progress())
    }
}

impl ProgressHandler for MultiProgressHandler {
    fn add_progress_bar(&self, bar: ProgressBar) -> ProgressBar {
        self.multi_progress.add(bar)
    }
}

/// Writes log lines above the progress bars instead of through them.
#[derive(Clone)]
pub struct IndicatifWriter {
    progress_bars: MultiProgress,
}

impl IndicatifWriter {
    pub fn new(pb: MultiProgress) -> Self {
        Self { progress_bars: pb }
    }
}

impl io::Write for IndicatifWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.progress_bars.suspend(|| io::stderr().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.progress_bars.suspend(|| io::stderr().flush())
    }
}

impl<'a> MakeWriter<'a> for IndicatifWriter {
    type Writer = IndicatifWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
