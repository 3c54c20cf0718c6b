use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const TEMPLATE: &str = "{spinner} {msg} [{bar:40.cyan/blue}] {pos}/{len} files ({elapsed})";

/// File counter for a pipeline run. The total grows as paths are discovered.
pub struct Bar {
    bar: ProgressBar,
}

impl Bar {
    pub fn new(description: &str) -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar().template(TEMPLATE).unwrap_or_else(|_| ProgressStyle::default_bar()).progress_chars("●○ ");

        bar.set_style(style);
        bar.set_message(description.to_owned());

        Self { bar }
    }

    /// A bar that never draws, for non-interactive runs and tests.
    ///
    /// Starts from a zero length like [`Bar::new`]; `ProgressBar::hidden`
    /// has no length at all and would ignore [`Bar::add_total`].
    pub fn hidden() -> Self {
        Self { bar: ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::hidden()) }
    }

    /// Counts files that made it into the queue.
    pub fn add_total(&self, delta: u64) {
        self.bar.inc_length(delta);
    }

    /// Counts a finished file, uploaded or failed.
    pub fn add(&self, delta: u64) {
        self.bar.inc(delta);
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn total(&self) -> u64 {
        self.bar.length().unwrap_or(0)
    }

    pub fn finish(&self) {
        self.bar.finish_with_message("Done");
    }
}

impl Drop for Bar {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish();
        }
    }
}
