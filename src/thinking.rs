use indicatif::{ProgressBar, ProgressStyle};
use colored::*;
use std::time::Duration;

/// Transient activity indicator shown while a request is in flight. It is
/// never part of the stored conversation; finishing clears exactly this
/// line and nothing above it.
pub struct ThinkingIndicator {
    spinner: ProgressBar,
}

impl ThinkingIndicator {
    pub fn new(message: &str) -> Self {
        let spinner = ProgressBar::new_spinner();

        let style = ProgressStyle::with_template("{spinner:.bright_cyan} {msg}")
            .unwrap()
            .tick_strings(&[
                "⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"
            ]);

        spinner.set_style(style);
        spinner.set_message(message.dimmed().to_string());

        // Tick every 80ms for smooth animation
        spinner.enable_steady_tick(Duration::from_millis(80));

        Self { spinner }
    }

    pub fn update_message(&self, message: &str) {
        self.spinner.set_message(message.dimmed().to_string());
    }

    pub fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl Drop for ThinkingIndicator {
    fn drop(&mut self) {
        self.spinner.finish_and_clear();
    }
}

pub fn show_thinking(message: &str) -> ThinkingIndicator {
    ThinkingIndicator::new(message)
}
