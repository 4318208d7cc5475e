//! Progress presentation
//!
//! The job runner reports per-task completion through [`ProgressPresenter`].
//! The terminal implementation draws one indicatif bar per task; quiet mode
//! swaps in [`NoopPresenter`] and nothing else in the pipeline changes.

use crate::ffprobe::MediaDuration;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::time::Duration;

pub mod progress_style {
    /// indicatif needs three characters: filled, current, empty.
    pub const PROGRESS_CHARS: &str = "█▓░";

    pub const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

    pub const FILE_TEMPLATE: &str =
        "{spinner:.green} {prefix:.cyan.bold} ▕{bar:35.green/black}▏ {percent:>3}% • ⏱️ {elapsed_precise} (ETA: {eta})";

    /// Bar length; positions are per-mille of the task.
    pub const BAR_LENGTH: u64 = 1000;

    pub const PREFIX_MAX_CHARS: usize = 32;
}

/// Share of a task that is done, always within `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ProgressFraction(f64);

impl ProgressFraction {
    pub const ZERO: ProgressFraction = ProgressFraction(0.0);
    pub const COMPLETE: ProgressFraction = ProgressFraction(1.0);

    /// Clamps into range; NaN becomes zero.
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Self::ZERO;
        }
        Self(value.clamp(0.0, 1.0))
    }

    /// `elapsed / duration`, or `None` when the duration is unknown.
    pub fn from_elapsed(elapsed: f64, duration: MediaDuration) -> Option<Self> {
        duration.seconds().map(|total| Self::new(elapsed / total))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

pub trait ProgressPresenter {
    /// Show `fraction` for `task_id`.
    fn update(&mut self, task_id: &str, fraction: ProgressFraction);

    /// Close out the indicator for `task_id`. Called once per task, whether
    /// or not any update was made and whether or not the task succeeded.
    fn finalize(&mut self, task_id: &str, success: bool);

    /// Tasks whose indicator is currently shown.
    fn open_indicators(&self) -> usize {
        0
    }
}

/// Quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPresenter;

impl ProgressPresenter for NoopPresenter {
    fn update(&mut self, _task_id: &str, _fraction: ProgressFraction) {}

    fn finalize(&mut self, _task_id: &str, _success: bool) {}
}

/// One terminal progress bar per task, created on the first update.
pub struct BarPresenter {
    bars: HashMap<String, ProgressBar>,
    draw_to_terminal: bool,
}

impl BarPresenter {
    pub fn new() -> Self {
        Self {
            bars: HashMap::new(),
            draw_to_terminal: true,
        }
    }

    /// Bars that keep their state but never draw.
    pub fn hidden() -> Self {
        Self {
            bars: HashMap::new(),
            draw_to_terminal: false,
        }
    }

    /// Current bar position (per-mille) for an open task.
    pub fn position(&self, task_id: &str) -> Option<u64> {
        self.bars.get(task_id).map(|pb| pb.position())
    }

    pub fn has_open_bar(&self, task_id: &str) -> bool {
        self.bars.contains_key(task_id)
    }

    /// Handle on a task's bar; it stays readable after `finalize`.
    #[cfg(test)]
    fn bar(&self, task_id: &str) -> Option<ProgressBar> {
        self.bars.get(task_id).cloned()
    }

    fn create_bar(&self, task_id: &str) -> ProgressBar {
        let pb = ProgressBar::new(progress_style::BAR_LENGTH);
        if !self.draw_to_terminal {
            pb.set_draw_target(ProgressDrawTarget::hidden());
            return pb;
        }

        let style = ProgressStyle::default_bar()
            .template(progress_style::FILE_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars(progress_style::PROGRESS_CHARS)
            .tick_chars(progress_style::SPINNER_CHARS);
        pb.set_style(style);
        pb.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
        pb.set_prefix(truncate_prefix(task_id));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}

impl Default for BarPresenter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressPresenter for BarPresenter {
    fn update(&mut self, task_id: &str, fraction: ProgressFraction) {
        if !self.bars.contains_key(task_id) {
            let pb = self.create_bar(task_id);
            self.bars.insert(task_id.to_string(), pb);
        }
        if let Some(pb) = self.bars.get(task_id) {
            pb.set_position((fraction.value() * progress_style::BAR_LENGTH as f64).round() as u64);
        }
    }

    fn finalize(&mut self, task_id: &str, success: bool) {
        // No bar means the duration was unknown; nothing to close.
        let Some(pb) = self.bars.remove(task_id) else {
            return;
        };
        if success {
            pb.set_position(progress_style::BAR_LENGTH);
            pb.finish();
        } else {
            pb.abandon();
        }
    }

    fn open_indicators(&self) -> usize {
        self.bars.len()
    }
}

/// Presenter for the configured verbosity.
pub fn presenter_for(quiet: bool) -> Box<dyn ProgressPresenter> {
    if quiet {
        Box::new(NoopPresenter)
    } else {
        Box::new(BarPresenter::new())
    }
}

fn truncate_prefix(task_id: &str) -> String {
    if task_id.chars().count() <= progress_style::PREFIX_MAX_CHARS {
        return task_id.to_string();
    }
    let head: String = task_id
        .chars()
        .take(progress_style::PREFIX_MAX_CHARS - 1)
        .collect();
    format!("{}…", head)
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Presenter that records every call, for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingPresenter {
    pub events: Vec<PresenterEvent>,
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PresenterEvent {
    Update(String, f64),
    Finalize(String, bool),
}

#[cfg(test)]
impl RecordingPresenter {
    pub fn fractions(&self) -> Vec<f64> {
        self.events
            .iter()
            .filter_map(|e| match e {
                PresenterEvent::Update(_, f) => Some(*f),
                PresenterEvent::Finalize(..) => None,
            })
            .collect()
    }

    pub fn finalizations(&self) -> Vec<(String, bool)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                PresenterEvent::Finalize(id, ok) => Some((id.clone(), *ok)),
                PresenterEvent::Update(..) => None,
            })
            .collect()
    }
}

#[cfg(test)]
impl ProgressPresenter for RecordingPresenter {
    fn update(&mut self, task_id: &str, fraction: ProgressFraction) {
        self.events
            .push(PresenterEvent::Update(task_id.to_string(), fraction.value()));
    }

    fn finalize(&mut self, task_id: &str, success: bool) {
        self.events
            .push(PresenterEvent::Finalize(task_id.to_string(), success));
    }
}
