use serde::Serialize;
use std::path::PathBuf;

/// A span on a timeline, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TimeRange {
    pub start: f64,
    pub duration: f64,
}

impl TimeRange {
    pub fn new(start: f64, duration: f64) -> Self {
        TimeRange { start, duration }
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Format as `HH:MM:SS.ss-HH:MM:SS.ss` for logs and the CLI.
    pub fn display(&self) -> String {
        format!("{}-{}", clock(self.start), clock(self.end()))
    }
}

/// A file placed on the day timeline by the builder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioComponent {
    pub path: PathBuf,
    pub playing: TimeRange,
    /// Secondary elements laid over this component, sorted by start.
    /// Always empty on the mixes themselves.
    pub mixes: Vec<AudioComponent>,
}

impl AudioComponent {
    pub fn new(path: PathBuf, playing: TimeRange) -> Self {
        AudioComponent {
            path,
            playing,
            mixes: Vec::new(),
        }
    }
}

/// Format seconds as HH:MM:SS.ss (hours may exceed 23).
pub fn clock(seconds: f64) -> String {
    let centis = (seconds.max(0.0) * 100.0).round() as u64;
    let hours = centis / 360_000;
    let minutes = centis / 6_000 % 60;
    let secs = centis % 6_000;
    format!("{:02}:{:02}:{:02}.{:02}", hours, minutes, secs / 100, secs % 100)
}
