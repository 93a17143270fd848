//! Window units for the submission throttle.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Time window over which the request limit applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    /// Per-second rate limiting
    #[serde(alias = "seconds")]
    Second,
    /// Per-minute rate limiting
    #[default]
    #[serde(alias = "minutes")]
    Minute,
    /// Per-hour rate limiting
    #[serde(alias = "hours")]
    Hour,
    /// Per-day rate limiting
    #[serde(alias = "days")]
    Day,
}

impl TimeWindow {
    /// Get the duration of this time window.
    pub fn duration(&self) -> Duration {
        match self {
            TimeWindow::Second => Duration::from_secs(1),
            TimeWindow::Minute => Duration::from_secs(60),
            TimeWindow::Hour => Duration::from_secs(3600),
            TimeWindow::Day => Duration::from_secs(86400),
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeWindow::Second => "second",
            TimeWindow::Minute => "minute",
            TimeWindow::Hour => "hour",
            TimeWindow::Day => "day",
        };
        f.write_str(name)
    }
}
