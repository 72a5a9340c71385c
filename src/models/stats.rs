//! Aggregate run statistics

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Counters maintained by the runner while a tree executes
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// Number of nodes carrying an action
    pub total: usize,
    pub pass: usize,
    pub fail: usize,
    pub skip: usize,
    pub ignore: usize,
    pub todo: usize,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// `end - start`, once both are known
    pub fn elapsed(&self) -> Option<Duration> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    pub fn elapsed_ms(&self) -> i64 {
        self.elapsed().map(|d| d.num_milliseconds()).unwrap_or(0)
    }

    /// Tests that reached a terminal state of any kind
    pub fn completed(&self) -> usize {
        self.pass + self.fail + self.skip + self.todo
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.pass as f64 / self.total as f64) * 100.0
        }
    }

    pub fn is_all_passed(&self) -> bool {
        self.fail == 0
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Total: {} | Pass: {} | Fail: {} | Skip: {} | Ignore: {} | Todo: {}",
            self.total, self.pass, self.fail, self.skip, self.ignore, self.todo
        )?;
        write!(
            f,
            "Pass Rate: {:.1}% | Duration: {}ms",
            self.pass_rate(),
            self.elapsed_ms()
        )
    }
}
