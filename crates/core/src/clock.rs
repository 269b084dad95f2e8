//! Wall-clock access, injectable so cache staleness and the monthly budget
//! reset can be exercised deterministically.

use std::sync::Mutex;

use chrono::{DateTime, Local, Utc};

pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch.
    fn now(&self) -> f64;

    /// Local calendar month as `"YYYY-MM"`.
    fn current_month(&self) -> String;

    fn now_rfc3339(&self) -> String {
        let secs = self.now();
        DateTime::<Utc>::from_timestamp(secs.trunc() as i64, (secs.fract() * 1e9) as u32)
            .unwrap_or_default()
            .to_rfc3339()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        Utc::now().timestamp_micros() as f64 / 1_000_000.0
    }

    fn current_month(&self) -> String {
        Local::now().format("%Y-%m").to_string()
    }
}

/// Hand-driven clock for tests. The month is set independently of `now`.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<(f64, String)>,
}

impl ManualClock {
    pub fn new(now: f64, month: &str) -> Self {
        Self {
            state: Mutex::new((now, month.to_string())),
        }
    }

    pub fn advance(&self, secs: f64) {
        if let Ok(mut state) = self.state.lock() {
            state.0 += secs;
        }
    }

    pub fn set_month(&self, month: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.1 = month.to_string();
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.state.lock().map(|s| s.0).unwrap_or_default()
    }

    fn current_month(&self) -> String {
        self.state
            .lock()
            .map(|s| s.1.clone())
            .unwrap_or_default()
    }
}
