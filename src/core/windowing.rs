//! Event-time ordering of bars into daily tumbling windows.
//!
//! One [`WindowBuffer`] exists per symbol. Bars are grouped by the UTC day window
//! `[anchor + n*24h, anchor + (n+1)*24h)` they fall in; a window is released, sorted by
//! date, once the watermark passes its upper bound:
//!
//! `watermark = max_event_time - wait + (now - system time the max was observed)`
//!
//! A zero wait disables buffering: bars are released immediately unless they are older
//! than the last released bar.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::models::Bar;

const WINDOW_MILLIS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    pub wait: Duration,
    pub anchor: DateTime<Utc>,
}

impl WindowConfig {
    pub fn with_wait(wait: Duration) -> Self {
        Self {
            wait,
            anchor: epoch(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self::with_wait(Duration::ZERO)
    }
}

fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).single().unwrap_or_default()
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or_else(|_| TimeDelta::days(36_500))
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("late bar for {symbol} @ {date}: window closed through {closed_through}")]
pub struct LateBar {
    pub symbol: String,
    pub date: DateTime<Utc>,
    pub closed_through: DateTime<Utc>,
}

#[derive(Debug)]
pub struct WindowBuffer {
    config: WindowConfig,
    windows: BTreeMap<DateTime<Utc>, Vec<Bar>>,
    max_event_time: Option<(DateTime<Utc>, Instant)>,
    /// End of the last released window (buffered mode).
    closed_through: Option<DateTime<Utc>>,
    /// Date of the last released bar (pass-through mode).
    last_released: Option<DateTime<Utc>>,
}

impl WindowBuffer {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            config,
            windows: BTreeMap::new(),
            max_event_time: None,
            closed_through: None,
            last_released: None,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.config.wait.is_zero()
    }

    /// Number of bars held in open windows.
    pub fn pending(&self) -> usize {
        self.windows.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Start of the tumbling window containing `ts`.
    pub fn window_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let offset = (ts - self.config.anchor).num_milliseconds();
        let index = offset.div_euclid(WINDOW_MILLIS);
        self.config.anchor + TimeDelta::milliseconds(index * WINDOW_MILLIS)
    }

    pub fn watermark(&self, now: Instant) -> Option<DateTime<Utc>> {
        let (max_event, seen_at) = self.max_event_time?;
        let elapsed = to_delta(now.saturating_duration_since(seen_at));
        let watermark = max_event
            .checked_sub_signed(to_delta(self.config.wait))
            .and_then(|t| t.checked_add_signed(elapsed))
            .unwrap_or(max_event);
        Some(watermark)
    }

    /// Accepts a bar and returns whatever became releasable, in date order.
    pub fn push(&mut self, bar: Bar, now: Instant) -> Result<Vec<Bar>, LateBar> {
        if self.is_passthrough() {
            if let Some(last) = self.last_released {
                if bar.date < last {
                    return Err(LateBar {
                        symbol: bar.key().to_string(),
                        date: bar.date,
                        closed_through: last,
                    });
                }
            }
            self.last_released = Some(bar.date);
            return Ok(vec![bar]);
        }

        let start = self.window_start(bar.date);
        let end = start + TimeDelta::milliseconds(WINDOW_MILLIS);
        if let Some(closed) = self.closed_through {
            if end <= closed {
                return Err(LateBar {
                    symbol: bar.key().to_string(),
                    date: bar.date,
                    closed_through: closed,
                });
            }
        }

        match self.max_event_time {
            Some((max, _)) if bar.date <= max => {}
            _ => self.max_event_time = Some((bar.date, now)),
        }
        self.windows.entry(start).or_default().push(bar);

        Ok(self.advance(now))
    }

    /// Releases every window whose upper bound the watermark has reached.
    pub fn advance(&mut self, now: Instant) -> Vec<Bar> {
        let Some(watermark) = self.watermark(now) else {
            return Vec::new();
        };
        let window = TimeDelta::milliseconds(WINDOW_MILLIS);
        let ready: Vec<DateTime<Utc>> = self
            .windows
            .keys()
            .take_while(|start| **start + window <= watermark)
            .copied()
            .collect();
        self.release(ready)
    }

    /// Releases every buffered window regardless of the watermark (shutdown).
    pub fn drain(&mut self) -> Vec<Bar> {
        let all: Vec<DateTime<Utc>> = self.windows.keys().copied().collect();
        self.release(all)
    }

    fn release(&mut self, starts: Vec<DateTime<Utc>>) -> Vec<Bar> {
        let window = TimeDelta::milliseconds(WINDOW_MILLIS);
        let mut released = Vec::new();
        for start in starts {
            if let Some(mut bars) = self.windows.remove(&start) {
                bars.sort_by_key(|bar| bar.date);
                released.extend(bars);
                self.closed_through = Some(start + window);
            }
        }
        if let Some(last) = released.last() {
            self.last_released = Some(last.date);
        }
        released
    }
}
