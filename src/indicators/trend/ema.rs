//! EMA (Exponential Moving Average) recurrence
//!
//! `EMA_t = alpha * x_t + (1 - alpha) * EMA_{t-1}`, seeded with the first observation.

/// Smoothing factor for an N-period EMA.
pub fn alpha_for_window(window: usize) -> f64 {
    2.0 / (window as f64 + 1.0)
}

/// One EMA step from a previous value.
pub fn ema_from_previous(value: f64, previous: f64, alpha: f64) -> f64 {
    alpha * value + (1.0 - alpha) * previous
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ema {
    alpha: f64,
    value: Option<f64>,
}

impl Ema {
    pub fn with_window(window: usize) -> Self {
        Self::with_alpha(alpha_for_window(window))
    }

    pub fn with_alpha(alpha: f64) -> Self {
        Self { alpha, value: None }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Current average, `None` before the first observation.
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    #[must_use]
    pub fn step(self, x: f64) -> Self {
        let value = match self.value {
            None => x,
            Some(previous) => ema_from_previous(x, previous, self.alpha),
        };
        Self {
            alpha: self.alpha,
            value: Some(value),
        }
    }

    /// Steps and returns the new average alongside the new state.
    pub fn next(self, x: f64) -> (Self, f64) {
        let next = self.step(x);
        (next, next.value.unwrap_or(x))
    }
}

/// EMA moving average of closes (the 50 and 200 bar averages).
pub fn moving_average_step(state: Ema, close: f64) -> (Ema, f64) {
    state.next(close)
}
