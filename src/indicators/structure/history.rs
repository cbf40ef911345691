use std::collections::VecDeque;

/// Longest lookback any indicator needs (14 months of 22 trading days).
pub const MAX_LOOKBACK: usize = 308;

/// Bounded trailing window of previous closes, oldest first.
///
/// The current bar's close is pushed only after every indicator has read the window.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseHistory {
    closes: VecDeque<f64>,
    capacity: usize,
}

impl CloseHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            closes: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    /// Close `n` bars before the current one, if the window reaches that far.
    pub fn ago(&self, n: usize) -> Option<f64> {
        if n == 0 || n > self.closes.len() {
            return None;
        }
        self.closes.get(self.closes.len() - n).copied()
    }

    /// The `n` most recent previous closes, newest last.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = f64> + '_ {
        let skip = self.closes.len().saturating_sub(n);
        self.closes.iter().skip(skip).copied()
    }

    #[must_use]
    pub fn push(mut self, close: f64) -> Self {
        if self.capacity == 0 {
            return self;
        }
        if self.closes.len() == self.capacity {
            self.closes.pop_front();
        }
        self.closes.push_back(close);
        self
    }
}

impl Default for CloseHistory {
    fn default() -> Self {
        Self::with_capacity(MAX_LOOKBACK)
    }
}
