use serde::{Deserialize, Serialize};

use super::bar::Bar;

/// A bar together with every indicator derived for its date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    #[serde(flatten)]
    pub bar: Bar,
    pub tr: f64,
    pub atr: f64,
    pub pdi: f64,
    pub ndi: f64,
    pub adx: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub rsi: f64,
    pub pct_change: f64,
    pub moving_average_50: f64,
    pub moving_average_200: f64,
    pub money_flow_index: f64,
    pub mfi_delta: f64,
    pub swing_low: f64,
    pub coppock_curve: f64,
}

impl FeatureVector {
    pub fn symbol(&self) -> &str {
        self.bar.key()
    }

    pub fn close(&self) -> f64 {
        self.bar.close
    }
}

/// Keyed record handed to storage and dashboard collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEvent {
    pub key: String,
    pub value: FeatureVector,
}

impl From<FeatureVector> for FeatureEvent {
    fn from(value: FeatureVector) -> Self {
        Self {
            key: value.symbol().to_string(),
            value,
        }
    }
}
