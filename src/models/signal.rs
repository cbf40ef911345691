use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Hold,
    Sell,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Hold => "HOLD",
            Action::Sell => "SELL",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Action::Buy),
            "HOLD" => Ok(Action::Hold),
            "SELL" => Ok(Action::Sell),
            other => Err(format!("unknown action `{}`", other)),
        }
    }
}

/// Static description of a trading rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub name: &'static str,
    pub description: &'static str,
}

/// Outcome of evaluating one rule against one feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub ticker: String,
    pub rule: String,
    pub action: Action,
    pub explanation: String,
}

impl Decision {
    pub fn new(
        ticker: impl Into<String>,
        rule: &Rule,
        action: Action,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            rule: rule.name.to_string(),
            action,
            explanation: explanation.into(),
        }
    }
}
