//! Runs the rule registry over feature vectors.

use crate::models::{Decision, FeatureVector};
use crate::signals::rules::{RegisteredRule, RULES};

#[derive(Debug, Clone)]
pub struct RuleEvaluator {
    rules: Vec<&'static RegisteredRule>,
}

impl RuleEvaluator {
    pub fn new() -> Self {
        Self {
            rules: RULES.iter().collect(),
        }
    }

    /// Evaluates only `rules`, in the given order.
    pub fn with_rules(rules: impl IntoIterator<Item = &'static RegisteredRule>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
        }
    }

    pub fn rules(&self) -> impl Iterator<Item = &'static RegisteredRule> + '_ {
        self.rules.iter().copied()
    }

    /// One decision per registered rule, in registry order.
    pub fn evaluate(&self, features: &FeatureVector) -> Vec<Decision> {
        self.rules
            .iter()
            .map(|registered| (registered.evaluate)(features))
            .collect()
    }
}

impl Default for RuleEvaluator {
    fn default() -> Self {
        Self::new()
    }
}
