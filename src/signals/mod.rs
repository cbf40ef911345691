//! Rule evaluation over feature vectors.

pub mod evaluator;
pub mod rules;

pub use evaluator::RuleEvaluator;
pub use rules::{find_rule, RegisteredRule, RuleFn, RULES};
