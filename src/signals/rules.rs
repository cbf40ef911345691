//! Trading rules. Each rule maps one feature vector to exactly one decision.

use crate::models::{Action, Decision, FeatureVector, Rule};

pub type RuleFn = fn(&FeatureVector) -> Decision;

pub const ADX_TREND_THRESHOLD: f64 = 25.0;
pub const RSI_OVERSOLD: f64 = 30.0;
pub const RSI_OVERBOUGHT: f64 = 70.0;
pub const MFI_OVERSOLD: f64 = 20.0;
pub const MFI_OVERBOUGHT: f64 = 80.0;

pub const MACD: Rule = Rule {
    name: "MACD",
    description: "Buy while the MACD line is above its signal line, sell otherwise",
};

pub const ADX: Rule = Rule {
    name: "ADX",
    description: "Follow the dominant directional index once ADX shows a trend above 25",
};

pub const RSI: Rule = Rule {
    name: "RSI",
    description: "Buy when RSI is oversold below 30, sell when overbought above 70",
};

pub const MFI: Rule = Rule {
    name: "MFI",
    description: "Trade money flow crossing back through 80 or 20 against the price move",
};

pub const SWING_LOW: Rule = Rule {
    name: "Swing Low",
    description: "Sell when the close breaks below the 20 bar swing low",
};

pub const COPPOCK: Rule = Rule {
    name: "Coppock Curve",
    description: "Buy while the Coppock Curve is non-negative, sell otherwise",
};

/// A rule and the function that evaluates it.
#[derive(Debug, Clone, Copy)]
pub struct RegisteredRule {
    pub rule: Rule,
    pub evaluate: RuleFn,
}

/// Every rule, in evaluation order.
pub static RULES: [RegisteredRule; 6] = [
    RegisteredRule { rule: MACD, evaluate: macd_rule },
    RegisteredRule { rule: ADX, evaluate: adx_rule },
    RegisteredRule { rule: RSI, evaluate: rsi_rule },
    RegisteredRule { rule: MFI, evaluate: mfi_rule },
    RegisteredRule { rule: SWING_LOW, evaluate: swing_low_rule },
    RegisteredRule { rule: COPPOCK, evaluate: coppock_rule },
];

pub fn find_rule(name: &str) -> Option<&'static RegisteredRule> {
    RULES
        .iter()
        .find(|registered| registered.rule.name.eq_ignore_ascii_case(name.trim()))
}

pub fn macd_rule(features: &FeatureVector) -> Decision {
    let (action, relation) = if features.macd > features.macd_signal {
        (Action::Buy, "above")
    } else {
        (Action::Sell, "not above")
    };
    Decision::new(
        features.symbol(),
        &MACD,
        action,
        format!(
            "MACD {:.4} is {} its signal line {:.4}",
            features.macd, relation, features.macd_signal
        ),
    )
}

pub fn adx_rule(features: &FeatureVector) -> Decision {
    let (action, explanation) = if features.adx <= ADX_TREND_THRESHOLD {
        (
            Action::Hold,
            format!("ADX {:.2} shows no trend (<= {})", features.adx, ADX_TREND_THRESHOLD),
        )
    } else if features.pdi > features.ndi {
        (
            Action::Buy,
            format!(
                "ADX {:.2} trending with +DI {:.2} over -DI {:.2}",
                features.adx, features.pdi, features.ndi
            ),
        )
    } else {
        (
            Action::Sell,
            format!(
                "ADX {:.2} trending with -DI {:.2} at or over +DI {:.2}",
                features.adx, features.ndi, features.pdi
            ),
        )
    };
    Decision::new(features.symbol(), &ADX, action, explanation)
}

pub fn rsi_rule(features: &FeatureVector) -> Decision {
    let (action, explanation) = if features.rsi < RSI_OVERSOLD {
        (Action::Buy, format!("RSI {:.2} is oversold (< {})", features.rsi, RSI_OVERSOLD))
    } else if features.rsi > RSI_OVERBOUGHT {
        (
            Action::Sell,
            format!("RSI {:.2} is overbought (> {})", features.rsi, RSI_OVERBOUGHT),
        )
    } else {
        (Action::Hold, format!("RSI {:.2} is neutral", features.rsi))
    };
    Decision::new(features.symbol(), &RSI, action, explanation)
}

/// `mfi - mfi_delta` is the previous bar's MFI.
pub fn mfi_rule(features: &FeatureVector) -> Decision {
    let mfi = features.money_flow_index;
    let previous = mfi - features.mfi_delta;
    let (action, explanation) =
        if previous > MFI_OVERBOUGHT && mfi < MFI_OVERBOUGHT && features.pct_change > 0.0 {
            (
                Action::Sell,
                format!(
                    "MFI crossed down through {} ({:.2} -> {:.2}) while price rose",
                    MFI_OVERBOUGHT, previous, mfi
                ),
            )
        } else if mfi > MFI_OVERSOLD && previous < MFI_OVERSOLD && features.pct_change < 0.0 {
            (
                Action::Buy,
                format!(
                    "MFI crossed up through {} ({:.2} -> {:.2}) while price fell",
                    MFI_OVERSOLD, previous, mfi
                ),
            )
        } else {
            (Action::Hold, format!("MFI {:.2} shows no divergence", mfi))
        };
    Decision::new(features.symbol(), &MFI, action, explanation)
}

pub fn swing_low_rule(features: &FeatureVector) -> Decision {
    let (action, explanation) = if features.close() < features.swing_low {
        (
            Action::Sell,
            format!(
                "Close {:.2} broke below swing low {:.2}",
                features.close(),
                features.swing_low
            ),
        )
    } else {
        (
            Action::Hold,
            format!(
                "Close {:.2} holds above swing low {:.2}",
                features.close(),
                features.swing_low
            ),
        )
    };
    Decision::new(features.symbol(), &SWING_LOW, action, explanation)
}

pub fn coppock_rule(features: &FeatureVector) -> Decision {
    let action = if features.coppock_curve >= 0.0 {
        Action::Buy
    } else {
        Action::Sell
    };
    Decision::new(
        features.symbol(),
        &COPPOCK,
        action,
        format!("Coppock Curve at {:.4}", features.coppock_curve),
    )
}
