// Mapping of expression distributions to display labels and the derived score
//
// The "mental ability" score is a display-only heuristic. Its arithmetic is kept
// stable; it carries no psychological meaning.

use crate::models::{Expression, ExpressionDistribution};

/// Picks the expression with the strictly highest probability.
/// Ties keep the earlier expression in enumeration order.
pub fn dominant_expression(expressions: &ExpressionDistribution) -> Expression {
    let mut iter = expressions.iter();
    let (mut best, mut best_p) = iter
        .next()
        .unwrap_or((Expression::ALL[0], 0.0));
    for (expression, p) in iter {
        if p > best_p {
            best = expression;
            best_p = p;
        }
    }
    best
}

/// Maps an expression key to its display string
pub fn expression_label(key: &str) -> &'static str {
    match key {
        "angry" => "Angry",
        "disgusted" => "Disgusted",
        "fearful" => "Fearful",
        "happy" => "Happy",
        "neutral" => "Neutral",
        "sad" => "Sad",
        "surprised" => "Surprised",
        _ => "Unknown",
    }
}

/// Neutral probability divided by the sum of all probabilities.
/// Returns 0 for an all-zero distribution.
pub fn mental_ability_score(expressions: &ExpressionDistribution) -> f32 {
    let total = expressions.total();
    if total <= 0.0 {
        return 0.0;
    }
    expressions.get(Expression::Neutral) / total
}

/// Five-level interpretation of the derived score
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MentalAbility {
    NoFace,
    VeryLow,
    Low,
    Average,
    High,
    VeryHigh,
}

impl MentalAbility {
    pub fn from_score(score: f32) -> Self {
        if score == 0.0 || score.is_nan() {
            MentalAbility::NoFace
        } else if score < 0.2 {
            MentalAbility::VeryLow
        } else if score < 0.4 {
            MentalAbility::Low
        } else if score < 0.6 {
            MentalAbility::Average
        } else if score < 0.8 {
            MentalAbility::High
        } else {
            MentalAbility::VeryHigh
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MentalAbility::NoFace => "No face detected",
            MentalAbility::VeryLow => "Very low mental ability",
            MentalAbility::Low => "Low mental ability",
            MentalAbility::Average => "Average mental ability",
            MentalAbility::High => "High mental ability",
            MentalAbility::VeryHigh => "Very high mental ability",
        }
    }
}

impl std::fmt::Display for MentalAbility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
