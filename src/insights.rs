//! Correlation insights
//!
//! Labels the strongest pairs by strength and direction and derives
//! recommendations from a fixed rule table over well-known column pairs.

use crate::correlation::{CorrelationMatrix, CorrelationResult};
use serde::{Deserialize, Serialize};

/// Strength bucket of an absolute coefficient
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationStrength {
    VeryWeak,
    Weak,
    Moderate,
    VeryStrong,
}

impl CorrelationStrength {
    pub fn from_coefficient(r: f64) -> Self {
        let r = r.abs();
        if r >= 0.7 {
            Self::VeryStrong
        } else if r >= 0.4 {
            Self::Moderate
        } else if r >= 0.2 {
            Self::Weak
        } else {
            Self::VeryWeak
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::VeryStrong => "very strong",
            Self::Moderate => "moderate",
            Self::Weak => "weak",
            Self::VeryWeak => "very weak",
        }
    }

    /// Whether the pair shows a meaningful relationship
    pub fn is_significant(&self) -> bool {
        *self >= Self::Weak
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Positive,
    Negative,
}

impl Direction {
    pub fn from_coefficient(r: f64) -> Self {
        if r < 0.0 {
            Self::Negative
        } else {
            Self::Positive
        }
    }
}

/// One ranked pair with its reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairInsight {
    pub first: String,
    pub second: String,
    pub coefficient: f64,
    pub strength: CorrelationStrength,
    pub direction: Direction,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insights {
    pub pairs: Vec<PairInsight>,
    pub recommendations: Vec<Recommendation>,
}

/// When a coefficient crosses a threshold, the recommendation it yields
struct Tier {
    threshold: f64,
    title: &'static str,
    text: &'static str,
}

struct RecommendationRule {
    first: &'static str,
    second: &'static str,
    /// Negative rules fire below the negated threshold
    negative: bool,
    /// Checked in order; the first tier crossed wins
    tiers: &'static [Tier],
}

const RECOMMENDATION_RULES: &[RecommendationRule] = &[
    RecommendationRule {
        first: "total_sleep_hours",
        second: "bb_charged",
        negative: false,
        tiers: &[
            Tier {
                threshold: 0.4,
                title: "Sleep is your best recharge",
                text: "Hours of sleep track Body Battery charge closely. Prioritize sleep to start the day with more energy.",
            },
            Tier {
                threshold: 0.2,
                title: "Sleep helps your energy",
                text: "Sleep and Body Battery charge move together. Aim for a more consistent sleep schedule.",
            },
        ],
    },
    RecommendationRule {
        first: "calories",
        second: "deep_sleep_hours",
        negative: false,
        tiers: &[
            Tier {
                threshold: 0.4,
                title: "Exercise improves your sleep",
                text: "Active days are followed by more deep sleep. Training is helping you rest.",
            },
            Tier {
                threshold: 0.2,
                title: "Stay active",
                text: "Physical activity relates positively to deep sleep. Keep training.",
            },
        ],
    },
    RecommendationRule {
        first: "stress_level",
        second: "total_sleep_hours",
        negative: true,
        tiers: &[
            Tier {
                threshold: 0.4,
                title: "Stress is hurting your sleep",
                text: "More stress goes with less sleep. Relaxation techniques may help.",
            },
            Tier {
                threshold: 0.2,
                title: "Manage your stress",
                text: "Stress relates negatively to sleep. Consider meditation or breathing exercises.",
            },
        ],
    },
    RecommendationRule {
        first: "hrv",
        second: "total_sleep_hours",
        negative: false,
        tiers: &[
            Tier {
                threshold: 0.4,
                title: "Sleep drives recovery",
                text: "HRV is higher after longer nights. Your body recovers better when you rest.",
            },
            Tier {
                threshold: 0.2,
                title: "Rest to recover",
                text: "HRV improves with sleep. Prioritize rest to optimize recovery.",
            },
        ],
    },
    RecommendationRule {
        first: "bb_drained",
        second: "calories",
        negative: false,
        tiers: &[Tier {
            threshold: 0.4,
            title: "Balance training and rest",
            text: "Intense activity drains a lot of energy. Make sure you recover adequately.",
        }],
    },
];

const FALLBACK_TITLE: &str = "Keep monitoring";
const FALLBACK_TEXT: &str =
    "There are no strong correlations yet. Clearer patterns will emerge with more data.";

/// Describe the `top_pairs` strongest pairs and collect recommendations
pub fn describe(result: &CorrelationResult, top_pairs: usize) -> Insights {
    let pairs = result
        .ranked_pairs
        .iter()
        .take(top_pairs)
        .map(|pair| {
            let strength = CorrelationStrength::from_coefficient(pair.coefficient);
            let direction = Direction::from_coefficient(pair.coefficient);
            let description = if strength.is_significant() {
                match direction {
                    Direction::Positive => "when one increases, the other tends to increase",
                    Direction::Negative => "when one increases, the other tends to decrease",
                }
            } else {
                "little or no relationship detected"
            };

            PairInsight {
                first: pair.first.clone(),
                second: pair.second.clone(),
                coefficient: pair.coefficient,
                strength,
                direction,
                description: description.to_string(),
            }
        })
        .collect();

    Insights {
        pairs,
        recommendations: recommend(&result.matrix),
    }
}

/// Apply the rule table; falls back to a single "keep monitoring" entry
pub fn recommend(matrix: &CorrelationMatrix) -> Vec<Recommendation> {
    let mut recommendations: Vec<Recommendation> = RECOMMENDATION_RULES
        .iter()
        .filter_map(|rule| {
            let r = matrix.get(rule.first, rule.second)?;
            let tier = rule.tiers.iter().find(|tier| {
                if rule.negative {
                    r < -tier.threshold
                } else {
                    r > tier.threshold
                }
            })?;
            Some(Recommendation {
                title: tier.title.to_string(),
                text: format!("{} (r = {:.2})", tier.text, r),
            })
        })
        .collect();

    if recommendations.is_empty() {
        recommendations.push(Recommendation {
            title: FALLBACK_TITLE.to_string(),
            text: FALLBACK_TEXT.to_string(),
        });
    }
    recommendations
}
