//! Scores a trade idea on a 0..1 scale from its own geometry plus the
//! cross-venue validation verdict. The score only gates presentation,
//! never generation.

use crate::consensus::PriceValidation;
use crate::models::TradeIdea;

const WEIGHT_RISK_REWARD: f64 = 0.30;
const WEIGHT_CONSENSUS: f64 = 0.25;
const WEIGHT_VOLATILITY: f64 = 0.20;
const WEIGHT_TARGETS: f64 = 0.15;
const WEIGHT_BASE: f64 = 0.10;

const HIGH_THRESHOLD: f64 = 0.75;
const MEDIUM_THRESHOLD: f64 = 0.60;
const LOW_THRESHOLD: f64 = 0.45;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityLevel {
    High,
    Medium,
    Low,
    Weak,
}

impl QualityLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= HIGH_THRESHOLD {
            Self::High
        } else if score >= MEDIUM_THRESHOLD {
            Self::Medium
        } else if score >= LOW_THRESHOLD {
            Self::Low
        } else {
            Self::Weak
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Weak => "WEAK",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::High => "🔥",
            Self::Medium => "✅",
            Self::Low => "⚠️",
            Self::Weak => "❔",
        }
    }
}

#[derive(Debug, Clone)]
pub struct QualityRating {
    pub score: f64,
    pub level: QualityLevel,
    /// High-conviction ideas are reserved for paying subscribers
    pub premium: bool,
}

/// Weighted blend of risk/reward, stop placement, target laddering and
/// venue agreement. A missing consensus contributes a neutral factor.
pub fn rate_idea(idea: &TradeIdea, validation: Option<&PriceValidation>) -> QualityRating {
    let score = WEIGHT_BASE
        + WEIGHT_RISK_REWARD * risk_reward_factor(idea)
        + WEIGHT_VOLATILITY * stop_placement_factor(idea)
        + WEIGHT_TARGETS * target_factor(idea)
        + WEIGHT_CONSENSUS * consensus_factor(validation);

    let level = QualityLevel::from_score(score);
    QualityRating {
        score,
        level,
        premium: level == QualityLevel::High,
    }
}

fn risk_reward_factor(idea: &TradeIdea) -> f64 {
    let rr = idea.risk_reward();
    if rr >= 3.0 {
        1.0
    } else if rr >= 2.0 {
        0.8
    } else if rr >= 1.5 {
        0.6
    } else if rr >= 1.0 {
        0.4
    } else {
        0.1
    }
}

/// Stops inside roughly 1-3% of entry are workable; hair-trigger or
/// barn-door stops both get marked down
fn stop_placement_factor(idea: &TradeIdea) -> f64 {
    if idea.entry <= 0.0 {
        return 0.0;
    }
    let stop_pct = idea.stop_distance() * 100.0;
    if (1.0..=3.0).contains(&stop_pct) {
        1.0
    } else if (0.5..=5.0).contains(&stop_pct) {
        0.6
    } else {
        0.2
    }
}

fn target_factor(idea: &TradeIdea) -> f64 {
    match idea.targets.len() {
        0 => 0.0,
        1 => 0.5,
        2 => 0.7,
        _ => 1.0,
    }
}

fn consensus_factor(validation: Option<&PriceValidation>) -> f64 {
    match validation {
        Some(v) if v.sources == 0 => 0.5,
        Some(v) if !v.valid => 0.0,
        Some(v) if v.sources >= 2 => 1.0,
        Some(_) => 0.7,
        None => 0.5,
    }
}
