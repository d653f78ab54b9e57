//! Risk scoring.
//!
//! Weighted blend of three sub-scores in 0..=100:
//! visibility (40%), finding age (30%), asset value (30%).

use chrono::{DateTime, Utc};
use tracing::debug;

use sentinyl_model::Severity;

const WEIGHT_VISIBILITY: f64 = 0.40;
const WEIGHT_AGE: f64 = 0.30;
const WEIGHT_ASSET_VALUE: f64 = 0.30;

const THRESHOLD_CRITICAL: i32 = 80;
const THRESHOLD_HIGH: i32 = 60;
const THRESHOLD_MEDIUM: i32 = 40;

/// Inputs to a risk assessment. Labels outside the known sets score as
/// `unknown` (60).
#[derive(Debug, Clone)]
pub struct RiskInputs<'a> {
    pub visibility: &'a str,
    pub discovered_at: DateTime<Utc>,
    pub asset_value: &'a str,
}

#[derive(Debug, Clone)]
pub struct RiskFactors {
    pub visibility: f64,
    pub age: f64,
    pub asset_value: f64,
}

#[derive(Debug, Clone)]
pub struct RiskAssessment {
    pub score: i32,
    pub severity: Severity,
    pub factors: RiskFactors,
    pub reasoning: String,
}

/// Deterministic scorer: same inputs and clock, same assessment.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskScorer;

impl RiskScorer {
    pub fn calculate(&self, inputs: &RiskInputs<'_>, now: DateTime<Utc>) -> RiskAssessment {
        let visibility = score_visibility(inputs.visibility);
        let age = score_age(inputs.discovered_at, now);
        let asset_value = score_asset_value(inputs.asset_value);

        let weighted = visibility * WEIGHT_VISIBILITY
            + age * WEIGHT_AGE
            + asset_value * WEIGHT_ASSET_VALUE;
        let score = weighted as i32;
        let severity = severity_for(score);

        debug!("Risk assessment: {}/100 ({})", score, severity);

        RiskAssessment {
            score,
            severity,
            reasoning: build_reasoning(score, severity, inputs, now),
            factors: RiskFactors {
                visibility,
                age,
                asset_value,
            },
        }
    }
}

fn score_visibility(visibility: &str) -> f64 {
    match visibility.to_lowercase().as_str() {
        "public" => 100.0,
        "private" => 50.0,
        "internal" => 25.0,
        _ => 60.0,
    }
}

/// New findings are urgent: 100 at day zero, linear decay to 50 over the
/// first 30 days, flat 50 afterwards.
fn score_age(discovered_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = (now - discovered_at).num_days().max(0);

    if age_days == 0 {
        100.0
    } else if age_days <= 30 {
        100.0 - (age_days as f64) * (50.0 / 30.0)
    } else {
        50.0
    }
}

fn score_asset_value(asset_value: &str) -> f64 {
    match asset_value.to_lowercase().as_str() {
        "production" | "prod" => 100.0,
        "staging" | "stage" => 70.0,
        "development" | "dev" => 40.0,
        "test" => 30.0,
        _ => 60.0,
    }
}

fn severity_for(score: i32) -> Severity {
    if score >= THRESHOLD_CRITICAL {
        Severity::Critical
    } else if score >= THRESHOLD_HIGH {
        Severity::High
    } else if score >= THRESHOLD_MEDIUM {
        Severity::Medium
    } else {
        Severity::Low
    }
}

fn build_reasoning(
    score: i32,
    severity: Severity,
    inputs: &RiskInputs<'_>,
    now: DateTime<Utc>,
) -> String {
    let mut parts = vec![format!("{} risk ({score}/100):", severity.as_str())];

    match inputs.visibility.to_lowercase().as_str() {
        "public" => parts.push("publicly accessible".to_string()),
        "private" => parts.push("restricted but exposed".to_string()),
        _ => {}
    }

    let age_days = (now - inputs.discovered_at).num_days().max(0);
    if age_days == 0 {
        parts.push("discovered today".to_string());
    } else if age_days <= 7 {
        parts.push("recent discovery".to_string());
    } else if age_days > 30 {
        parts.push("older finding".to_string());
    }

    match inputs.asset_value.to_lowercase().as_str() {
        "production" | "prod" => parts.push("affects production systems".to_string()),
        "development" | "dev" => parts.push("development environment only".to_string()),
        _ => {}
    }

    format!("{}.", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn assess(visibility: &str, age_days: i64, asset: &str) -> RiskAssessment {
        let now = Utc::now();
        RiskScorer.calculate(
            &RiskInputs {
                visibility,
                discovered_at: now - Duration::days(age_days),
                asset_value: asset,
            },
            now,
        )
    }

    #[test]
    fn fresh_public_production_finding_is_critical() {
        let assessment = assess("public", 0, "production");
        assert_eq!(assessment.score, 100);
        assert_eq!(assessment.severity, Severity::Critical);
        assert!(assessment.reasoning.contains("critical risk (100/100)"));
        assert!(assessment.reasoning.contains("discovered today"));
    }

    #[test]
    fn visibility_is_monotone_holding_everything_else_fixed() {
        let public = assess("public", 3, "staging").score;
        let private = assess("private", 3, "staging").score;
        let internal = assess("internal", 3, "staging").score;
        assert!(public >= private);
        assert!(private >= internal);
    }

    #[test]
    fn age_decays_then_stabilizes() {
        let day0 = assess("public", 0, "production").score;
        let day15 = assess("public", 15, "production").score;
        let day31 = assess("public", 31, "production").score;
        let day90 = assess("public", 90, "production").score;
        assert!(day0 > day15);
        assert!(day15 > day31);
        assert_eq!(day31, day90);
    }

    #[test]
    fn asset_value_orders_environments() {
        let prod = assess("private", 3, "production").score;
        let staging = assess("private", 3, "staging").score;
        let dev = assess("private", 3, "development").score;
        let test = assess("private", 3, "test").score;
        assert!(prod > staging);
        assert!(staging > dev);
        assert!(dev > test);
    }

    #[test]
    fn unknown_labels_score_in_the_middle() {
        let unknown = assess("unknown", 3, "unknown");
        let public = assess("public", 3, "production");
        let internal = assess("internal", 3, "test");
        assert!(unknown.score < public.score);
        assert!(unknown.score > internal.score);
    }

    #[test]
    fn severity_buckets_follow_thresholds() {
        assert_eq!(severity_for(85), Severity::Critical);
        assert_eq!(severity_for(80), Severity::Critical);
        assert_eq!(severity_for(79), Severity::High);
        assert_eq!(severity_for(60), Severity::High);
        assert_eq!(severity_for(45), Severity::Medium);
        assert_eq!(severity_for(20), Severity::Low);
    }

    #[test]
    fn scorer_is_deterministic() {
        let now = Utc::now();
        let inputs = RiskInputs {
            visibility: "public",
            discovered_at: now - Duration::days(4),
            asset_value: "staging",
        };
        let a = RiskScorer.calculate(&inputs, now);
        let b = RiskScorer.calculate(&inputs, now);
        assert_eq!(a.score, b.score);
        assert_eq!(a.reasoning, b.reasoning);
    }
}
