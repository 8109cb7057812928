//! Accept/reject policy over a reference set.
//!
//! With a single enrolled reference only the best score is checked, against
//! a stricter bound. Once `min_references` or more exist, a match needs both
//! a high best score and at least `min_references` references above the
//! per-pair threshold.

use crate::descriptor::Descriptor;
use crate::similarity::cosine_similarity;
use serde::Serialize;
use thiserror::Error;

/// Reported as `bestSimilarity` when there was nothing to compare against.
/// Lower than any real cosine similarity.
pub const NO_REFERENCES_SIMILARITY: f64 = -1.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    #[error("{name} must be within [-1, 1], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f64 },
    #[error("min_references must be at least 1")]
    ZeroMinReferences,
}

/// Policy thresholds. Defaults are the deployed values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConfig {
    /// Reference-set size at which the multi-match rule applies.
    pub min_references: usize,
    /// Per-pair similarity that counts a reference toward `match_count`.
    pub match_threshold: f64,
    /// Best similarity required under the multi-match rule.
    pub best_min_multi: f64,
    /// Best similarity required when fewer than `min_references` exist.
    pub best_min_single: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            min_references: 2,
            match_threshold: 0.88,
            best_min_multi: 0.92,
            best_min_single: 0.95,
        }
    }
}

impl PolicyConfig {
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.min_references == 0 {
            return Err(PolicyError::ZeroMinReferences);
        }
        for (name, value) in [
            ("match_threshold", self.match_threshold),
            ("best_min_multi", self.best_min_multi),
            ("best_min_single", self.best_min_single),
        ] {
            if !(-1.0..=1.0).contains(&value) {
                return Err(PolicyError::ThresholdOutOfRange { name, value });
            }
        }
        Ok(())
    }
}

/// Which acceptance rule a decision was made under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    Single,
    Multi,
}

/// Thresholds actually applied, echoed back for auditing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedThresholds {
    pub threshold: f64,
    pub best_min: f64,
    #[serde(skip)]
    pub rule: Rule,
}

/// Machine-readable reason for a negative decision that had no basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoMatchReason {
    NoValidReferences,
}

/// Outcome of one verification. Serializes to the wire response object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    #[serde(rename = "match")]
    pub matched: bool,
    pub best_similarity: f64,
    pub match_count: usize,
    pub compared_with: usize,
    #[serde(flatten)]
    pub applied: Option<AppliedThresholds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<NoMatchReason>,
}

impl Decision {
    fn no_references() -> Self {
        Self {
            matched: false,
            best_similarity: NO_REFERENCES_SIMILARITY,
            match_count: 0,
            compared_with: 0,
            applied: None,
            reason: Some(NoMatchReason::NoValidReferences),
        }
    }
}

/// Strategy for turning a probe and its reference set into a decision.
pub trait Policy {
    fn decide(&self, submitted: &Descriptor, references: &[Descriptor]) -> Decision;
}

/// Threshold policy over cosine similarity.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdPolicy {
    pub config: PolicyConfig,
}

impl ThresholdPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    /// Decide from precomputed per-reference similarities.
    ///
    /// Only the maximum and the above-threshold count matter, so the order
    /// of `scores` has no effect on the result.
    pub fn decide_scores(&self, scores: &[f64]) -> Decision {
        if scores.is_empty() {
            return Decision::no_references();
        }

        let cfg = &self.config;
        let best_similarity = scores
            .iter()
            .copied()
            .fold(NO_REFERENCES_SIMILARITY, f64::max);
        let match_count = scores.iter().filter(|&&s| s >= cfg.match_threshold).count();

        let (rule, best_min) = if scores.len() >= cfg.min_references {
            (Rule::Multi, cfg.best_min_multi)
        } else {
            (Rule::Single, cfg.best_min_single)
        };
        let matched = match rule {
            Rule::Multi => best_similarity >= best_min && match_count >= cfg.min_references,
            Rule::Single => best_similarity >= best_min,
        };

        Decision {
            matched,
            best_similarity,
            match_count,
            compared_with: scores.len(),
            applied: Some(AppliedThresholds {
                threshold: cfg.match_threshold,
                best_min,
                rule,
            }),
            reason: None,
        }
    }
}

impl Policy for ThresholdPolicy {
    fn decide(&self, submitted: &Descriptor, references: &[Descriptor]) -> Decision {
        // Score every reference; no early exit on a strong match.
        let scores: Vec<f64> = references
            .iter()
            .map(|r| cosine_similarity(submitted, r))
            .collect();
        self.decide_scores(&scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DESCRIPTOR_DIM;
    use serde_json::json;

    fn probe() -> Descriptor {
        let mut v = vec![0.0; DESCRIPTOR_DIM];
        v[0] = 1.0;
        Descriptor::from_values(v).unwrap()
    }

    /// A unit reference whose cosine similarity with `probe()` is `s`.
    fn reference_at(s: f64) -> Descriptor {
        let mut v = vec![0.0; DESCRIPTOR_DIM];
        v[0] = s;
        v[1] = (1.0 - s * s).sqrt();
        Descriptor::from_values(v).unwrap()
    }

    fn decide(sims: &[f64]) -> Decision {
        let refs: Vec<_> = sims.iter().map(|&s| reference_at(s)).collect();
        ThresholdPolicy::default().decide(&probe(), &refs)
    }

    #[test]
    fn test_empty_references_never_match() {
        let d = ThresholdPolicy::default().decide(&probe(), &[]);
        assert!(!d.matched);
        assert_eq!(d.best_similarity, NO_REFERENCES_SIMILARITY);
        assert_eq!(d.match_count, 0);
        assert_eq!(d.compared_with, 0);
        assert_eq!(d.reason, Some(NoMatchReason::NoValidReferences));
        assert!(d.applied.is_none());
    }

    #[test]
    fn test_single_reference_below_bound_rejected() {
        let d = decide(&[0.94]);
        assert!(!d.matched);
        assert_eq!(d.compared_with, 1);
        let applied = d.applied.unwrap();
        assert_eq!(applied.rule, Rule::Single);
        assert_eq!(applied.best_min, 0.95);
    }

    #[test]
    fn test_single_reference_above_bound_accepted() {
        let d = decide(&[0.96]);
        assert!(d.matched);
        assert!((d.best_similarity - 0.96).abs() < 1e-9);
        assert_eq!(d.match_count, 1);
    }

    #[test]
    fn test_multi_rule_needs_two_matching_references() {
        let d = decide(&[0.93, 0.70, 0.50]);
        assert!(!d.matched);
        assert_eq!(d.match_count, 1);
        assert!((d.best_similarity - 0.93).abs() < 1e-9);
        assert_eq!(d.applied.unwrap().rule, Rule::Multi);
    }

    #[test]
    fn test_multi_rule_accepts_corroborated_match() {
        let d = decide(&[0.93, 0.90, 0.50]);
        assert!(d.matched);
        assert_eq!(d.match_count, 2);
        assert_eq!(d.compared_with, 3);
        assert_eq!(d.applied.unwrap().best_min, 0.92);
    }

    #[test]
    fn test_multi_rule_rejects_low_best_even_with_count() {
        let d = decide(&[0.91, 0.90]);
        assert!(!d.matched);
        assert_eq!(d.match_count, 2);
    }

    #[test]
    fn test_thresholds_are_inclusive() {
        let policy = ThresholdPolicy::default();
        assert!(policy.decide_scores(&[0.95]).matched);
        assert!(policy.decide_scores(&[0.92, 0.88]).matched);
        assert!(!policy.decide_scores(&[0.92, 0.8799]).matched);
    }

    #[test]
    fn test_score_order_does_not_matter() {
        let policy = ThresholdPolicy::default();
        let a = policy.decide_scores(&[0.5, 0.93, 0.90]);
        let b = policy.decide_scores(&[0.90, 0.5, 0.93]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_custom_min_references() {
        let policy = ThresholdPolicy::new(PolicyConfig {
            min_references: 3,
            ..PolicyConfig::default()
        });
        // Two references fall under the single rule when the multi rule starts at three.
        let d = policy.decide_scores(&[0.93, 0.93]);
        assert_eq!(d.applied.unwrap().rule, Rule::Single);
        assert!(!d.matched);
        assert!(!policy.decide_scores(&[0.99, 0.95, 0.5]).matched);
        assert!(policy.decide_scores(&[0.99, 0.95, 0.89]).matched);
    }

    #[test]
    fn test_config_validation() {
        assert!(PolicyConfig::default().validate().is_ok());
        let bad = PolicyConfig {
            best_min_single: 1.5,
            ..PolicyConfig::default()
        };
        assert_eq!(
            bad.validate(),
            Err(PolicyError::ThresholdOutOfRange {
                name: "best_min_single",
                value: 1.5
            })
        );
        let zero = PolicyConfig {
            min_references: 0,
            ..PolicyConfig::default()
        };
        assert_eq!(zero.validate(), Err(PolicyError::ZeroMinReferences));
    }

    #[test]
    fn test_decision_wire_shape() {
        let d = ThresholdPolicy::default().decide_scores(&[1.0, 0.9]);
        assert_eq!(
            serde_json::to_value(&d).unwrap(),
            json!({
                "match": true,
                "bestSimilarity": 1.0,
                "matchCount": 2,
                "comparedWith": 2,
                "threshold": 0.88,
                "bestMin": 0.92,
            })
        );

        let none = ThresholdPolicy::default().decide_scores(&[]);
        assert_eq!(
            serde_json::to_value(&none).unwrap(),
            json!({
                "match": false,
                "bestSimilarity": -1.0,
                "matchCount": 0,
                "comparedWith": 0,
                "reason": "no_valid_references",
            })
        );
    }
}
