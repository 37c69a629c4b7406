//! Quorum rules for accepting a cluster of equivalent proposals

use serde::{Deserialize, Serialize};

/// How many responding models must agree for a cluster to carry the round.
///
/// `Majority` (strictly more than half of the models that responded) is
/// the default. Stricter rules exist for pools where a single dissenter
/// should force another refinement round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuorumRule {
    #[default]
    Majority,
    Unanimous,
    AtLeast(usize),
    /// Percentage of responding models, 0-100
    Percentage(u8),
}

impl QuorumRule {
    /// Whether `agreeing` out of `responded` models carries the round.
    pub fn is_satisfied(&self, agreeing: usize, responded: usize) -> bool {
        if responded == 0 || agreeing == 0 {
            return false;
        }
        agreeing >= self.required(responded)
    }

    /// Smallest number of agreeing models that carries the round.
    pub fn required(&self, responded: usize) -> usize {
        match self {
            QuorumRule::Majority => responded / 2 + 1,
            QuorumRule::Unanimous => responded,
            QuorumRule::AtLeast(n) => *n,
            QuorumRule::Percentage(p) => (responded as f64 * (*p as f64 / 100.0)).ceil() as usize,
        }
    }
}

impl std::fmt::Display for QuorumRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuorumRule::Majority => write!(f, "majority"),
            QuorumRule::Unanimous => write!(f, "unanimous"),
            QuorumRule::AtLeast(n) => write!(f, "atleast:{}", n),
            QuorumRule::Percentage(p) => write!(f, "{}%", p),
        }
    }
}

impl std::str::FromStr for QuorumRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "majority" => Ok(QuorumRule::Majority),
            "unanimous" => Ok(QuorumRule::Unanimous),
            s if s.starts_with("atleast:") || s.starts_with("at_least:") => s
                .split(':')
                .nth(1)
                .and_then(|n| n.parse().ok())
                .map(QuorumRule::AtLeast)
                .ok_or_else(|| format!("Invalid count in quorum rule: {}", s)),
            s if s.ends_with('%') => s
                .trim_end_matches('%')
                .parse::<u8>()
                .ok()
                .filter(|p| *p <= 100)
                .map(QuorumRule::Percentage)
                .ok_or_else(|| format!("Invalid percentage in quorum rule: {}", s)),
            other => Err(format!(
                "Unknown quorum rule: {}. Valid: majority, unanimous, atleast:N, N%",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_majority_is_strictly_more_than_half() {
        let rule = QuorumRule::Majority;
        assert!(rule.is_satisfied(3, 4));
        assert!(!rule.is_satisfied(2, 4));
        assert!(rule.is_satisfied(2, 3));
        assert!(rule.is_satisfied(1, 1));
    }

    #[test]
    fn test_other_rules() {
        assert!(!QuorumRule::Unanimous.is_satisfied(2, 3));
        assert!(QuorumRule::Unanimous.is_satisfied(3, 3));
        assert!(QuorumRule::AtLeast(2).is_satisfied(2, 5));
        assert!(!QuorumRule::Percentage(75).is_satisfied(3, 5));
        assert!(QuorumRule::Percentage(75).is_satisfied(4, 5));
    }

    #[test]
    fn test_nobody_responded() {
        assert!(!QuorumRule::Majority.is_satisfied(0, 0));
        assert!(!QuorumRule::AtLeast(0).is_satisfied(0, 3));
    }

    #[test]
    fn test_parse_and_display() {
        for rule in [
            QuorumRule::Majority,
            QuorumRule::Unanimous,
            QuorumRule::AtLeast(2),
            QuorumRule::Percentage(80),
        ] {
            assert_eq!(rule.to_string().parse::<QuorumRule>(), Ok(rule));
        }
        assert!("supermajority".parse::<QuorumRule>().is_err());
        assert!("120%".parse::<QuorumRule>().is_err());
    }
}
