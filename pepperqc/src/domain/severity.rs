//! Severity value objects.

use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;

/// Severity tier attached to a single issue.
///
/// Deserialization is lenient: legacy labels are folded into the current
/// tiers by [`Severity::normalize`], so stored issues written by older
/// releases keep counting toward the right tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Broadcast-blocking finding.
    Critical,
    /// Finding that needs review but does not block delivery.
    #[default]
    NonCritical,
    /// Finding reported for context only.
    Informational,
}

impl Severity {
    /// All tiers, highest rank first.
    pub const ALL: [Severity; 3] = [Self::Critical, Self::NonCritical, Self::Informational];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::NonCritical => "non_critical",
            Self::Informational => "informational",
        }
    }

    /// Parse a tier label strictly. Returns `None` for anything that is not
    /// a current or legacy tier name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "critical" | "high" => Some(Self::Critical),
            "non_critical" | "noncritical" | "warning" | "medium" => Some(Self::NonCritical),
            "informational" | "info" | "notice" => Some(Self::Informational),
            _ => None,
        }
    }

    /// Normalize a possibly missing or unknown label.
    ///
    /// `high` maps to `critical`, `info`/`notice` to `informational`, and
    /// anything absent or unrecognized to `non_critical`.
    pub fn normalize(label: Option<&str>) -> Self {
        label.and_then(Self::parse).unwrap_or(Self::NonCritical)
    }

    /// Numeric rank (higher = more severe).
    pub fn rank(&self) -> u8 {
        OverallSeverity::from(*self).rank()
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(Self::normalize(raw.as_deref()))
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job-level severity: the highest tier with at least one issue, or `Clear`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallSeverity {
    #[default]
    Clear,
    Informational,
    NonCritical,
    Critical,
}

impl OverallSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Informational => "informational",
            Self::NonCritical => "non_critical",
            Self::Critical => "critical",
        }
    }

    /// Human label used in notifications ("Non Critical").
    pub fn label(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::Informational => "Informational",
            Self::NonCritical => "Non Critical",
            Self::Critical => "Critical",
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Self::Clear => 0,
            Self::Informational => 1,
            Self::NonCritical => 2,
            Self::Critical => 3,
        }
    }
}

impl From<Severity> for OverallSeverity {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Critical => Self::Critical,
            Severity::NonCritical => Self::NonCritical,
            Severity::Informational => Self::Informational,
        }
    }
}

impl PartialOrd for OverallSeverity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OverallSeverity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl std::fmt::Display for OverallSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::NonCritical);
        assert!(Severity::NonCritical > Severity::Informational);
        assert!(OverallSeverity::Informational > OverallSeverity::Clear);
        assert!(OverallSeverity::Critical > OverallSeverity::NonCritical);
    }

    #[test]
    fn test_severity_normalize_legacy_labels() {
        assert_eq!(Severity::normalize(Some("high")), Severity::Critical);
        assert_eq!(Severity::normalize(Some("CRITICAL")), Severity::Critical);
        assert_eq!(Severity::normalize(Some("info")), Severity::Informational);
        assert_eq!(Severity::normalize(Some("notice")), Severity::Informational);
        assert_eq!(Severity::normalize(Some("non-critical")), Severity::NonCritical);
        assert_eq!(Severity::normalize(Some("bogus")), Severity::NonCritical);
        assert_eq!(Severity::normalize(None), Severity::NonCritical);
    }

    #[test]
    fn test_severity_serde_is_lenient() {
        let parsed: Vec<Severity> =
            serde_json::from_str(r#"["high", "info", null, "critical", "whatever"]"#).unwrap();
        assert_eq!(
            parsed,
            vec![
                Severity::Critical,
                Severity::Informational,
                Severity::NonCritical,
                Severity::Critical,
                Severity::NonCritical,
            ]
        );

        let json = serde_json::to_string(&Severity::NonCritical).unwrap();
        assert_eq!(json, r#""non_critical""#);
    }

    #[test]
    fn test_overall_from_severity() {
        assert_eq!(
            OverallSeverity::from(Severity::Informational),
            OverallSeverity::Informational
        );
        assert_eq!(OverallSeverity::default(), OverallSeverity::Clear);
        assert_eq!(OverallSeverity::NonCritical.label(), "Non Critical");
    }
}
