//! Bound value objects used by severity thresholds.
//!
//! Bound sides arrive from operator-edited presets, so they may be numbers,
//! numeric strings, empty strings, or garbage. Everything that is not a
//! finite number becomes "unconstrained" on that side.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

/// Which side of a bound was crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundSide {
    /// Value fell below `min`.
    BelowMin,
    /// Value rose above `max`.
    AboveMax,
}

impl BoundSide {
    pub fn label(&self) -> &'static str {
        match self {
            Self::BelowMin => "below minimum",
            Self::AboveMax => "above maximum",
        }
    }
}

/// A closed acceptance range. A missing side is unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bound {
    #[serde(
        default,
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub min: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub max: Option<f64>,
}

impl Bound {
    pub const fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    pub const fn unbounded() -> Self {
        Self {
            min: None,
            max: None,
        }
    }

    pub const fn min(min: f64) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    pub const fn max(max: f64) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    pub const fn range(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    /// True when neither side is set.
    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// True when both sides are set and `min > max`.
    pub fn is_contradictory(&self) -> bool {
        matches!((self.min, self.max), (Some(min), Some(max)) if min > max)
    }

    /// The side of this bound that `value` falls strictly outside of.
    ///
    /// Contradictory bounds never report a violation.
    pub fn violation(&self, value: f64) -> Option<(BoundSide, f64)> {
        if self.is_contradictory() {
            return None;
        }
        if let Some(min) = self.min
            && value < min
        {
            return Some((BoundSide::BelowMin, min));
        }
        if let Some(max) = self.max
            && value > max
        {
            return Some((BoundSide::AboveMax, max));
        }
        None
    }

    /// True when this bound accepts strictly more values than `other` on at
    /// least one side that `other` constrains.
    pub fn is_looser_than(&self, other: &Bound) -> bool {
        let min_looser = match (self.min, other.min) {
            (None, Some(_)) => false,
            (Some(mine), Some(theirs)) => mine < theirs,
            _ => false,
        };
        let max_looser = match (self.max, other.max) {
            (None, Some(_)) => false,
            (Some(mine), Some(theirs)) => mine > theirs,
            _ => false,
        };
        min_looser || max_looser
    }

    /// Human-readable acceptance condition, e.g. `>= 16 and <= 235`.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(min) = self.min {
            parts.push(format!(">= {min}"));
        }
        if let Some(max) = self.max {
            parts.push(format!("<= {max}"));
        }
        if parts.is_empty() {
            "unconstrained".to_string()
        } else {
            parts.join(" and ")
        }
    }
}

/// Per-tier bounds for a metric.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SeverityBounds {
    #[serde(default)]
    pub non_critical: Bound,
    #[serde(default)]
    pub critical: Bound,
}

impl SeverityBounds {
    pub const fn new(non_critical: Bound, critical: Bound) -> Self {
        Self {
            non_critical,
            critical,
        }
    }

    /// True when no tier constrains anything.
    pub fn is_empty(&self) -> bool {
        self.non_critical.is_unbounded() && self.critical.is_unbounded()
    }
}

/// Coerce a loosely-typed JSON value into a finite bound side.
pub fn coerce_bound_value(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(value = %s, "Ignoring non-numeric bound value");
                None
            }
        },
        Value::Null => None,
        other => {
            warn!(value = %other, "Ignoring non-numeric bound value");
            None
        }
    };
    parsed.filter(|v| v.is_finite())
}

fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_bound_value(&value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_violation_sides() {
        let bound = Bound::range(16.0, 235.0);
        assert_eq!(bound.violation(10.0), Some((BoundSide::BelowMin, 16.0)));
        assert_eq!(bound.violation(240.0), Some((BoundSide::AboveMax, 235.0)));
        assert_eq!(bound.violation(16.0), None);
        assert_eq!(bound.violation(235.0), None);
        assert_eq!(Bound::unbounded().violation(f64::MAX), None);
    }

    #[test]
    fn test_contradictory_bound_is_unconstrained() {
        let bound = Bound::range(10.0, 5.0);
        assert!(bound.is_contradictory());
        assert_eq!(bound.violation(0.0), None);
        assert_eq!(bound.violation(100.0), None);
    }

    #[test]
    fn test_lenient_deserialization() {
        let bound: Bound = serde_json::from_str(r#"{"min": "16", "max": ""}"#).unwrap();
        assert_eq!(bound, Bound::min(16.0));

        let bound: Bound = serde_json::from_str(r#"{"min": "abc", "max": 235}"#).unwrap();
        assert_eq!(bound, Bound::max(235.0));

        let bound: Bound = serde_json::from_str(r#"{"min": null, "max": [1]}"#).unwrap();
        assert!(bound.is_unbounded());

        let bounds: SeverityBounds = serde_json::from_str(r#"{"critical": {"max": 245}}"#).unwrap();
        assert!(bounds.non_critical.is_unbounded());
        assert_eq!(bounds.critical, Bound::max(245.0));
    }

    #[test]
    fn test_empty_side_is_not_zero() {
        let bound: Bound = serde_json::from_str(r#"{"min": ""}"#).unwrap();
        assert_eq!(bound.violation(-1.0), None);
    }

    #[test]
    fn test_is_looser_than() {
        let non_critical = Bound::range(16.0, 235.0);
        assert!(!Bound::range(8.0, 245.0).is_looser_than(&Bound::range(8.0, 245.0)));
        assert!(Bound::range(8.0, 245.0).is_looser_than(&non_critical));
        assert!(!Bound::range(20.0, 230.0).is_looser_than(&non_critical));
        assert!(!Bound::unbounded().is_looser_than(&non_critical));
    }

    #[test]
    fn test_describe() {
        assert_eq!(Bound::range(16.0, 235.0).describe(), ">= 16 and <= 235");
        assert_eq!(Bound::unbounded().describe(), "unconstrained");
    }
}
