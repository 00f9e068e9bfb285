//! Preset domain model.
//!
//! A preset bundles the analysis filters and event detectors to run plus the
//! severity thresholds for each of their metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use super::bounds::{Bound, SeverityBounds};
use super::issue::SourceKind;
use super::severity::Severity;

/// Name of the seeded preset.
pub const DEFAULT_PRESET_NAME: &str = "Default";

/// Display panels enabled when a preset does not list any.
pub const DEFAULT_PANELS: &[&str] = &["Tiled Center Column"];

/// A metric reported by a filter family, with its factory bound.
#[derive(Debug, Clone, Copy)]
pub struct MetricDefinition {
    pub key: &'static str,
    pub label: &'static str,
    pub unit: &'static str,
    pub default_bound: Bound,
}

/// A numeric-metric analysis family.
#[derive(Debug, Clone, Copy)]
pub struct FilterDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub category: &'static str,
    pub default_enabled: bool,
    pub metrics: &'static [MetricDefinition],
}

/// Default value of a detector parameter.
#[derive(Debug, Clone, Copy)]
pub enum ParamDefault {
    Number(f64),
    Text(&'static str),
}

impl ParamDefault {
    pub fn to_value(self) -> Value {
        match self {
            Self::Number(n) => serde_json::Number::from_f64(n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Text(s) => Value::String(s.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParamDefinition {
    pub key: &'static str,
    pub label: &'static str,
    pub default: ParamDefault,
}

/// An event-style probe.
#[derive(Debug, Clone, Copy)]
pub struct DetectorDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub default_enabled: bool,
    pub params: &'static [ParamDefinition],
}

pub const FILTER_DEFINITIONS: &[FilterDefinition] = &[
    FilterDefinition {
        id: "signalstats",
        name: "Signal Stats",
        category: "video",
        default_enabled: true,
        metrics: &[
            MetricDefinition {
                key: "lavfi.signalstats.YMIN",
                label: "Luma Minimum (Y)",
                unit: "code value",
                default_bound: Bound::min(5.0),
            },
            MetricDefinition {
                key: "lavfi.signalstats.YMAX",
                label: "Luma Maximum (Y)",
                unit: "code value",
                default_bound: Bound::max(235.0),
            },
            MetricDefinition {
                key: "lavfi.signalstats.YAVG",
                label: "Luma Average (Y)",
                unit: "code value",
                default_bound: Bound::range(16.0, 235.0),
            },
        ],
    },
    FilterDefinition {
        id: "entropy",
        name: "Entropy",
        category: "video",
        default_enabled: true,
        metrics: &[MetricDefinition {
            key: "lavfi.entropy.Y",
            label: "Entropy (Y)",
            unit: "bits",
            default_bound: Bound::min(0.20),
        }],
    },
    FilterDefinition {
        id: "ssim",
        name: "SSIM Similarity",
        category: "video",
        default_enabled: true,
        metrics: &[
            MetricDefinition {
                key: "lavfi.ssim.All",
                label: "SSIM (All)",
                unit: "ratio",
                default_bound: Bound::max(0.999),
            },
            MetricDefinition {
                key: "lavfi.ssim.Y",
                label: "SSIM (Y)",
                unit: "ratio",
                default_bound: Bound::max(0.999),
            },
        ],
    },
    FilterDefinition {
        id: "blockdetect",
        name: "Blockiness",
        category: "video",
        default_enabled: false,
        metrics: &[MetricDefinition {
            key: "lavfi.block",
            label: "Blockiness Score",
            unit: "score",
            default_bound: Bound::max(0.35),
        }],
    },
    FilterDefinition {
        id: "blurdetect",
        name: "Blur Detection",
        category: "video",
        default_enabled: false,
        metrics: &[MetricDefinition {
            key: "lavfi.blur",
            label: "Blur Score",
            unit: "score",
            default_bound: Bound::max(0.30),
        }],
    },
    FilterDefinition {
        id: "astats",
        name: "Audio Statistics",
        category: "audio",
        default_enabled: true,
        metrics: &[
            MetricDefinition {
                key: "lavfi.astats.Overall.Peak_level",
                label: "Peak Level",
                unit: "dBFS",
                default_bound: Bound::max(0.0),
            },
            MetricDefinition {
                key: "lavfi.astats.1.Min_level",
                label: "Channel 1 Min",
                unit: "dBFS",
                default_bound: Bound::min(-80.0),
            },
            MetricDefinition {
                key: "lavfi.astats.1.Max_level",
                label: "Channel 1 Max",
                unit: "dBFS",
                default_bound: Bound::max(0.0),
            },
        ],
    },
    FilterDefinition {
        id: "ebur128",
        name: "EBU R128 Loudness",
        category: "audio",
        default_enabled: true,
        metrics: &[MetricDefinition {
            key: "lavfi.r128.M",
            label: "Momentary Loudness",
            unit: "LUFS",
            default_bound: Bound::range(-23.0, -5.0),
        }],
    },
];

pub const DETECTOR_DEFINITIONS: &[DetectorDefinition] = &[
    DetectorDefinition {
        id: "blackdetect",
        name: "Black Frame Detector",
        default_enabled: true,
        params: &[
            ParamDefinition {
                key: "duration",
                label: "Minimum duration (s)",
                default: ParamDefault::Number(0.5),
            },
            ParamDefinition {
                key: "picture_threshold",
                label: "Picture threshold",
                default: ParamDefault::Number(0.98),
            },
            ParamDefinition {
                key: "pixel_threshold",
                label: "Pixel threshold",
                default: ParamDefault::Number(0.10),
            },
        ],
    },
    DetectorDefinition {
        id: "freezedetect",
        name: "Freeze Frame Detector",
        default_enabled: true,
        params: &[
            ParamDefinition {
                key: "noise",
                label: "Noise tolerance",
                default: ParamDefault::Number(0.003),
            },
            ParamDefinition {
                key: "duration",
                label: "Minimum duration (s)",
                default: ParamDefault::Number(2.0),
            },
        ],
    },
    DetectorDefinition {
        id: "silencedetect",
        name: "Silence Detector",
        default_enabled: true,
        params: &[
            ParamDefinition {
                key: "noise",
                label: "Noise floor (dB)",
                default: ParamDefault::Number(-30.0),
            },
            ParamDefinition {
                key: "duration",
                label: "Minimum duration (s)",
                default: ParamDefault::Number(2.0),
            },
        ],
    },
    DetectorDefinition {
        id: "overlaytext",
        name: "Overlay Text OCR",
        default_enabled: true,
        params: &[
            ParamDefinition {
                key: "sample_interval",
                label: "Sample interval (s)",
                default: ParamDefault::Number(1.0),
            },
            ParamDefinition {
                key: "min_confidence",
                label: "Minimum OCR confidence",
                default: ParamDefault::Number(70.0),
            },
            ParamDefinition {
                key: "min_chars",
                label: "Minimum characters",
                default: ParamDefault::Number(5.0),
            },
            ParamDefinition {
                key: "min_duration",
                label: "Minimum duration (s)",
                default: ParamDefault::Number(1.5),
            },
            ParamDefinition {
                key: "min_box_height",
                label: "Minimum box height (px)",
                default: ParamDefault::Number(24.0),
            },
            ParamDefinition {
                key: "allowlist_phrases",
                label: "Allowed phrases (comma separated)",
                default: ParamDefault::Text(""),
            },
            ParamDefinition {
                key: "flag_keywords",
                label: "Critical keywords (comma separated)",
                default: ParamDefault::Text("click,press,error,warning,analyze"),
            },
        ],
    },
];

pub fn filter_definition(id: &str) -> Option<&'static FilterDefinition> {
    FILTER_DEFINITIONS.iter().find(|def| def.id == id)
}

pub fn detector_definition(id: &str) -> Option<&'static DetectorDefinition> {
    DETECTOR_DEFINITIONS.iter().find(|def| def.id == id)
}

/// Human label for a metric key, falling back to the key itself.
pub fn metric_label<'a>(source_id: &str, metric_key: &'a str) -> &'a str {
    filter_definition(source_id)
        .and_then(|def| def.metrics.iter().find(|m| m.key == metric_key))
        .map(|m| m.label)
        .unwrap_or(metric_key)
}

/// Track selection mode. Anything other than `all` selects the first track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackSelection {
    #[default]
    First,
    All,
}

impl<'de> Deserialize<'de> for TrackSelection {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(match raw.as_deref().map(str::trim) {
            Some(s) if s.eq_ignore_ascii_case("all") => Self::All,
            _ => Self::First,
        })
    }
}

fn default_true() -> bool {
    true
}

/// Thresholds for one metric key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricThresholds {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub severity: SeverityBounds,
    #[serde(default)]
    pub default_severity: Severity,
}

impl Default for MetricThresholds {
    fn default() -> Self {
        Self {
            enabled: true,
            severity: SeverityBounds::default(),
            default_severity: Severity::NonCritical,
        }
    }
}

impl MetricThresholds {
    /// Factory thresholds: the bound sits at the non-critical tier.
    pub fn from_default_bound(bound: Bound) -> Self {
        Self {
            severity: SeverityBounds::new(bound, Bound::unbounded()),
            ..Self::default()
        }
    }

    pub fn with_bounds(non_critical: Bound, critical: Bound) -> Self {
        Self {
            severity: SeverityBounds::new(non_critical, critical),
            ..Self::default()
        }
    }

    pub fn with_default_severity(mut self, severity: Severity) -> Self {
        self.default_severity = severity;
        self
    }
}

/// One filter family entry in a preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub id: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricThresholds>,
}

impl FilterConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_metric(mut self, key: impl Into<String>, thresholds: MetricThresholds) -> Self {
        self.metrics.insert(key.into(), thresholds);
        self
    }

    fn from_definition(def: &FilterDefinition) -> Self {
        Self {
            id: def.id.to_string(),
            enabled: def.default_enabled,
            metrics: def
                .metrics
                .iter()
                .map(|m| {
                    (
                        m.key.to_string(),
                        MetricThresholds::from_default_bound(m.default_bound),
                    )
                })
                .collect(),
        }
    }
}

/// One detector entry in a preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub id: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    #[serde(default)]
    pub thresholds: SeverityBounds,
    #[serde(default)]
    pub default_severity: Severity,
}

impl DetectorConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            params: BTreeMap::new(),
            thresholds: SeverityBounds::default(),
            default_severity: Severity::NonCritical,
        }
    }

    pub fn with_default_severity(mut self, severity: Severity) -> Self {
        self.default_severity = severity;
        self
    }

    pub fn with_thresholds(mut self, thresholds: SeverityBounds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// The detector's bounds viewed as metric thresholds.
    pub fn as_thresholds(&self) -> MetricThresholds {
        MetricThresholds {
            enabled: self.enabled,
            severity: self.thresholds,
            default_severity: self.default_severity,
        }
    }

    fn from_definition(def: &DetectorDefinition) -> Self {
        Self {
            id: def.id.to_string(),
            enabled: def.default_enabled,
            params: def
                .params
                .iter()
                .map(|p| (p.key.to_string(), p.default.to_value()))
                .collect(),
            thresholds: SeverityBounds::default(),
            default_severity: Severity::NonCritical,
        }
    }
}

fn default_panels() -> Vec<String> {
    DEFAULT_PANELS.iter().map(|p| p.to_string()).collect()
}

/// The parameter bundle captured into a job snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetParameters {
    #[serde(default)]
    pub video_tracks: TrackSelection,
    #[serde(default)]
    pub audio_tracks: TrackSelection,
    #[serde(default = "default_panels")]
    pub panels: Vec<String>,
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
    #[serde(default, alias = "ffmpeg")]
    pub detectors: Vec<DetectorConfig>,
}

impl Default for PresetParameters {
    fn default() -> Self {
        Self {
            video_tracks: TrackSelection::First,
            audio_tracks: TrackSelection::First,
            panels: default_panels(),
            filters: Vec::new(),
            detectors: Vec::new(),
        }
    }
}

impl PresetParameters {
    /// The factory parameter bundle built from the known filter and
    /// detector tables.
    pub fn builtin_default() -> Self {
        Self {
            filters: FILTER_DEFINITIONS
                .iter()
                .map(FilterConfig::from_definition)
                .collect(),
            detectors: DETECTOR_DEFINITIONS
                .iter()
                .map(DetectorConfig::from_definition)
                .collect(),
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: FilterConfig) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_detector(mut self, detector: DetectorConfig) -> Self {
        self.detectors.push(detector);
        self
    }

    pub fn filter(&self, id: &str) -> Option<&FilterConfig> {
        self.filters.iter().find(|f| f.id == id)
    }

    pub fn filter_mut(&mut self, id: &str) -> Option<&mut FilterConfig> {
        self.filters.iter_mut().find(|f| f.id == id)
    }

    pub fn detector(&self, id: &str) -> Option<&DetectorConfig> {
        self.detectors.iter().find(|d| d.id == id)
    }

    pub fn detector_mut(&mut self, id: &str) -> Option<&mut DetectorConfig> {
        self.detectors.iter_mut().find(|d| d.id == id)
    }

    /// Fill gaps with factory defaults.
    ///
    /// Known families come first in table order; entries the tables do not
    /// know about are kept after them in their original order. Duplicate ids
    /// keep the first occurrence. Missing metrics and detector parameters are
    /// added with their defaults; operator-provided values are never replaced.
    pub fn normalize(mut self) -> Self {
        if self.panels.is_empty() {
            self.panels = default_panels();
        }

        let mut provided_filters = dedup_by_id(std::mem::take(&mut self.filters), |f| &f.id);
        let mut filters = Vec::with_capacity(provided_filters.len().max(FILTER_DEFINITIONS.len()));
        for def in FILTER_DEFINITIONS {
            let config = match take_by_id(&mut provided_filters, def.id, |f| &f.id) {
                Some(mut config) => {
                    for metric in def.metrics {
                        config.metrics.entry(metric.key.to_string()).or_insert_with(|| {
                            MetricThresholds::from_default_bound(metric.default_bound)
                        });
                    }
                    config
                }
                None => FilterConfig::from_definition(def),
            };
            filters.push(config);
        }
        filters.extend(provided_filters);
        self.filters = filters;

        let mut provided_detectors = dedup_by_id(std::mem::take(&mut self.detectors), |d| &d.id);
        let mut detectors =
            Vec::with_capacity(provided_detectors.len().max(DETECTOR_DEFINITIONS.len()));
        for def in DETECTOR_DEFINITIONS {
            let config = match take_by_id(&mut provided_detectors, def.id, |d| &d.id) {
                Some(mut config) => {
                    for param in def.params {
                        let slot = config
                            .params
                            .entry(param.key.to_string())
                            .or_insert(Value::Null);
                        if slot.is_null() {
                            *slot = param.default.to_value();
                        }
                    }
                    config
                }
                None => DetectorConfig::from_definition(def),
            };
            detectors.push(config);
        }
        detectors.extend(provided_detectors);
        self.detectors = detectors;

        self
    }

    /// Authoring problems that do not prevent the preset from being stored.
    pub fn validate(&self) -> Vec<PresetWarning> {
        let mut warnings = Vec::new();

        for filter in &self.filters {
            if filter_definition(&filter.id).is_none() {
                warnings.push(PresetWarning::UnknownSource {
                    kind: SourceKind::Filter,
                    source_id: filter.id.clone(),
                });
            }
            for (key, thresholds) in &filter.metrics {
                check_bounds(
                    &mut warnings,
                    &filter.id,
                    Some(key.as_str()),
                    &thresholds.severity,
                );
            }
        }

        for detector in &self.detectors {
            if detector_definition(&detector.id).is_none() {
                warnings.push(PresetWarning::UnknownSource {
                    kind: SourceKind::Detector,
                    source_id: detector.id.clone(),
                });
            }
            check_bounds(&mut warnings, &detector.id, None, &detector.thresholds);
        }

        warnings
    }
}

fn check_bounds(
    warnings: &mut Vec<PresetWarning>,
    source_id: &str,
    metric_key: Option<&str>,
    bounds: &SeverityBounds,
) {
    for (tier, bound) in [
        (Severity::NonCritical, &bounds.non_critical),
        (Severity::Critical, &bounds.critical),
    ] {
        if bound.is_contradictory() {
            warnings.push(PresetWarning::ContradictoryBound {
                source_id: source_id.to_string(),
                metric_key: metric_key.map(str::to_string),
                tier,
            });
        }
    }

    if !bounds.critical.is_contradictory()
        && !bounds.non_critical.is_contradictory()
        && bounds.critical.is_looser_than(&bounds.non_critical)
    {
        warnings.push(PresetWarning::CriticalLooserThanNonCritical {
            source_id: source_id.to_string(),
            metric_key: metric_key.map(str::to_string),
        });
    }
}

fn dedup_by_id<T>(items: Vec<T>, id: impl Fn(&T) -> &String) -> Vec<T> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(id(item).clone()))
        .collect()
}

fn take_by_id<T>(items: &mut Vec<T>, wanted: &str, id: impl Fn(&T) -> &String) -> Option<T> {
    let index = items.iter().position(|item| id(item) == wanted)?;
    Some(items.remove(index))
}

/// A non-fatal problem found while validating a preset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum PresetWarning {
    /// `min > max`; the bound is treated as unconstrained.
    ContradictoryBound {
        source_id: String,
        metric_key: Option<String>,
        tier: Severity,
    },
    /// The critical tier accepts values the non-critical tier rejects.
    /// Both tiers are still evaluated independently.
    CriticalLooserThanNonCritical {
        source_id: String,
        metric_key: Option<String>,
    },
    /// The id is not in the built-in tables.
    UnknownSource { kind: SourceKind, source_id: String },
}

impl fmt::Display for PresetWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = |source_id: &str, metric_key: &Option<String>| match metric_key {
            Some(key) => format!("{source_id}/{key}"),
            None => source_id.to_string(),
        };
        match self {
            Self::ContradictoryBound {
                source_id,
                metric_key,
                tier,
            } => write!(
                f,
                "{} {} bound has min > max and is ignored",
                target(source_id, metric_key),
                tier
            ),
            Self::CriticalLooserThanNonCritical {
                source_id,
                metric_key,
            } => write!(
                f,
                "{} critical bound is looser than its non_critical bound",
                target(source_id, metric_key)
            ),
            Self::UnknownSource { kind, source_id } => {
                write!(f, "unknown {} '{}'", kind, source_id)
            }
        }
    }
}

/// A stored preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub parameters: PresetParameters,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Preset {
    pub fn new(name: impl Into<String>, parameters: PresetParameters) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            is_default: false,
            parameters,
            created_at: now,
            updated_at: now,
        }
    }

    /// The factory preset flagged as default.
    pub fn builtin_default() -> Self {
        Self::new(DEFAULT_PRESET_NAME, PresetParameters::builtin_default()).as_default()
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_default_parameters() {
        let params = PresetParameters::builtin_default();
        assert_eq!(params.video_tracks, TrackSelection::First);
        assert_eq!(params.panels, vec!["Tiled Center Column".to_string()]);
        assert_eq!(params.filters.len(), FILTER_DEFINITIONS.len());
        assert_eq!(params.detectors.len(), DETECTOR_DEFINITIONS.len());

        let signalstats = params.filter("signalstats").unwrap();
        assert!(signalstats.enabled);
        let yavg = &signalstats.metrics["lavfi.signalstats.YAVG"];
        assert_eq!(yavg.severity.non_critical, Bound::range(16.0, 235.0));
        assert!(yavg.severity.critical.is_unbounded());
        assert_eq!(yavg.default_severity, Severity::NonCritical);

        assert!(!params.filter("blockdetect").unwrap().enabled);
        assert!(!params.filter("blurdetect").unwrap().enabled);

        let overlay = params.detector("overlaytext").unwrap();
        assert_eq!(overlay.params["min_confidence"], serde_json::json!(70.0));
        assert_eq!(
            overlay.params["flag_keywords"],
            serde_json::json!("click,press,error,warning,analyze")
        );
    }

    #[test]
    fn test_builtin_default_has_no_warnings() {
        assert!(PresetParameters::builtin_default().validate().is_empty());
    }

    #[test]
    fn test_normalize_fills_gaps_and_keeps_custom_entries() {
        let custom = FilterConfig::new("custom_luma").with_metric(
            "luma_avg",
            MetricThresholds::with_bounds(Bound::range(16.0, 235.0), Bound::range(8.0, 245.0)),
        );
        let partial_signalstats = FilterConfig::new("signalstats").with_metric(
            "lavfi.signalstats.YMIN",
            MetricThresholds::from_default_bound(Bound::min(10.0)),
        );
        let params = PresetParameters {
            panels: Vec::new(),
            filters: vec![custom.clone(), partial_signalstats],
            ..PresetParameters::default()
        }
        .normalize();

        assert_eq!(params.panels, default_panels());
        assert_eq!(params.filters[0].id, "signalstats");
        assert_eq!(params.filters.last().unwrap(), &custom);

        let signalstats = params.filter("signalstats").unwrap();
        assert_eq!(signalstats.metrics.len(), 3);
        assert_eq!(
            signalstats.metrics["lavfi.signalstats.YMIN"]
                .severity
                .non_critical,
            Bound::min(10.0)
        );
        assert_eq!(params.detectors.len(), DETECTOR_DEFINITIONS.len());
    }

    #[test]
    fn test_normalize_fills_missing_detector_params() {
        let mut black = DetectorConfig::new("blackdetect").with_default_severity(Severity::Critical);
        black
            .params
            .insert("duration".to_string(), serde_json::json!(1.0));
        let params = PresetParameters::default().with_detector(black).normalize();

        let black = params.detector("blackdetect").unwrap();
        assert_eq!(black.default_severity, Severity::Critical);
        assert_eq!(black.params["duration"], serde_json::json!(1.0));
        assert_eq!(black.params["picture_threshold"], serde_json::json!(0.98));
    }

    #[test]
    fn test_validate_reports_authoring_problems() {
        let params = PresetParameters::default()
            .with_filter(
                FilterConfig::new("signalstats")
                    .with_metric(
                        "lavfi.signalstats.YAVG",
                        MetricThresholds::with_bounds(
                            Bound::range(16.0, 235.0),
                            Bound::range(20.0, 250.0),
                        ),
                    )
                    .with_metric(
                        "lavfi.signalstats.YMIN",
                        MetricThresholds::from_default_bound(Bound::range(10.0, 5.0)),
                    ),
            )
            .with_detector(DetectorConfig::new("mystery"));

        let warnings = params.validate();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.contains(&PresetWarning::CriticalLooserThanNonCritical {
            source_id: "signalstats".to_string(),
            metric_key: Some("lavfi.signalstats.YAVG".to_string()),
        }));
        assert!(warnings.contains(&PresetWarning::ContradictoryBound {
            source_id: "signalstats".to_string(),
            metric_key: Some("lavfi.signalstats.YMIN".to_string()),
            tier: Severity::NonCritical,
        }));
        assert!(warnings.contains(&PresetWarning::UnknownSource {
            kind: SourceKind::Detector,
            source_id: "mystery".to_string(),
        }));
    }

    #[test]
    fn test_warning_serde_roundtrip() {
        let warnings = vec![
            PresetWarning::ContradictoryBound {
                source_id: "signalstats".to_string(),
                metric_key: Some("lavfi.signalstats.YMIN".to_string()),
                tier: Severity::Critical,
            },
            PresetWarning::CriticalLooserThanNonCritical {
                source_id: "entropy".to_string(),
                metric_key: None,
            },
            PresetWarning::UnknownSource {
                kind: SourceKind::Filter,
                source_id: "mystery".to_string(),
            },
        ];

        let json = serde_json::to_value(&warnings).unwrap();
        assert_eq!(json[0]["warning"], "contradictory_bound");
        assert_eq!(json[1]["warning"], "critical_looser_than_non_critical");
        assert_eq!(json[2]["warning"], "unknown_source");
        assert_eq!(json[2]["kind"], "filter");

        let back: Vec<PresetWarning> = serde_json::from_value(json).unwrap();
        assert_eq!(back, warnings);
    }

    #[test]
    fn test_lenient_parameters_deserialization() {
        let json = r#"{
            "video_tracks": "ALL",
            "audio_tracks": "bogus",
            "filters": [{
                "id": "signalstats",
                "enabled": true,
                "metrics": {
                    "lavfi.signalstats.YMAX": {
                        "severity": {"non_critical": {"max": "235"}, "critical": {"max": ""}},
                        "default_severity": "high"
                    }
                }
            }],
            "ffmpeg": [{"id": "blackdetect", "enabled": true}]
        }"#;
        let params: PresetParameters = serde_json::from_str(json).unwrap();
        assert_eq!(params.video_tracks, TrackSelection::All);
        assert_eq!(params.audio_tracks, TrackSelection::First);
        assert_eq!(params.panels, default_panels());

        let ymax = &params.filter("signalstats").unwrap().metrics["lavfi.signalstats.YMAX"];
        assert!(ymax.enabled);
        assert_eq!(ymax.severity.non_critical, Bound::max(235.0));
        assert!(ymax.severity.critical.is_unbounded());
        assert_eq!(ymax.default_severity, Severity::Critical);
        assert_eq!(params.detectors[0].id, "blackdetect");
    }

    #[test]
    fn test_metric_label() {
        assert_eq!(
            metric_label("signalstats", "lavfi.signalstats.YAVG"),
            "Luma Average (Y)"
        );
        assert_eq!(metric_label("custom", "luma_avg"), "luma_avg");
    }
}
