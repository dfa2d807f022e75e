//! The `ServiceLevelObjective` file format.
//!
//! Each file holds one objective in the Kubernetes resource layout:
//!
//! ```yaml
//! apiVersion: pyrra.dev/v1alpha1
//! kind: ServiceLevelObjective
//! metadata:
//!   name: http-errors
//!   namespace: monitoring
//! spec:
//!   target: "99.5"
//!   window: 4w
//!   indicator:
//!     ratio:
//!       errors:
//!         metric: http_requests_total{code=~"5.."}
//!       total:
//!         metric: http_requests_total
//! ```
//!
//! Unknown fields are rejected.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use slo_rules::{Alerting, BurnRateType, Indicator, Objective, parse_duration, parse_metric_selector};

use crate::error::{FilesystemError, Result};

/// A parsed objective file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectiveFile {
    /// API version, e.g. `pyrra.dev/v1alpha1`.
    #[serde(rename = "apiVersion", default)]
    pub api_version: String,
    /// Resource kind, e.g. `ServiceLevelObjective`.
    #[serde(default)]
    pub kind: String,
    /// Name and labels.
    pub metadata: Metadata,
    /// The objective itself.
    pub spec: Spec,
}

/// Object metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metadata {
    /// Objective name.
    pub name: String,
    /// Optional namespace, becomes the `namespace` label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Labels. Only prefixed labels are kept on the objective.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Objective target, given in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    /// `target: 99.5`
    Number(f64),
    /// `target: "99.5"`
    Text(String),
}

impl Target {
    /// The target as a ratio in (0, 1).
    fn ratio(&self) -> Result<f64> {
        let percent = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<f64>().map_err(|e| {
                FilesystemError::InvalidObjective(format!("target {s:?} is not a number: {e}"))
            })?,
        };
        Ok(percent / 100.0)
    }
}

/// Objective spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Spec {
    /// Target in percent.
    pub target: Target,
    /// Window, e.g. `4w`.
    pub window: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Alerting switches, both on by default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alerting: Option<AlertingSpec>,
    /// The indicator.
    pub indicator: IndicatorSpec,
}

/// Alerting switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlertingSpec {
    /// Emit burn-rate alerts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burnrates: Option<bool>,
    /// Emit absent alerts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absent: Option<bool>,
    /// `static` or `dynamic` burn-rate thresholds.
    #[serde(
        default,
        rename = "burnRateType",
        skip_serializing_if = "Option::is_none"
    )]
    pub burn_rate_type: Option<BurnRateType>,
}

/// Indicator section. Exactly one field must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndicatorSpec {
    /// Errors over total.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratio: Option<RatioSpec>,
    /// Classic histogram latency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<LatencySpec>,
    /// Native histogram latency.
    #[serde(rename = "latencyNative", default, skip_serializing_if = "Option::is_none")]
    pub latency_native: Option<LatencyNativeSpec>,
    /// 0/1 gauge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bool_gauge: Option<BoolGaugeSpec>,
}

/// A metric selector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Query {
    /// Selector text, e.g. `http_requests_total{job="api"}`.
    pub metric: String,
}

/// Ratio indicator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RatioSpec {
    /// Failed requests.
    pub errors: Query,
    /// All requests.
    pub total: Query,
    /// Labels to keep on the recording rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grouping: Vec<String>,
}

/// Latency indicator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LatencySpec {
    /// Bucket of requests that met the target.
    pub success: Query,
    /// All requests.
    pub total: Query,
    /// Labels to keep on the recording rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grouping: Vec<String>,
}

/// Native histogram latency indicator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LatencyNativeSpec {
    /// Latency target, e.g. `100ms`.
    pub latency: String,
    /// The native histogram.
    pub total: Query,
    /// Labels to keep on the recording rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grouping: Vec<String>,
}

/// Bool gauge indicator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoolGaugeSpec {
    /// Selector of the gauge.
    pub metric: String,
    /// Labels to keep on the recording rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grouping: Vec<String>,
}

impl ObjectiveFile {
    /// Decodes a file.
    ///
    /// # Errors
    ///
    /// Returns `FilesystemError::Decode` on malformed YAML or unknown fields.
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Converts the file into an objective.
    ///
    /// Labels are `__name__`, `namespace` when set, and metadata labels
    /// starting with `prefix`. `config` is kept as the raw file text.
    ///
    /// # Errors
    ///
    /// Returns an error if a selector, the window or the target is invalid,
    /// or if not exactly one indicator is set.
    pub fn to_objective(&self, prefix: &str, config: &str) -> Result<Objective> {
        let target = self.spec.target.ratio()?;
        let window = parse_duration(&self.spec.window)?;
        let (indicator, grouping) = self.spec.indicator.build()?;

        let alerting = self.spec.alerting.unwrap_or_default();
        let alerting = Alerting {
            burnrates: alerting.burnrates.unwrap_or(true),
            absent: alerting.absent.unwrap_or(true),
            burn_rate_type: alerting.burn_rate_type.unwrap_or_default(),
        };

        let mut builder = Objective::builder(&self.metadata.name, target, window, indicator)
            .grouping(grouping)
            .alerting(alerting)
            .description(self.spec.description.clone().unwrap_or_default())
            .config(config);

        if let Some(namespace) = self.metadata.namespace.as_deref().filter(|n| !n.is_empty()) {
            builder = builder.label("namespace", namespace);
        }
        if !prefix.is_empty() {
            for (name, value) in &self.metadata.labels {
                if name.starts_with(prefix) {
                    builder = builder.label(name, value);
                }
            }
        }
        for (name, value) in &self.metadata.annotations {
            builder = builder.annotation(name, value);
        }

        Ok(builder.build()?)
    }
}

impl IndicatorSpec {
    fn build(&self) -> Result<(Indicator, Vec<String>)> {
        let mut grouping = Vec::new();

        let ratio = match &self.ratio {
            Some(r) => {
                grouping.clone_from(&r.grouping);
                Some((
                    parse_metric_selector(&r.errors.metric)?,
                    parse_metric_selector(&r.total.metric)?,
                ))
            }
            None => None,
        };
        let latency = match &self.latency {
            Some(l) => {
                grouping.clone_from(&l.grouping);
                Some((
                    parse_metric_selector(&l.success.metric)?,
                    parse_metric_selector(&l.total.metric)?,
                ))
            }
            None => None,
        };
        let latency_native = match &self.latency_native {
            Some(n) => {
                grouping.clone_from(&n.grouping);
                Some((
                    parse_duration(&n.latency)?,
                    parse_metric_selector(&n.total.metric)?,
                ))
            }
            None => None,
        };
        let bool_gauge = match &self.bool_gauge {
            Some(b) => {
                grouping.clone_from(&b.grouping);
                Some(parse_metric_selector(&b.metric)?)
            }
            None => None,
        };

        let indicator = Indicator::from_parts(ratio, latency, latency_native, bool_gauge)?;
        Ok((indicator, grouping))
    }
}

/// Reads and converts an objective file.
///
/// # Errors
///
/// Returns `FilesystemError::Read` if the file cannot be read, otherwise the
/// errors of [`ObjectiveFile::from_yaml`] and [`ObjectiveFile::to_objective`].
pub fn read_objective(path: &Path, prefix: &str) -> Result<Objective> {
    let text = std::fs::read_to_string(path).map_err(|source| FilesystemError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ObjectiveFile::from_yaml(&text)?.to_objective(prefix, &text)
}
