//! Core types describing a service level objective.
//!
//! - [`Labels`]: the identity of an objective
//! - [`Metric`]: a vector selector fragment
//! - [`Indicator`]: the service level indicator, exactly one of four kinds
//! - [`Objective`]: the validated objective consumed by the compiler
//! - [`GenerationOptions`]: flags threaded through every compile call

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::format_duration;
use crate::error::{Result, RuleError};
use crate::matcher::{METRIC_NAME_LABEL, MatchType, Matcher, quote};
use crate::window::{MIN_WINDOW, WindowPlanner};

/// Label prefix marking objective labels and annotations that are copied
/// onto generated rules.
pub const DEFAULT_PROPAGATION_PREFIX: &str = "pyrra.dev/";

/// A sorted set of labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Labels(BTreeMap<String, String>);

impl Labels {
    /// Creates an empty label set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a label set from name/value pairs. Later pairs win.
    #[must_use]
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Sets a label.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Returns the value of a label, or `None` if absent.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Returns the value of a label, or the empty string if absent.
    #[must_use]
    pub fn get_or_empty(&self, name: &str) -> &str {
        self.get(name).unwrap_or_default()
    }

    /// Returns the `__name__` label.
    #[must_use]
    pub fn name(&self) -> &str {
        self.get_or_empty(METRIC_NAME_LABEL)
    }

    /// Iterates over labels in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no labels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The deterministic identity string, e.g. `{__name__="api", team="a"}`.
    #[must_use]
    pub fn identity(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={}", quote(value))?;
        }
        f.write_str("}")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Labels {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::from_pairs(iter)
    }
}

/// A metric selector fragment: a metric name and its label matchers.
///
/// The matchers always contain a `__name__` matcher equal to the name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metric {
    name: String,
    matchers: Vec<Matcher>,
    offset: Duration,
}

impl Metric {
    /// Creates a metric, appending the `__name__` matcher if it is missing and
    /// dropping duplicate matchers.
    #[must_use]
    pub fn new(name: impl Into<String>, matchers: impl IntoIterator<Item = Matcher>) -> Self {
        let name = name.into();
        let mut unique: Vec<Matcher> = Vec::new();
        for m in matchers {
            if !unique.contains(&m) {
                unique.push(m);
            }
        }
        let has_name = unique
            .iter()
            .any(|m| m.name() == METRIC_NAME_LABEL && m.match_type() == MatchType::Equal);
        if !has_name && !name.is_empty() {
            unique.push(Matcher::equal(METRIC_NAME_LABEL, name.clone()));
        }

        Self {
            name,
            matchers: unique,
            offset: Duration::ZERO,
        }
    }

    /// Sets the offset the selector was written with.
    #[must_use]
    pub const fn with_offset(mut self, offset: Duration) -> Self {
        self.offset = offset;
        self
    }

    /// The metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All label matchers, including `__name__`.
    #[must_use]
    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    /// The original offset, zero when none was given.
    #[must_use]
    pub const fn offset(&self) -> Duration {
        self.offset
    }

    /// Matchers other than `__name__`.
    pub fn label_matchers(&self) -> impl Iterator<Item = &Matcher> {
        self.matchers.iter().filter(|m| m.name() != METRIC_NAME_LABEL)
    }

    /// Returns a copy of the matchers with the `__name__` matcher renamed.
    #[must_use]
    pub fn matchers_renamed(&self, metric: &str) -> Vec<Matcher> {
        self.matchers
            .iter()
            .map(|m| {
                if m.name() == METRIC_NAME_LABEL {
                    Matcher::equal(METRIC_NAME_LABEL, metric)
                } else {
                    m.clone()
                }
            })
            .collect()
    }
}

/// The kind of an [`Indicator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    /// Errors over total requests.
    Ratio,
    /// Classic histogram latency.
    Latency,
    /// Native histogram latency.
    LatencyNative,
    /// Gauge of 0/1 values.
    BoolGauge,
}

impl IndicatorKind {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ratio => "ratio",
            Self::Latency => "latency",
            Self::LatencyNative => "latency_native",
            Self::BoolGauge => "bool_gauge",
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The service level indicator of an objective.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Indicator {
    /// Fraction of requests that are errors.
    Ratio {
        /// Selector for failed requests.
        errors: Metric,
        /// Selector for all requests.
        total: Metric,
    },
    /// Fraction of requests slower than a bucket boundary.
    Latency {
        /// Bucket selector of requests that met the latency target.
        success: Metric,
        /// Count selector of all requests.
        total: Metric,
    },
    /// Fraction of requests slower than a latency, over a native histogram.
    LatencyNative {
        /// The latency target.
        latency: Duration,
        /// Selector of the native histogram.
        total: Metric,
    },
    /// Fraction of zero samples of a 0/1 gauge.
    BoolGauge {
        /// Selector of the gauge.
        metric: Metric,
    },
}

impl Indicator {
    /// Builds an indicator from optional parts, failing unless exactly one is set.
    pub fn from_parts(
        ratio: Option<(Metric, Metric)>,
        latency: Option<(Metric, Metric)>,
        latency_native: Option<(Duration, Metric)>,
        bool_gauge: Option<Metric>,
    ) -> Result<Self> {
        let set = usize::from(ratio.is_some())
            + usize::from(latency.is_some())
            + usize::from(latency_native.is_some())
            + usize::from(bool_gauge.is_some());
        match set {
            0 => return Err(RuleError::invalid_objective("no indicator set")),
            1 => {}
            n => {
                return Err(RuleError::invalid_objective(format!(
                    "exactly one indicator must be set, found {n}"
                )));
            }
        }

        if let Some((errors, total)) = ratio {
            return Ok(Self::Ratio { errors, total });
        }
        if let Some((success, total)) = latency {
            return Ok(Self::Latency { success, total });
        }
        if let Some((latency, total)) = latency_native {
            return Ok(Self::LatencyNative { latency, total });
        }
        bool_gauge
            .map(|metric| Self::BoolGauge { metric })
            .ok_or_else(|| RuleError::invalid_objective("no indicator set"))
    }

    /// The kind of this indicator.
    #[must_use]
    pub const fn kind(&self) -> IndicatorKind {
        match self {
            Self::Ratio { .. } => IndicatorKind::Ratio,
            Self::Latency { .. } => IndicatorKind::Latency,
            Self::LatencyNative { .. } => IndicatorKind::LatencyNative,
            Self::BoolGauge { .. } => IndicatorKind::BoolGauge,
        }
    }

    /// The selector that counts all events.
    #[must_use]
    pub const fn total(&self) -> &Metric {
        match self {
            Self::Ratio { total, .. }
            | Self::Latency { total, .. }
            | Self::LatencyNative { total, .. } => total,
            Self::BoolGauge { metric } => metric,
        }
    }
}

/// How burn-rate alert thresholds are derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BurnRateType {
    /// A fixed multiple of the error budget per tier.
    #[default]
    Static,
    /// Scaled by how much traffic the alert window saw compared to the
    /// whole objective window.
    Dynamic,
}

impl BurnRateType {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Dynamic => "dynamic",
        }
    }
}

impl fmt::Display for BurnRateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alerting switches of an objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alerting {
    /// Emit multi-burn-rate alerts next to the burn-rate recording rules.
    pub burnrates: bool,
    /// Emit alerts for absent indicator metrics.
    pub absent: bool,
    /// Threshold kind of the burn-rate alerts.
    #[serde(default)]
    pub burn_rate_type: BurnRateType,
}

impl Default for Alerting {
    fn default() -> Self {
        Self {
            burnrates: true,
            absent: true,
            burn_rate_type: BurnRateType::Static,
        }
    }
}

/// A validated service level objective.
#[derive(Debug, Clone, PartialEq)]
pub struct Objective {
    labels: Labels,
    annotations: BTreeMap<String, String>,
    target: f64,
    window: Duration,
    indicator: Indicator,
    grouping: Vec<String>,
    alerting: Alerting,
    description: String,
    config: String,
}

impl Objective {
    /// Creates a builder for an objective.
    pub fn builder(
        name: impl Into<String>,
        target: f64,
        window: Duration,
        indicator: Indicator,
    ) -> ObjectiveBuilder {
        ObjectiveBuilder::new(name, target, window, indicator)
    }

    /// The objective labels, including `__name__`.
    #[must_use]
    pub const fn labels(&self) -> &Labels {
        &self.labels
    }

    /// The name of the objective.
    #[must_use]
    pub fn name(&self) -> &str {
        self.labels.name()
    }

    /// The registry identity.
    #[must_use]
    pub fn identity(&self) -> String {
        self.labels.identity()
    }

    /// Free-form annotations.
    #[must_use]
    pub const fn annotations(&self) -> &BTreeMap<String, String> {
        &self.annotations
    }

    /// The target in (0, 1).
    #[must_use]
    pub const fn target(&self) -> f64 {
        self.target
    }

    /// The objective window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// The indicator.
    #[must_use]
    pub const fn indicator(&self) -> &Indicator {
        &self.indicator
    }

    /// Grouping labels, sorted and deduplicated.
    #[must_use]
    pub fn grouping(&self) -> &[String] {
        &self.grouping
    }

    /// Returns true if the objective groups by the given label.
    #[must_use]
    pub fn is_grouped_by(&self, label: &str) -> bool {
        self.grouping.iter().any(|g| g == label)
    }

    /// Alerting switches.
    #[must_use]
    pub const fn alerting(&self) -> Alerting {
        self.alerting
    }

    /// Human description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The raw configuration the objective was read from.
    #[must_use]
    pub fn config(&self) -> &str {
        &self.config
    }
}

/// Builder for [`Objective`].
#[derive(Debug)]
pub struct ObjectiveBuilder {
    labels: Labels,
    annotations: BTreeMap<String, String>,
    target: f64,
    window: Duration,
    indicator: Indicator,
    grouping: Vec<String>,
    alerting: Alerting,
    description: String,
    config: String,
}

impl ObjectiveBuilder {
    fn new(name: impl Into<String>, target: f64, window: Duration, indicator: Indicator) -> Self {
        let mut labels = Labels::new();
        labels.insert(METRIC_NAME_LABEL, name);
        Self {
            labels,
            annotations: BTreeMap::new(),
            target,
            window,
            indicator,
            grouping: Vec::new(),
            alerting: Alerting::default(),
            description: String::new(),
            config: String::new(),
        }
    }

    /// Adds a label. Setting `__name__` renames the objective.
    #[must_use]
    pub fn label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(name, value);
        self
    }

    /// Adds an annotation.
    #[must_use]
    pub fn annotation(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(name.into(), value.into());
        self
    }

    /// Sets the grouping labels.
    #[must_use]
    pub fn grouping<S: Into<String>>(mut self, grouping: impl IntoIterator<Item = S>) -> Self {
        self.grouping = grouping.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the alerting switches.
    #[must_use]
    pub const fn alerting(mut self, alerting: Alerting) -> Self {
        self.alerting = alerting;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Keeps the raw configuration text.
    #[must_use]
    pub fn config(mut self, config: impl Into<String>) -> Self {
        self.config = config.into();
        self
    }

    /// Validates and builds the objective.
    ///
    /// # Errors
    ///
    /// Returns `RuleError::InvalidObjective` if:
    /// - the name is empty
    /// - the target is not in (0, 1)
    /// - the window is shorter than [`MIN_WINDOW`]
    pub fn build(mut self) -> Result<Objective> {
        if self.labels.name().is_empty() {
            return Err(RuleError::invalid_objective("name cannot be empty"));
        }
        if !(self.target > 0.0 && self.target < 1.0) {
            return Err(RuleError::invalid_objective(format!(
                "target {} must be between 0 and 1",
                self.target
            )));
        }
        if self.window < MIN_WINDOW {
            return Err(RuleError::invalid_objective(format!(
                "window {} must be at least {}",
                format_duration(self.window),
                format_duration(MIN_WINDOW)
            )));
        }

        self.grouping.sort();
        self.grouping.dedup();

        Ok(Objective {
            labels: self.labels,
            annotations: self.annotations,
            target: self.target,
            window: self.window,
            indicator: self.indicator,
            grouping: self.grouping,
            alerting: self.alerting,
            description: self.description,
            config: self.config,
        })
    }
}

/// Options controlling rule generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOptions {
    /// Rewrite integer `le` matchers so they also match Prometheus 3 bucket labels.
    pub enable_prometheus3_migration: bool,
    /// Produce the indicator-agnostic generic rule group.
    pub generic_rules: bool,
    /// Prefix of objective labels and annotations copied onto rules.
    pub propagation_prefix: String,
    /// Derives the alerting tiers.
    pub window_planner: WindowPlanner,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            enable_prometheus3_migration: false,
            generic_rules: false,
            propagation_prefix: DEFAULT_PROPAGATION_PREFIX.to_string(),
            window_planner: WindowPlanner::default(),
        }
    }
}
