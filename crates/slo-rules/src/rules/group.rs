//! Prometheus rule group types and the labels shared by all generated rules.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::matcher::{METRIC_NAME_LABEL, MatchType, Matcher};
use crate::types::Objective;

/// Label carrying the objective name on every generated rule.
pub const SLO_LABEL: &str = "slo";

/// A Prometheus rule file: `groups: [...]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFile {
    /// The rule groups, in output order.
    pub groups: Vec<RuleGroup>,
}

/// A named group of rules evaluated at a common interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleGroup {
    /// Group name, unique within a file.
    pub name: String,
    /// Evaluation interval, e.g. `30s`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    /// Recording and alerting rules.
    pub rules: Vec<Rule>,
}

impl RuleGroup {
    /// Creates a group.
    #[must_use]
    pub fn new(name: impl Into<String>, interval: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            name: name.into(),
            interval: Some(interval.into()),
            rules,
        }
    }

    /// Recording rules of the group.
    pub fn records(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.record.is_some())
    }

    /// Alerting rules of the group.
    pub fn alerts(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.alert.is_some())
    }
}

/// A recording rule (`record`) or an alerting rule (`alert`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Name of the recorded series.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<String>,
    /// Name of the alert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
    /// The PromQL expression.
    pub expr: String,
    /// How long the alert condition must hold before firing.
    #[serde(rename = "for", default, skip_serializing_if = "Option::is_none")]
    pub for_duration: Option<String>,
    /// Labels attached to the result.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Alert annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Rule {
    /// Creates a recording rule.
    #[must_use]
    pub fn record(
        name: impl Into<String>,
        expr: impl Into<String>,
        labels: BTreeMap<String, String>,
    ) -> Self {
        Self {
            record: Some(name.into()),
            expr: expr.into(),
            labels,
            ..Self::default()
        }
    }

    /// Creates an alerting rule.
    #[must_use]
    pub fn alert(
        name: impl Into<String>,
        expr: impl Into<String>,
        for_duration: impl Into<String>,
        labels: BTreeMap<String, String>,
        annotations: BTreeMap<String, String>,
    ) -> Self {
        Self {
            alert: Some(name.into()),
            expr: expr.into(),
            for_duration: Some(for_duration.into()),
            labels,
            annotations,
            ..Self::default()
        }
    }
}

/// `slo=<name>` plus objective labels carrying the propagation prefix, with
/// the prefix removed.
#[must_use]
pub fn common_labels(objective: &Objective, prefix: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(SLO_LABEL.to_string(), objective.name().to_string());
    for (name, value) in objective.labels().iter() {
        if let Some(stripped) = strip_prefix(name, prefix) {
            labels.insert(stripped.to_string(), value.to_string());
        }
    }
    labels
}

/// Objective annotations carrying the propagation prefix, with the prefix removed.
#[must_use]
pub fn common_annotations(objective: &Objective, prefix: &str) -> BTreeMap<String, String> {
    objective
        .annotations()
        .iter()
        .filter_map(|(name, value)| {
            strip_prefix(name, prefix).map(|stripped| (stripped.to_string(), value.clone()))
        })
        .collect()
}

fn strip_prefix<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return None;
    }
    name.strip_prefix(prefix).filter(|s| !s.is_empty())
}

/// Adds the equality matchers of a selector, other than `__name__`, as labels.
pub(crate) fn add_equal_matchers(labels: &mut BTreeMap<String, String>, matchers: &[Matcher]) {
    for m in matchers {
        if m.match_type() == MatchType::Equal && m.name() != METRIC_NAME_LABEL {
            labels.insert(m.name().to_string(), m.value().to_string());
        }
    }
}
