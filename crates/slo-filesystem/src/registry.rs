//! In-memory registry of the objectives read from disk.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use slo_rules::{DEFAULT_PROPAGATION_PREFIX, Matcher, Objective, parse_metric_selector};

use crate::error::Result;

/// Objectives keyed by their label identity.
///
/// Cloning is cheap; clones share the same map.
#[derive(Debug, Clone)]
pub struct ObjectiveRegistry {
    objectives: Arc<RwLock<HashMap<String, Objective>>>,
    prefix: String,
}

impl ObjectiveRegistry {
    /// Creates an empty registry. `prefix` is the propagation prefix tried
    /// when a matcher names a label the objective does not carry.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            objectives: Arc::new(RwLock::new(HashMap::new())),
            prefix: prefix.into(),
        }
    }

    /// Inserts or replaces an objective.
    pub fn set(&self, objective: Objective) {
        self.objectives.write().insert(objective.identity(), objective);
    }

    /// Returns the objective with the given identity.
    #[must_use]
    pub fn get(&self, identity: &str) -> Option<Objective> {
        self.objectives.read().get(identity).cloned()
    }

    /// Number of objectives.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objectives.read().len()
    }

    /// Returns true if no objective is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objectives.read().is_empty()
    }

    /// Returns the objectives selected by all matchers, sorted by identity.
    ///
    /// A matcher selects an objective when the objective's label matches,
    /// when the prefixed label matches and the plain label is missing, or
    /// when the objective is grouped by the matcher's label. No matchers
    /// selects everything.
    #[must_use]
    pub fn match_objectives(&self, matchers: &[Matcher]) -> Vec<Objective> {
        let objectives = self.objectives.read();
        let mut matched: Vec<Objective> = objectives
            .values()
            .filter(|o| matchers.iter().all(|m| self.selects(m, o)))
            .cloned()
            .collect();
        drop(objectives);

        matched.sort_by_cached_key(Objective::identity);
        matched
    }

    /// Like [`Self::match_objectives`] with matchers parsed from a selector
    /// such as `{team="foo"}`. An empty expression selects everything.
    ///
    /// # Errors
    ///
    /// Returns `RuleError::InvalidSelector` if the expression does not parse.
    pub fn match_expr(&self, expr: &str) -> Result<Vec<Objective>> {
        if expr.trim().is_empty() {
            return Ok(self.match_objectives(&[]));
        }
        let selector = parse_metric_selector(expr)?;
        Ok(self.match_objectives(selector.matchers()))
    }

    fn selects(&self, matcher: &Matcher, objective: &Objective) -> bool {
        let labels = objective.labels();
        let mut value = labels.get_or_empty(matcher.name());
        if value.is_empty() && !self.prefix.is_empty() {
            value = labels.get_or_empty(&format!("{}{}", self.prefix, matcher.name()));
        }
        matcher.matches(value) || objective.is_grouped_by(matcher.name())
    }
}

impl Default for ObjectiveRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_PROPAGATION_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use slo_rules::{Indicator, MatchType, Metric};
    use test_case::test_case;

    use super::*;

    fn objective(name: &str, labels: &[(&str, &str)], grouping: &[&str]) -> Objective {
        let indicator = Indicator::BoolGauge {
            metric: Metric::new("up", []),
        };
        let mut builder = Objective::builder(name, 0.99, Duration::from_secs(3600), indicator)
            .grouping(grouping.iter().copied());
        for (k, v) in labels {
            builder = builder.label(*k, *v);
        }
        builder.build().unwrap()
    }

    fn registry() -> ObjectiveRegistry {
        let registry = ObjectiveRegistry::default();
        registry.set(objective("obj1", &[("foo", "bar")], &[]));
        registry.set(objective("obj2", &[("foo", "bar"), ("ying", "yang")], &[]));
        registry.set(objective("obj3", &[("foo", "bar"), ("yes", "no")], &[]));
        registry.set(objective("obj4", &[("foo", "baz")], &[]));
        registry
    }

    fn names(objectives: &[Objective]) -> Vec<&str> {
        objectives.iter().map(Objective::name).collect()
    }

    #[test]
    fn no_matchers_returns_all() {
        let registry = registry();
        assert_eq!(registry.len(), 4);
        assert_eq!(
            names(&registry.match_objectives(&[])),
            ["obj1", "obj2", "obj3", "obj4"]
        );
    }

    #[test_case(&[("foo", "foo")], &[] ; "no match")]
    #[test_case(&[("foo", "bar")], &["obj1", "obj2", "obj3"] ; "shared label")]
    #[test_case(&[("foo", "baz")], &["obj4"] ; "single")]
    #[test_case(&[("foo", "bar"), ("ying", "yang")], &["obj2"] ; "two matchers")]
    #[test_case(&[("__name__", "obj3")], &["obj3"] ; "by name")]
    fn equality_matchers(matchers: &[(&str, &str)], expected: &[&str]) {
        let matchers: Vec<Matcher> = matchers.iter().map(|(k, v)| Matcher::equal(*k, *v)).collect();
        assert_eq!(names(&registry().match_objectives(&matchers)), expected);
    }

    #[test]
    fn regex_matcher() {
        let matchers = [Matcher::new(MatchType::Regex, "foo", "ba.").unwrap()];
        assert_eq!(registry().match_objectives(&matchers).len(), 4);
    }

    #[test]
    fn set_replaces_same_identity() {
        let registry = registry();
        registry.set(objective("obj1", &[("foo", "bar")], &["handler"]));
        assert_eq!(registry.len(), 4);
        let stored = registry.get(r#"{__name__="obj1", foo="bar"}"#).unwrap();
        assert_eq!(stored.grouping(), ["handler"]);
    }

    #[test]
    fn grouped_objective_matches_any_value() {
        let registry = registry();
        registry.set(objective("grouped", &[], &["handler"]));

        let matched = registry.match_objectives(&[Matcher::equal("handler", "/api/v1/users")]);
        assert_eq!(names(&matched), ["grouped"]);
    }

    #[test]
    fn falls_back_to_prefixed_label() {
        let registry = ObjectiveRegistry::default();
        registry.set(objective("team-slo", &[("pyrra.dev/team", "payments")], &[]));

        let matched = registry.match_objectives(&[Matcher::equal("team", "payments")]);
        assert_eq!(names(&matched), ["team-slo"]);
        assert!(registry
            .match_objectives(&[Matcher::equal("team", "search")])
            .is_empty());

        let unprefixed = ObjectiveRegistry::new("");
        unprefixed.set(objective("team-slo", &[("pyrra.dev/team", "payments")], &[]));
        assert!(unprefixed
            .match_objectives(&[Matcher::equal("team", "payments")])
            .is_empty());
    }

    #[test]
    fn match_expr_parses_selector() {
        let registry = registry();
        assert_eq!(registry.match_expr("").unwrap().len(), 4);
        assert_eq!(
            names(&registry.match_expr(r#"{foo="bar",yes="no"}"#).unwrap()),
            ["obj3"]
        );
        assert!(registry.match_expr("{foo=").is_err());
    }
}
