//! Rule group builders.
//!
//! - [`increase`]: request volume over the whole objective window
//! - [`burnrate`]: burn-rate recording rules and multi-window alerts
//! - [`generic`]: indicator-agnostic series for dashboards

pub mod burnrate;
pub mod generic;
pub mod group;
pub mod increase;

use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::matcher::Matcher;
use crate::promql::{Replacer, Template};

pub use burnrate::burnrate_rules;
pub use generic::generic_rules;
pub use group::{Rule, RuleFile, RuleGroup, SLO_LABEL, common_annotations, common_labels};
pub use increase::increase_rules;

/// Parses a template, applies the replacer and prints the result.
pub(crate) fn render(template: &Template, replacer: &Replacer<'_>) -> Result<String> {
    let mut expr = template.expr()?;
    replacer.replace(&mut expr);
    Ok(expr.to_string())
}

/// Sorted, deduplicated labels.
pub(crate) fn sorted_labels<'a>(labels: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    labels
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Removes grouped labels, their values are part of the series anyway.
pub(crate) fn remove_grouped(labels: &mut BTreeMap<String, String>, grouping: &[String]) {
    for g in grouping {
        labels.remove(g);
    }
}

/// Appends `slo="<name>"` to a matcher list.
pub(crate) fn with_slo_matcher(mut matchers: Vec<Matcher>, slo: &str) -> Vec<Matcher> {
    matchers.push(Matcher::equal(SLO_LABEL, slo));
    matchers
}
