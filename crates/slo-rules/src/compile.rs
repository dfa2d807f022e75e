//! Assembles all rule groups of one objective.

use tracing::debug;

use crate::error::{Result, RuleError};
use crate::rules::{RuleFile, RuleGroup, burnrate_rules, generic_rules, increase_rules};
use crate::types::{GenerationOptions, Objective};

/// The rule groups of one objective.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRules {
    /// Increase rules over the objective window and absent alerts.
    pub increase: RuleGroup,
    /// Burn-rate rules and their alerts.
    pub burnrates: RuleGroup,
    /// Generic rules, when requested and supported.
    pub generic: Option<RuleGroup>,
}

impl CompiledRules {
    /// All groups in output order.
    #[must_use]
    pub fn into_rule_file(self) -> RuleFile {
        let mut groups = vec![self.increase, self.burnrates];
        groups.extend(self.generic);
        RuleFile { groups }
    }
}

/// Compiles an objective into its rule groups.
///
/// The same objective and options always produce identical groups. When
/// generic rules are requested for a grouped objective they are left out and
/// the remaining groups are still returned.
///
/// # Errors
///
/// Returns `RuleError::Template` if an internal template is malformed.
pub fn compile(objective: &Objective, options: &GenerationOptions) -> Result<CompiledRules> {
    let increase = increase_rules(objective, options)?;
    let burnrates = burnrate_rules(objective, options)?;

    let generic = if options.generic_rules {
        match generic_rules(objective, options) {
            Ok(group) => Some(group),
            Err(RuleError::GroupingUnsupported) => {
                debug!(slo = objective.name(), "skipping generic rules for grouped objective");
                None
            }
            Err(e) => return Err(e),
        }
    } else {
        None
    };

    Ok(CompiledRules {
        increase,
        burnrates,
        generic,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::matcher::{MatchType, Matcher};
    use crate::types::{Indicator, Metric};

    const FOUR_WEEKS: Duration = Duration::from_secs(28 * 24 * 3600);

    fn objective(grouping: &[&str]) -> Objective {
        let indicator = Indicator::Ratio {
            errors: Metric::new(
                "http_requests_total",
                [
                    Matcher::equal("job", "app"),
                    Matcher::new(MatchType::Regex, "status", "5..").unwrap(),
                ],
            ),
            total: Metric::new("http_requests_total", [Matcher::equal("job", "app")]),
        };
        Objective::builder("http-errors", 0.995, FOUR_WEEKS, indicator)
            .grouping(grouping.iter().copied())
            .build()
            .unwrap()
    }

    fn with_generic() -> GenerationOptions {
        GenerationOptions {
            generic_rules: true,
            ..GenerationOptions::default()
        }
    }

    #[test]
    fn ratio_objective_compiles_to_three_groups() {
        let compiled = compile(&objective(&[]), &with_generic()).unwrap();
        assert_eq!(compiled.burnrates.records().count(), 7);
        assert_eq!(compiled.burnrates.alerts().count(), 4);
        assert!(compiled.generic.is_some());

        let names: Vec<_> = compiled
            .into_rule_file()
            .groups
            .into_iter()
            .map(|g| g.name)
            .collect();
        assert_eq!(names, ["http-errors-increase", "http-errors", "http-errors-generic"]);
    }

    #[test]
    fn generic_rules_are_opt_in() {
        let compiled = compile(&objective(&[]), &GenerationOptions::default()).unwrap();
        assert!(compiled.generic.is_none());
        assert_eq!(compiled.into_rule_file().groups.len(), 2);
    }

    #[test]
    fn grouped_objective_skips_generic_rules() {
        let compiled = compile(&objective(&["handler"]), &with_generic()).unwrap();
        assert!(compiled.generic.is_none());
        assert_eq!(compiled.burnrates.records().count(), 7);
    }

    #[test]
    fn output_is_deterministic() {
        let first = serde_yaml::to_string(
            &compile(&objective(&["route", "handler"]), &with_generic())
                .unwrap()
                .into_rule_file(),
        )
        .unwrap();
        for _ in 0..5 {
            let again = serde_yaml::to_string(
                &compile(&objective(&["handler", "route"]), &with_generic())
                    .unwrap()
                    .into_rule_file(),
            )
            .unwrap();
            assert_eq!(again, first);
        }
    }
}
