//! Prometheus 3 bucket label compatibility.
//!
//! Prometheus 3 normalizes classic histogram `le` labels to floats, so a
//! bucket stored as `le="1"` by Prometheus 2 is stored as `le="1.0"` after an
//! upgrade. Integer boundaries are rewritten to a regex matching both
//! spellings so rules keep selecting the bucket across the upgrade.
//!
//! Native histogram latencies are written into `le` labels with
//! [`format_bucket_bound`], in the shortest of plain and exponent notation.

use crate::matcher::{BUCKET_LABEL, MatchType, Matcher};
use crate::types::GenerationOptions;

/// Rewrites an integer `le="<n>"` matcher to `le=~"<n>(\.0)?"`.
///
/// Empty values, `+Inf`, values containing a `.`, non-integers, other labels
/// and non-equality matchers are returned unchanged.
#[must_use]
pub fn convert_le_matcher(matcher: &Matcher) -> Matcher {
    if matcher.name() != BUCKET_LABEL || matcher.match_type() != MatchType::Equal {
        return matcher.clone();
    }

    let value = matcher.value();
    if value.is_empty() || value == "+Inf" || value.contains('.') || value.parse::<i64>().is_err() {
        return matcher.clone();
    }

    Matcher::new(MatchType::Regex, BUCKET_LABEL, format!(r"{value}(\.0)?"))
        .unwrap_or_else(|_| matcher.clone())
}

/// Applies [`convert_le_matcher`] to every matcher when the migration is enabled.
#[must_use]
pub fn convert_le_matchers(matchers: &[Matcher], options: &GenerationOptions) -> Vec<Matcher> {
    if options.enable_prometheus3_migration {
        matchers.iter().map(convert_le_matcher).collect()
    } else {
        matchers.to_vec()
    }
}

/// Formats a bucket boundary with six significant digits.
///
/// Exponents below -4 or from 6 up use exponent notation with at least two
/// exponent digits, e.g. `1e-05` and `1e+06`; everything else is plain. Trailing
/// zeros are dropped.
#[must_use]
pub fn format_bucket_bound(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    if value.is_nan() {
        return "NaN".to_string();
    }

    // Round to six significant digits first, the exponent may change.
    let scientific = format!("{value:.5e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return value.to_string();
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return value.to_string();
    };

    if (-4..6).contains(&exponent) {
        let decimals = (5 - exponent).max(0) as usize;
        trim_fraction(&format!("{value:.decimals$}")).to_string()
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_fraction(mantissa), exponent.abs())
    }
}

fn trim_fraction(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}
