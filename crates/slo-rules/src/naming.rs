//! Names of generated recording rules.

use std::time::Duration;

use crate::duration::format_duration;

/// `http_requests_total` at 5m becomes `http_requests:burnrate5m`.
#[must_use]
pub fn burnrate_name(metric: &str, window: Duration) -> String {
    let metric = metric.strip_suffix("_total").unwrap_or(metric);
    let metric = metric.strip_suffix("_count").unwrap_or(metric);
    format!("{metric}:burnrate{}", format_duration(window))
}

/// `http_requests_total` at 4w becomes `http_requests:increase4w`.
///
/// The `_bucket` suffix is stripped as well, so the bucket and count series
/// of one histogram share a name and differ by their `le` label.
#[must_use]
pub fn increase_name(metric: &str, window: Duration) -> String {
    let metric = metric.strip_suffix("_total").unwrap_or(metric);
    let metric = metric.strip_suffix("_count").unwrap_or(metric);
    let metric = metric.strip_suffix("_bucket").unwrap_or(metric);
    format!("{metric}:increase{}", format_duration(window))
}

/// Sample count of a gauge over the window.
#[must_use]
pub fn count_name(metric: &str, window: Duration) -> String {
    format!("{metric}:count{}", format_duration(window))
}

/// Sample sum of a gauge over the window.
#[must_use]
pub fn sum_name(metric: &str, window: Duration) -> String {
    format!("{metric}:sum{}", format_duration(window))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const FIVE_MINUTES: Duration = Duration::from_secs(300);
    const FOUR_WEEKS: Duration = Duration::from_secs(28 * 24 * 3600);

    #[test_case("http_requests_total", "http_requests:burnrate5m" ; "counter")]
    #[test_case("http_request_duration_seconds_count", "http_request_duration_seconds:burnrate5m" ; "histogram count")]
    #[test_case("up", "up:burnrate5m" ; "gauge")]
    fn burnrate_names(metric: &str, expected: &str) {
        assert_eq!(burnrate_name(metric, FIVE_MINUTES), expected);
    }

    #[test_case("http_requests_total", "http_requests:increase4w" ; "counter")]
    #[test_case("http_request_duration_seconds_bucket", "http_request_duration_seconds:increase4w" ; "bucket")]
    #[test_case("http_request_duration_seconds_count", "http_request_duration_seconds:increase4w" ; "count")]
    fn increase_names(metric: &str, expected: &str) {
        assert_eq!(increase_name(metric, FOUR_WEEKS), expected);
    }

    #[test]
    fn gauge_names() {
        assert_eq!(count_name("up", FOUR_WEEKS), "up:count4w");
        assert_eq!(sum_name("up", FOUR_WEEKS), "up:sum4w");
    }
}
