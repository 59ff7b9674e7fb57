//! Module version extraction from Terraform `source` strings.

use regex::Regex;
use std::sync::LazyLock;

// Matches a trailing ref pin such as `?ref=5.2.1`, `\ref=5.2` or `%3Fref=6`.
// Capture group 1 is the dotted version with one to three components.
static REF_VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\?|\\|%3[Ff])ref=([0-9]+(?:\.[0-9]+){0,2})$").expect("Invalid regex")
});

/// Extract the pinned module version from a module source.
///
/// Returns `None` when the source does not end in a numeric `ref=` pin.
///
/// ```rust
/// use nsdiscovery::extract::module_version;
///
/// assert_eq!(
///     module_version("github.com/ministryofjustice/cloud-platform-terraform-rds-instance?ref=5.2.1"),
///     Some("5.2.1".to_string())
/// );
/// assert_eq!(module_version("../modules/rds"), None);
/// ```
#[must_use]
pub fn module_version(source: &str) -> Option<String> {
    REF_VERSION_PATTERN
        .captures(source.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("github.com/ministryofjustice/cloud-platform-terraform-rds-instance?ref=5.2.1", Some("5.2.1"); "three components")]
    #[test_case("github.com/ministryofjustice/cloud-platform-terraform-elasticache-cluster?ref=6.2", Some("6.2"); "two components")]
    #[test_case("github.com/ministryofjustice/hmpps-template?ref=1", Some("1"); "single component")]
    #[test_case("github.com/org/module%3Fref=7.1.0", Some("7.1.0"); "percent escaped")]
    #[test_case("github.com/org/module\\ref=2.0", Some("2.0"); "backslash escaped")]
    #[test_case("github.com/org/module?ref=10.12.3", Some("10.12.3"); "multi digit components")]
    #[test_case("github.com/ministryofjustice/cloud-platform-terraform-rds-instance", None; "no ref")]
    #[test_case("github.com/org/module?ref=main", None; "branch ref")]
    #[test_case("github.com/org/module?ref=v5.2.1", None; "prefixed tag")]
    #[test_case("github.com/org/module?ref=1.2.3.4", None; "too many components")]
    #[test_case("", None; "empty source")]
    fn test_module_version(source: &str, expected: Option<&str>) {
        assert_eq!(module_version(source).as_deref(), expected);
    }
}
