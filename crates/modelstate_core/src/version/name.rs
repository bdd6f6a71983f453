//! Version name arithmetic.
//!
//! Names are dot-separated integer paths. Root-branch versions are `"N"`;
//! a branch is named after the version it forks from plus a branch counter
//! (`"1.1"` is the first branch off version `"1"`), and its versions append
//! one more segment (`"1.1.1"`, `"1.1.2"`, ...).

use crate::error::{CoreError, CoreResult};

/// Name of the root branch.
pub const ROOT_BRANCH: &str = "";

/// Checks that `name` is a non-empty dot-separated integer path.
///
/// # Errors
///
/// Returns [`CoreError::InvalidVersionName`] otherwise.
pub fn validate(name: &str) -> CoreResult<()> {
    segments(name).map(|_| ())
}

/// Parses all segments of a name.
///
/// # Errors
///
/// Returns [`CoreError::InvalidVersionName`] for an empty name or a segment
/// that is not an unsigned integer.
pub fn segments(name: &str) -> CoreResult<Vec<u64>> {
    if name.is_empty() {
        return Err(CoreError::invalid_version_name(name));
    }
    name.split('.')
        .map(|segment| {
            if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
                return Err(CoreError::invalid_version_name(name));
            }
            segment
                .parse::<u64>()
                .map_err(|_| CoreError::invalid_version_name(name))
        })
        .collect()
}

/// Returns the trailing integer of a name.
#[must_use]
pub fn number(name: &str) -> Option<u64> {
    let last = name.rsplit('.').next()?;
    if last.is_empty() || !last.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    last.parse().ok()
}

/// Returns the branch a version belongs to: `"1.2.3"` is in `"1.2"`,
/// `"3"` is in the root branch.
#[must_use]
pub fn branch_of(name: &str) -> &str {
    name.rfind('.').map_or(ROOT_BRANCH, |ix| &name[..ix])
}

/// Returns the version a version's branch forks from: `"1"` for `"1.2.3"`,
/// empty for root-branch versions.
#[must_use]
pub fn branch_node_of(name: &str) -> &str {
    branch_of(branch_of(name))
}

/// Returns the version a branch forks from: `"1"` for branch `"1.2"`.
#[must_use]
pub fn fork_point_of(branch: &str) -> &str {
    branch_of(branch)
}

/// Returns the name following `name` in its branch.
///
/// The successor of the empty name is `"1"`.
///
/// # Errors
///
/// Returns [`CoreError::InvalidVersionName`] if the trailing segment is not
/// an integer.
pub fn increment(name: &str) -> CoreResult<String> {
    if name.is_empty() {
        return Ok("1".to_string());
    }
    let next = number(name)
        .and_then(|n| n.checked_add(1))
        .ok_or_else(|| CoreError::invalid_version_name(name))?;
    match name.rfind('.') {
        Some(ix) => Ok(format!("{}.{next}", &name[..ix])),
        None => Ok(next.to_string()),
    }
}

/// Returns whether `name` equals `prefix` or continues it with a `.`.
///
/// Every name has the empty prefix. Unlike a plain string prefix test,
/// `"2.10"` does not have the prefix `"2.1"`.
#[must_use]
pub fn has_segment_prefix(name: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    match name.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('.'),
        None => false,
    }
}

/// Number of dots in a name.
#[must_use]
pub fn depth(name: &str) -> usize {
    name.bytes().filter(|b| *b == b'.').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_names() {
        assert_eq!(increment("").unwrap(), "1");
        assert_eq!(increment("1").unwrap(), "2");
        assert_eq!(increment("9").unwrap(), "10");
        assert_eq!(increment("1.1.0").unwrap(), "1.1.1");
        assert_eq!(increment("3.2.19").unwrap(), "3.2.20");
    }

    #[test]
    fn increment_rejects_garbage() {
        assert!(matches!(
            increment("1.x"),
            Err(CoreError::InvalidVersionName { .. })
        ));
        assert!(increment("1.").is_err());
    }

    #[test]
    fn branches_and_nodes() {
        assert_eq!(branch_of("3"), "");
        assert_eq!(branch_of("1.2.3"), "1.2");
        assert_eq!(branch_node_of("1.2.3"), "1");
        assert_eq!(branch_node_of("1.2.3.4.5"), "1.2.3");
        assert_eq!(branch_node_of("7"), "");
        assert_eq!(fork_point_of("4.1"), "4");
    }

    #[test]
    fn segment_prefix() {
        assert!(has_segment_prefix("2.1", "2.1"));
        assert!(has_segment_prefix("2.1.3.1", "2.1"));
        assert!(!has_segment_prefix("2.10", "2.1"));
        assert!(has_segment_prefix("5", ""));
        assert!(!has_segment_prefix("2", "2.1"));
    }

    #[test]
    fn validation() {
        assert!(validate("1.1.1").is_ok());
        assert!(validate("").is_err());
        assert!(validate("1..2").is_err());
        assert!(validate("a").is_err());
        assert!(validate("-1").is_err());
        assert_eq!(segments("4.2.10").unwrap(), vec![4, 2, 10]);
    }

    #[test]
    fn numbers_and_depth() {
        assert_eq!(number("1.1.12"), Some(12));
        assert_eq!(number("x"), None);
        assert_eq!(depth("1.1.12"), 2);
        assert_eq!(depth("3"), 0);
    }

    mod props {
        use super::super::*;
        use proptest::prelude::*;

        fn name_strategy() -> impl Strategy<Value = String> {
            prop::collection::vec(0u64..50, 1..5).prop_map(|segments| {
                segments.iter().map(u64::to_string).collect::<Vec<_>>().join(".")
            })
        }

        proptest! {
            #[test]
            fn increment_stays_in_branch(name in name_strategy()) {
                let next = increment(&name).unwrap();
                prop_assert_eq!(branch_of(&next), branch_of(&name));
                prop_assert_eq!(number(&next), number(&name).map(|n| n + 1));
                prop_assert!(has_segment_prefix(&next, branch_of(&name)));
            }

            #[test]
            fn segments_round_trip(name in name_strategy()) {
                let parsed = segments(&name).unwrap();
                prop_assert_eq!(parsed.len(), depth(&name) + 1);
            }
        }
    }
}
