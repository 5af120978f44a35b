//! Shared glob matcher — used by `vfs_list`'s `pattern` parameter and by
//! `agentkernel-policy`'s path-scope rule, so both components agree on one
//! glob dialect.

use globset::{Glob, GlobSet, GlobSetBuilder};

/// Builds a `GlobSet` from a list of patterns. An unparseable pattern is
/// dropped with a `tracing::warn!` rather than failing the whole set —
/// matches the registry's forward-compatible, lenient front-matter parsing.
pub fn build_glob_set(patterns: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(err) => {
                tracing::warn!(pattern = %pattern, error = %err, "ignoring unparseable glob pattern");
            }
        }
    }
    builder.build().unwrap_or_else(|_| GlobSetBuilder::new().build().unwrap())
}

pub fn matches_any(set: &GlobSet, path: &str) -> bool {
    set.is_match(path)
}

/// `vfs_list`'s matching rule: a bare prefix matches like a directory
/// prefix (`artifacts/` matches `artifacts/x.md`); anything containing a
/// glob metacharacter is compiled and matched as a full glob instead.
pub fn matches_prefix_or_glob(pattern: &str, path: &str) -> bool {
    if pattern.contains(['*', '?', '[', ']', '{', '}']) {
        match Glob::new(pattern) {
            Ok(glob) => glob.compile_matcher().is_match(path),
            Err(_) => false,
        }
    } else {
        path.starts_with(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_glob_set_matches_double_star() {
        let set = build_glob_set(&["artifacts/**".to_string()]);
        assert!(matches_any(&set, "artifacts/a/b.md"));
        assert!(!matches_any(&set, "agents/a.md"));
    }

    #[test]
    fn empty_pattern_list_matches_nothing() {
        let set = build_glob_set(&[]);
        assert!(!matches_any(&set, "a.md"));
    }

    #[test]
    fn ignores_unparseable_pattern_without_failing_whole_set() {
        let set = build_glob_set(&["[".to_string(), "a.md".to_string()]);
        assert!(matches_any(&set, "a.md"));
    }

    #[test]
    fn prefix_match_without_glob_chars() {
        assert!(matches_prefix_or_glob("artifacts/", "artifacts/x.md"));
        assert!(!matches_prefix_or_glob("artifacts/", "agents/x.md"));
    }

    #[test]
    fn glob_match_with_metacharacters() {
        assert!(matches_prefix_or_glob("artifacts/*.md", "artifacts/x.md"));
        assert!(!matches_prefix_or_glob("artifacts/*.md", "artifacts/x.txt"));
    }
}
