//! Levenshtein-based nearest-path suggestion for `vfs_read` misses.

/// Returns up to `limit` candidate paths within `max_distance` of `target`,
/// nearest first. Ties break on the candidate's natural (input) order.
pub fn nearest_paths(
    target: &str,
    candidates: &[String],
    max_distance: usize,
    limit: usize,
) -> Vec<String> {
    let mut scored: Vec<(usize, &String)> = candidates
        .iter()
        .map(|c| (strsim::levenshtein(target, c), c))
        .filter(|(distance, _)| *distance <= max_distance)
        .collect();
    scored.sort_by_key(|(distance, _)| *distance);
    scored.into_iter().take(limit).map(|(_, c)| c.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_close_match() {
        let candidates = vec!["agents/writer.md".to_string(), "agents/reader.md".to_string()];
        let suggestions = nearest_paths("agents/writter.md", &candidates, 3, 3);
        assert_eq!(suggestions, vec!["agents/writer.md".to_string()]);
    }

    #[test]
    fn excludes_paths_beyond_threshold() {
        let candidates = vec!["totally/unrelated/path.md".to_string()];
        let suggestions = nearest_paths("agents/writer.md", &candidates, 3, 3);
        assert!(suggestions.is_empty());
    }

    #[test]
    fn respects_limit() {
        let candidates = vec![
            "a.md".to_string(),
            "b.md".to_string(),
            "c.md".to_string(),
            "d.md".to_string(),
        ];
        let suggestions = nearest_paths("e.md", &candidates, 3, 2);
        assert_eq!(suggestions.len(), 2);
    }
}
