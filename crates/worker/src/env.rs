// SPDX-License-Identifier: MIT

//! The closed set of environment variables passed to every worker child.

use std::path::Path;

use poppo_core::WorkItem;

/// Build the fixed environment vector for a WorkItem. This is a closed set —
/// callers must not append ad hoc variables here; anything else a worker
/// needs belongs in its own invocation contract, not the engine's.
pub fn build_env(item: &WorkItem, log_dir: &Path, locale: &str) -> Vec<(String, String)> {
    vec![
        ("PROJECT_ID".to_string(), item.project_id.to_string()),
        ("ITEM_ID".to_string(), item.item_id.to_string()),
        ("TASK_TYPE".to_string(), item.item_type.to_string()),
        ("LOG_DIR".to_string(), log_dir.display().to_string()),
        ("LOCALE".to_string(), locale.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn env_vector_is_exactly_the_closed_set() {
        let item = poppo_core::test_support::sample_work_item("org/repo", "42", 5);
        let vars = build_env(&item, &PathBuf::from("/var/log/poppo"), "en_US");
        let keys: Vec<&str> = vars.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["PROJECT_ID", "ITEM_ID", "TASK_TYPE", "LOG_DIR", "LOCALE"]);
    }
}
