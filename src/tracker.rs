//! Touched-path collection from git.
//!
//! Unstaged and staged changes come from `git diff --name-only` (with and
//! without `--cached`); `git status --porcelain` adds untracked files. Any of
//! the queries may fail (no repository, no git binary), in which case its
//! output simply contributes nothing.

use crate::errors::LoopError;
use crate::runner::CommandRunner;
use std::collections::BTreeSet;

pub const GIT_DIFF: &str = "git diff --name-only";
pub const GIT_DIFF_CACHED: &str = "git diff --cached --name-only";
pub const GIT_STATUS: &str = "git status --porcelain";

/// Collect the sorted, de-duplicated set of paths touched in the working tree.
pub async fn collect_touched_paths(runner: &dyn CommandRunner) -> Result<Vec<String>, LoopError> {
    let unstaged = runner.run(GIT_DIFF).await?;
    let staged = runner.run(GIT_DIFF_CACHED).await?;
    let status = runner.run(GIT_STATUS).await?;

    let mut files = BTreeSet::new();
    files.extend(parse_name_only(&unstaged.stdout));
    files.extend(parse_name_only(&staged.stdout));
    files.extend(parse_porcelain(&status.stdout));

    let touched: Vec<String> = files.into_iter().collect();
    tracing::debug!(count = touched.len(), "collected touched paths");
    Ok(touched)
}

/// One path per non-empty line.
pub fn parse_name_only(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// `XY path` lines; the last whitespace-separated token is the path, which
/// also picks the destination of `R old -> new` renames.
pub fn parse_porcelain(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().last())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RunResult;
    use crate::runner::testing::ScriptedRunner;

    #[test]
    fn test_parse_name_only_skips_blank_lines() {
        let out = "src/a.rs\n\n  frontend/app/page.tsx  \n";
        assert_eq!(
            parse_name_only(out),
            vec!["src/a.rs".to_string(), "frontend/app/page.tsx".to_string()]
        );
    }

    #[test]
    fn test_parse_porcelain_takes_last_token() {
        let out = " M src/lib.rs\n?? docs/new.md\nR  old.rs -> new.rs\n\n";
        assert_eq!(
            parse_porcelain(out),
            vec![
                "src/lib.rs".to_string(),
                "docs/new.md".to_string(),
                "new.rs".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_collect_merges_sorts_and_dedups() {
        let runner = ScriptedRunner::new()
            .with(GIT_DIFF, RunResult::passed("shared/events/schema.json\nb.rs"))
            .with(GIT_DIFF_CACHED, RunResult::passed("b.rs\na.rs"))
            .with(GIT_STATUS, RunResult::passed(" M b.rs\n?? docs/x.md"));

        let touched = collect_touched_paths(&runner).await.unwrap();
        assert_eq!(
            touched,
            vec!["a.rs", "b.rs", "docs/x.md", "shared/events/schema.json"]
        );
        assert_eq!(runner.calls(), vec![GIT_DIFF, GIT_DIFF_CACHED, GIT_STATUS]);
    }

    #[tokio::test]
    async fn test_collect_outside_repository_is_empty() {
        let fatal = RunResult::failed(128, "fatal: not a git repository");
        let runner = ScriptedRunner::new()
            .with(GIT_DIFF, fatal.clone())
            .with(GIT_DIFF_CACHED, fatal.clone())
            .with(GIT_STATUS, fatal);

        assert!(collect_touched_paths(&runner).await.unwrap().is_empty());
    }
}
