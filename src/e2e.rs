//! Relevance heuristic for the slow end-to-end suite.
//!
//! Rules, in order:
//! 1. collect every strong flow signal that matches
//! 2. only style/theme files touched: skip (wins over step 1). An empty
//!    change set counts as style-only.
//! 3. any flow signal: run
//! 4. frontend touched without a flow signal: skip, unless the
//!    `run_when_frontend_unclassified` policy says otherwise
//! 5. frontend not touched: skip

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

pub const REASON_STYLE_ONLY: &str = "style/theme-only changes detected";
pub const REASON_FRONTEND_UNCLASSIFIED: &str = "frontend touched but no flow-relevant signals";
pub const REASON_FRONTEND_NOT_TOUCHED: &str = "frontend not touched";

// (pattern, reason) pairs for strong flow signals
static FLOW_SIGNALS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)^frontend/app/.*/page\.tsx$", "nextjs app router page changed"),
        (r"(?i)^frontend/pages/.*\.(tsx|ts|jsx|js)$", "nextjs pages router changed"),
        (r"(?i)^frontend/app/.*/route\.ts$", "nextjs route handler changed"),
        (
            r"(?i)^frontend/.*/(actions|hooks|state|stores|services|api)/",
            "frontend logic/state/api changed",
        ),
        (r"(?i)^frontend/.*/(forms|validators)/", "forms/validation changed"),
        (r"(?i)^backend/.*/(routes|api)/", "backend API routes changed"),
        (r"(?i)^shared/", "shared contracts/types changed"),
        (r"(?i)^docs/diagrams/flows/", "flow diagrams changed"),
    ]
    .into_iter()
    .map(|(pattern, reason)| (Regex::new(pattern).unwrap(), reason))
    .collect()
});

static STYLE_ONLY: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)^frontend/styles/",
        r"(?i)^frontend/.*\.css$",
        r"(?i)^frontend/.*\.scss$",
        r"(?i)^frontend/.*\.sass$",
        r"(?i)^tailwind\.config\.(js|ts)$",
        r"(?i)^postcss\.config\.(js|ts)$",
        r"(?i)^frontend/.*/(tokens|theme)/",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

/// Whether to run E2E, with the rules that decided it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct E2eDecision {
    pub run: bool,
    pub reasons: Vec<String>,
}

impl E2eDecision {
    fn skip(reason: &str) -> Self {
        Self {
            run: false,
            reasons: vec![reason.to_string()],
        }
    }
}

/// Decide E2E relevance for `touched`.
pub fn decide(touched: &[String], run_when_frontend_unclassified: bool) -> E2eDecision {
    let reasons: Vec<String> = FLOW_SIGNALS
        .iter()
        .filter(|(re, _)| touched.iter().any(|p| re.is_match(p)))
        .map(|(_, reason)| reason.to_string())
        .collect();

    let style_only = touched
        .iter()
        .all(|p| STYLE_ONLY.iter().any(|re| re.is_match(p)));
    if style_only {
        return E2eDecision::skip(REASON_STYLE_ONLY);
    }

    if !reasons.is_empty() {
        return E2eDecision { run: true, reasons };
    }

    if touched.iter().any(|p| p.starts_with("frontend/")) {
        return E2eDecision {
            run: run_when_frontend_unclassified,
            reasons: vec![REASON_FRONTEND_UNCLASSIFIED.to_string()],
        };
    }

    E2eDecision::skip(REASON_FRONTEND_NOT_TOUCHED)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decide_for(items: &[&str]) -> E2eDecision {
        let touched: Vec<String> = items.iter().map(|s| s.to_string()).collect();
        decide(&touched, false)
    }

    #[test]
    fn test_style_only_skips() {
        let d = decide_for(&["frontend/styles/app.css"]);
        assert!(!d.run);
        assert_eq!(d.reasons, vec![REASON_STYLE_ONLY.to_string()]);
    }

    #[test]
    fn test_style_only_mix() {
        let d = decide_for(&[
            "frontend/components/button.module.scss",
            "tailwind.config.ts",
            "frontend/src/theme/colors.ts",
        ]);
        assert!(!d.run);
    }

    #[test]
    fn test_app_router_page_runs() {
        let d = decide_for(&["frontend/app/chat/page.tsx"]);
        assert!(d.run);
        assert_eq!(d.reasons, vec!["nextjs app router page changed".to_string()]);
    }

    #[test]
    fn test_unclassified_frontend_skips_by_default() {
        let d = decide_for(&["frontend/assets/logo.png"]);
        assert!(!d.run);
        assert_eq!(d.reasons, vec![REASON_FRONTEND_UNCLASSIFIED.to_string()]);
    }

    #[test]
    fn test_unclassified_frontend_policy_flip() {
        let d = decide(&["frontend/assets/logo.png".to_string()], true);
        assert!(d.run);
        assert_eq!(d.reasons, vec![REASON_FRONTEND_UNCLASSIFIED.to_string()]);
    }

    #[test]
    fn test_frontend_not_touched() {
        let d = decide_for(&["backend/app/models.py"]);
        assert!(!d.run);
        assert_eq!(d.reasons, vec![REASON_FRONTEND_NOT_TOUCHED.to_string()]);
    }

    #[test]
    fn test_empty_touched_set_is_style_only() {
        let d = decide_for(&[]);
        assert!(!d.run);
        assert_eq!(d.reasons, vec![REASON_STYLE_ONLY.to_string()]);
    }

    #[test]
    fn test_backend_and_shared_signals_collect_all_reasons() {
        let d = decide_for(&["backend/app/api/notes.py", "shared/types.ts"]);
        assert!(d.run);
        assert_eq!(
            d.reasons,
            vec![
                "backend API routes changed".to_string(),
                "shared contracts/types changed".to_string()
            ]
        );
    }

    #[test]
    fn test_style_plus_logic_runs() {
        let d = decide_for(&["frontend/styles/app.css", "frontend/src/hooks/useChat.ts"]);
        assert!(d.run);
        assert_eq!(d.reasons, vec!["frontend logic/state/api changed".to_string()]);
    }

    #[test]
    fn test_patterns_are_case_insensitive() {
        assert!(decide_for(&["Frontend/App/chat/Page.TSX"]).run);
    }
}
