//! Touched-path classification.
//!
//! Pure with respect to its inputs: the scratchpad text and the touched
//! paths. Healthcare mode is switched on by an explicit scratchpad marker or
//! by a keyword in the path list or in scratchpad text loopwarden didn't
//! write itself.

use crate::scratchpad::find_marker;
use serde::{Deserialize, Serialize};

/// Marker written by feature-planning tooling to select the healthcare mode.
pub const MODE_SELECTED_KEY: &str = "MODE_SELECTED";
/// Marker describing the sensitivity of the data the change handles.
pub const DATA_SENSITIVITY_KEY: &str = "DATA_SENSITIVITY";

/// Keywords that switch on healthcare mode when no marker does.
pub const DEFAULT_HEALTHCARE_KEYWORDS: &[&str] = &[
    "patient",
    "medical",
    "therapy",
    "healthcare",
    "diagnosis",
    "gdpr",
    "dsgvo",
    "phi",
    "hipaa",
    "consent",
    "treatment",
];

/// Whether healthcare mode applies, and why.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthcareDecision {
    pub enabled: bool,
    #[serde(default)]
    pub reasons: Vec<String>,
}

/// Semantic categories of a set of touched paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathClassification {
    pub touches_events: bool,
    pub touches_projections: bool,
    pub touches_docs_or_flows: bool,
    pub healthcare: HealthcareDecision,
}

impl PathClassification {
    pub fn healthcare_mode(&self) -> bool {
        self.healthcare.enabled
    }
}

/// Classify `touched` given the current scratchpad text.
pub fn classify<S: AsRef<str>>(
    scratchpad: &str,
    touched: &[String],
    keywords: &[S],
) -> PathClassification {
    let touches_events = touched.iter().any(|p| is_event_path(p));
    let touches_projections = touched.iter().any(|p| is_projection_path(p));
    let touches_docs_or_flows = touches_events
        || touches_projections
        || touched
            .iter()
            .any(|p| p.starts_with("docs/") || p.contains("/api/") || p.starts_with("frontend/"));

    PathClassification {
        touches_events,
        touches_projections,
        touches_docs_or_flows,
        healthcare: detect_healthcare_mode(scratchpad, touched, keywords),
    }
}

fn is_event_path(path: &str) -> bool {
    path.starts_with("shared/events")
        || path.contains("/domain/events/")
        || path.contains("schema.json")
}

fn is_projection_path(path: &str) -> bool {
    let lower = path.to_lowercase();
    path.contains("/domain/projections/")
        || lower.contains("projector")
        || lower.contains("projection")
}

/// Decide healthcare mode from scratchpad markers and a keyword scan.
pub fn detect_healthcare_mode<S: AsRef<str>>(
    scratchpad: &str,
    touched: &[String],
    keywords: &[S],
) -> HealthcareDecision {
    let mut reasons = Vec::new();

    let mode = find_marker(scratchpad, MODE_SELECTED_KEY).unwrap_or_default();
    let sensitivity = find_marker(scratchpad, DATA_SENSITIVITY_KEY).unwrap_or_default();

    if mode == "HEALTHCARE" {
        reasons.push("MODE_SELECTED=HEALTHCARE marker".to_string());
    }
    if sensitivity == "HEALTHCARE_SENSITIVE" {
        reasons.push("DATA_SENSITIVITY=HEALTHCARE_SENSITIVE marker".to_string());
    }
    if sensitivity == "PII" {
        reasons.push("DATA_SENSITIVITY=PII marker".to_string());
    }

    let haystack = format!("{}\n{}", agent_text(scratchpad), touched.join("\n")).to_lowercase();
    let hits: Vec<&str> = keywords
        .iter()
        .map(|k| k.as_ref())
        .filter(|k| !k.is_empty() && haystack.contains(&k.to_lowercase()))
        .collect();
    if !hits.is_empty() {
        reasons.push(format!("keyword hits: {}", hits.join(", ")));
    }

    HealthcareDecision {
        enabled: !reasons.is_empty(),
        reasons,
    }
}

/// Scratchpad text minus the lines loopwarden writes itself, so an earlier
/// `HEALTHCARE_MODE=NO` line can't count as a keyword hit.
fn agent_text(scratchpad: &str) -> String {
    const OWN_PREFIXES: &[&str] = &["ORCH:", "# ORCH:", "HEALTHCARE_MODE=", "HEALTHCARE_REASON=", "[loopwarden]"];
    scratchpad
        .lines()
        .filter(|line| {
            let line = line.trim_start();
            !OWN_PREFIXES.iter().any(|prefix| line.starts_with(prefix))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn classify_default(scratchpad: &str, touched: &[&str]) -> PathClassification {
        classify(scratchpad, &paths(touched), DEFAULT_HEALTHCARE_KEYWORDS)
    }

    #[test]
    fn test_events_detection() {
        assert!(classify_default("", &["shared/events/session.ts"]).touches_events);
        assert!(classify_default("", &["backend/src/domain/events/created.py"]).touches_events);
        assert!(classify_default("", &["contracts/schema.json"]).touches_events);
        assert!(!classify_default("", &["src/main.rs"]).touches_events);
    }

    #[test]
    fn test_events_detection_is_case_sensitive() {
        assert!(!classify_default("", &["Shared/Events/x.ts"]).touches_events);
        assert!(!classify_default("", &["contracts/Schema.JSON"]).touches_events);
    }

    #[test]
    fn test_projection_detection_is_case_insensitive() {
        assert!(classify_default("", &["backend/domain/projections/notes.py"]).touches_projections);
        assert!(classify_default("", &["backend/NoteProjector.ts"]).touches_projections);
        assert!(classify_default("", &["lib/PROJECTION_utils.rs"]).touches_projections);
        assert!(!classify_default("", &["lib/project.rs"]).touches_projections);
    }

    #[test]
    fn test_docs_or_flows() {
        assert!(classify_default("", &["docs/readme.md"]).touches_docs_or_flows);
        assert!(classify_default("", &["backend/app/api/notes.py"]).touches_docs_or_flows);
        assert!(classify_default("", &["frontend/src/x.ts"]).touches_docs_or_flows);
        assert!(!classify_default("", &["scripts/test.sh"]).touches_docs_or_flows);
    }

    #[test]
    fn test_events_imply_docs_or_flows() {
        let c = classify_default("", &["shared/events/schema.json"]);
        assert!(c.touches_events);
        assert!(c.touches_docs_or_flows);
        assert!(!c.touches_projections);
        assert!(!c.healthcare_mode());
    }

    #[test]
    fn test_projections_imply_docs_or_flows() {
        assert!(classify_default("", &["src/projector.rs"]).touches_docs_or_flows);
    }

    #[test]
    fn test_healthcare_mode_from_mode_marker() {
        let d = detect_healthcare_mode("MODE_SELECTED=HEALTHCARE\n", &[], DEFAULT_HEALTHCARE_KEYWORDS);
        assert!(d.enabled);
        // "healthcare" also appears as a keyword in the marker text
        assert_eq!(d.reasons[0], "MODE_SELECTED=HEALTHCARE marker");
    }

    #[test]
    fn test_healthcare_mode_from_sensitivity_markers() {
        let empty: &[&str] = &[];
        let d = detect_healthcare_mode("DATA_SENSITIVITY=PII\n", &[], empty);
        assert!(d.enabled);
        assert_eq!(d.reasons, vec!["DATA_SENSITIVITY=PII marker".to_string()]);

        let d = detect_healthcare_mode("DATA_SENSITIVITY=HEALTHCARE_SENSITIVE\n", &[], empty);
        assert!(d.enabled);

        let d = detect_healthcare_mode("DATA_SENSITIVITY=PUBLIC\n", &[], empty);
        assert!(!d.enabled);
    }

    #[test]
    fn test_healthcare_mode_from_keywords_case_insensitive() {
        let d = detect_healthcare_mode(
            "",
            &paths(&["backend/Patient/records.py"]),
            DEFAULT_HEALTHCARE_KEYWORDS,
        );
        assert!(d.enabled);
        assert_eq!(d.reasons, vec!["keyword hits: patient".to_string()]);

        let d = detect_healthcare_mode("Needs HIPAA review", &[], DEFAULT_HEALTHCARE_KEYWORDS);
        assert!(d.enabled);
    }

    #[test]
    fn test_healthcare_mode_off_without_signals() {
        let d = detect_healthcare_mode(
            "fix flaky test",
            &paths(&["src/lib.rs"]),
            DEFAULT_HEALTHCARE_KEYWORDS,
        );
        assert!(!d.enabled);
        assert!(d.reasons.is_empty());
    }

    #[test]
    fn test_own_marker_lines_are_not_keyword_hits() {
        let scratchpad = "# ORCH:INIT\nHEALTHCARE_MODE=NO\nHEALTHCARE_REASON=keyword hits: gdpr\n\
                          [loopwarden] Phase \"GDPR_SCAN\" pending.\n";
        let d = detect_healthcare_mode(scratchpad, &[], DEFAULT_HEALTHCARE_KEYWORDS);
        assert!(!d.enabled);
    }

    #[test]
    fn test_custom_keywords() {
        let d = detect_healthcare_mode("billing change", &[], &["billing"]);
        assert!(d.enabled);
    }

    #[test]
    fn test_classify_is_pure() {
        let touched = paths(&["shared/events/a.ts", "docs/x.md"]);
        let a = classify("notes", &touched, DEFAULT_HEALTHCARE_KEYWORDS);
        let b = classify("notes", &touched, DEFAULT_HEALTHCARE_KEYWORDS);
        assert_eq!(a, b);
    }
}
