//! Outcome classification of rendered screen text.
//!
//! Rules are checked in order and the first match wins. A restricted account
//! can still show home-screen chrome, so restriction phrases come first.

use crate::runner::RunResult;

/// Phrase shown in the composer of the home feed
pub const HOME_PROMPT: &str = "what's on your mind";

/// Outcome a rule produces; `Error` is never a classification result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Restricted,
    Success,
    Checkpoint,
}

impl From<Verdict> for RunResult {
    fn from(v: Verdict) -> Self {
        match v {
            Verdict::Restricted => RunResult::Restricted,
            Verdict::Success => RunResult::Success,
            Verdict::Checkpoint => RunResult::Checkpoint,
        }
    }
}

/// Ordered phrase table. Phrases are lower case.
pub const RULES: &[(Verdict, &[&str])] = &[
    (Verdict::Restricted, &["restricted", "account disabled"]),
    (Verdict::Success, &["home", HOME_PROMPT]),
    (
        Verdict::Checkpoint,
        &["confirm your identity", "need help finding your account"],
    ),
];

/// Classify rendered text; text matching no rule is `Unknown`.
pub fn classify(rendered_text: &str) -> RunResult {
    match_rule(rendered_text)
        .map(RunResult::from)
        .unwrap_or(RunResult::Unknown)
}

/// First rule whose phrase occurs in the text (case-insensitive)
pub fn match_rule(rendered_text: &str) -> Option<Verdict> {
    let text = normalize(rendered_text);
    RULES
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|p| text.contains(p)))
        .map(|(verdict, _)| *verdict)
}

/// True when the text shows home-screen indicators
pub fn shows_home(rendered_text: &str) -> bool {
    let text = normalize(rendered_text);
    RULES
        .iter()
        .filter(|(verdict, _)| *verdict == Verdict::Success)
        .any(|(_, phrases)| phrases.iter().any(|p| text.contains(p)))
}

// Lower-case and fold typographic apostrophes so "What’s" matches "what's"
fn normalize(text: &str) -> String {
    text.to_lowercase().replace('\u{2019}', "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_phrases() {
        assert_eq!(classify("Welcome — What's on your mind?"), RunResult::Success);
        assert_eq!(classify("Your account has been restricted"), RunResult::Restricted);
        assert_eq!(classify("Confirm your identity to continue"), RunResult::Checkpoint);
        assert_eq!(classify("random unrelated text"), RunResult::Unknown);
    }

    #[test]
    fn test_rule_order() {
        assert_eq!(classify("Home\nThis account is RESTRICTED"), RunResult::Restricted);
        assert_eq!(classify("Account disabled. Go home"), RunResult::Restricted);
        assert_eq!(
            classify("Home - need help finding your account?"),
            RunResult::Success
        );
    }

    #[test]
    fn test_checkpoint_needs_an_actual_phrase() {
        assert_eq!(classify("checkpoint"), RunResult::Unknown);
        assert_eq!(
            classify("Need help finding your account?"),
            RunResult::Checkpoint
        );
    }

    #[test]
    fn test_case_and_apostrophe_folding() {
        assert_eq!(classify("WHAT’S ON YOUR MIND"), RunResult::Success);
        assert!(shows_home("HOME"));
        assert!(!shows_home("Log in"));
        assert_eq!(classify(""), RunResult::Unknown);
    }
}
