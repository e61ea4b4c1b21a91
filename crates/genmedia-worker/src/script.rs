//! Script text cleanup and duration budgeting.
//!
//! Generated scripts are fed straight to text-to-speech, so any markdown the
//! model emitted would be read aloud. Sanitization strips formatting while
//! keeping the spoken words.

use std::sync::LazyLock;

use regex::Regex;
use tracing::info;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^```[a-zA-Z]*\s*$").unwrap());
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]*)`").unwrap());
static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*([^*]+)\*").unwrap());
static ATX_HEADER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+").unwrap());
static LIST_BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:[-*+]|\d+\.)\s+").unwrap());
static LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap());
// Letters only on the right side, so decimals like "3.5" survive.
static GLUED_SENTENCES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([.!?])([A-Za-z])").unwrap());
static LINE_EDGES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]*\n[ \t]*").unwrap());
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());

/// Strip markdown artifacts from a generated script, leaving plain spoken
/// prose. Glued sentence boundaries are re-spaced, runs of blank lines
/// collapse to one empty line and runs of spaces/tabs to one space.
pub fn sanitize_script_text(text: &str) -> String {
    let text = CODE_FENCE.replace_all(text, "");
    let text = INLINE_CODE.replace_all(&text, "$1");
    let text = BOLD.replace_all(&text, "$1");
    let text = ITALIC.replace_all(&text, "$1");
    let text = ATX_HEADER.replace_all(&text, "");
    let text = LIST_BULLET.replace_all(&text, "");
    let text = LINK.replace_all(&text, "$1");
    let text = GLUED_SENTENCES.replace_all(&text, "$1 $2");
    let text = LINE_EDGES.replace_all(&text, "\n");
    let text = BLANK_LINES.replace_all(&text, "\n\n");
    let text = SPACES.replace_all(&text, " ");
    text.trim().to_string()
}

/// Estimated spoken duration in seconds at `words_per_minute`.
pub fn estimate_duration_seconds(script: &str, words_per_minute: u32) -> f64 {
    let words = script.split_whitespace().count();
    words as f64 * 60.0 / words_per_minute.max(1) as f64
}

/// Truncate `script` when its estimated duration blows the requested budget.
///
/// The budget is violated only when the estimate is strictly greater than
/// max(requested * multiplier, requested + slack). A script within that
/// allowance is returned unchanged; one beyond it is cut at the last
/// sentence boundary inside the requested duration's word budget.
pub fn enforce_duration_budget(
    script: &str,
    requested_seconds: u32,
    words_per_minute: u32,
    violation_multiplier: f64,
    slack_seconds: u32,
) -> String {
    let estimated = estimate_duration_seconds(script, words_per_minute);
    let threshold = f64::max(
        requested_seconds as f64 * violation_multiplier,
        (requested_seconds + slack_seconds) as f64,
    );

    if estimated <= threshold {
        return script.to_string();
    }

    let word_budget =
        ((requested_seconds as f64 * words_per_minute as f64 / 60.0).floor() as usize).max(1);
    let words: Vec<&str> = script.split_whitespace().collect();
    if words.len() <= word_budget {
        return script.to_string();
    }

    // Prefer cutting after the last full sentence inside the budget.
    let within = &words[..word_budget];
    let last_sentence_end = within
        .iter()
        .rposition(|w| w.ends_with('.') || w.ends_with('!') || w.ends_with('?'));

    let cut = match last_sentence_end {
        Some(idx) => idx + 1,
        None => word_budget,
    };

    info!(
        estimated_seconds = estimated,
        requested_seconds,
        kept_words = cut,
        total_words = words.len(),
        "Truncating over-length script"
    );

    words[..cut].join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_is_stripped() {
        let raw = "# Intro\n\nThis is **bold** and *italic* with `code` and a [link](https://x.y).\n\n- first point\n- second point\n";
        let clean = sanitize_script_text(raw);
        assert_eq!(
            clean,
            "Intro\n\nThis is bold and italic with code and a link.\n\nfirst point\nsecond point"
        );
    }

    #[test]
    fn glued_sentences_are_respaced() {
        let clean = sanitize_script_text("First sentence.Second sentence!Third one?Done");
        assert_eq!(clean, "First sentence. Second sentence! Third one? Done");
    }

    #[test]
    fn decimals_are_not_respaced() {
        let clean = sanitize_script_text("Version 3.5 ships in 2.5 weeks.");
        assert_eq!(clean, "Version 3.5 ships in 2.5 weeks.");
    }

    #[test]
    fn blank_line_runs_collapse_to_one_empty_line() {
        let clean = sanitize_script_text("One paragraph.\n\n\n\nAnother   paragraph.\t Done.");
        assert_eq!(clean, "One paragraph.\n\nAnother paragraph. Done.");
    }

    #[test]
    fn code_fences_removed_contents_kept() {
        let raw = "Before.\n```text\nspoken words here\n```\nAfter.";
        let clean = sanitize_script_text(raw);
        assert!(clean.contains("spoken words here"));
        assert!(!clean.contains("```"));
    }

    #[test]
    fn duration_estimate_uses_word_count() {
        // 150 words at 150 wpm is exactly one minute
        let script = vec!["word"; 150].join(" ");
        let est = estimate_duration_seconds(&script, 150);
        assert!((est - 60.0).abs() < f64::EPSILON);
    }

    fn sentence_script(sentences: usize, words_each: usize) -> String {
        let sentence = format!("{}.", vec!["word"; words_each].join(" "));
        vec![sentence; sentences].join(" ")
    }

    #[test]
    fn within_allowance_is_untouched() {
        // 30s requested, threshold max(60, 60) = 60s. 100 words = 40s estimate.
        let script = sentence_script(10, 10);
        let out = enforce_duration_budget(&script, 30, 150, 2.0, 30);
        assert_eq!(out, script);
    }

    #[test]
    fn at_threshold_is_untouched() {
        // 30s requested, threshold 60s. 150 words = exactly 60s.
        let script = sentence_script(15, 10);
        let out = enforce_duration_budget(&script, 30, 150, 2.0, 30);
        assert_eq!(out, script);
    }

    #[test]
    fn beyond_threshold_truncates_at_sentence_boundary() {
        // 30s requested, threshold 60s. 200 words = 80s, over the line.
        // Budget is 75 words; last sentence end within that is word 70.
        let script = sentence_script(20, 10);
        let out = enforce_duration_budget(&script, 30, 150, 2.0, 30);
        assert!(out.split_whitespace().count() <= 75);
        assert!(out.ends_with('.'));
        assert_eq!(out.split_whitespace().count() % 10, 0);
    }

    #[test]
    fn no_sentence_boundary_cuts_at_word_budget() {
        let script = vec!["word"; 400].join(" ");
        let out = enforce_duration_budget(&script, 30, 150, 2.0, 30);
        assert_eq!(out.split_whitespace().count(), 75);
    }

    #[test]
    fn slack_dominates_for_short_requests() {
        // 10s requested: threshold is max(20, 40) = 40s. 75 words = 30s, kept.
        let script = sentence_script(15, 5);
        let out = enforce_duration_budget(&script, 10, 150, 2.0, 30);
        assert_eq!(out, script);
    }
}
