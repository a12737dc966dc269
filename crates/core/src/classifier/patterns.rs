//! Heuristic detectors over agent output.
//!
//! Each detector is a pure function over already ANSI-stripped text. They
//! are deliberately independent of each other; the priority between them is
//! decided in [`super::HeuristicClassifier`].

use regex::Regex;
use std::sync::LazyLock;

use super::compile;

static COMMIT_QUESTION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?i)\b(?:should|shall|can|may)\s+i\s+(?:go\s+ahead\s+and\s+|now\s+)?(?:commit|create\s+a\s+commit|stage\s+and\s+commit|make\s+a\s+commit)\b|\b(?:do|would)\s+you\s+(?:want|like)\s+me\s+to\s+(?:go\s+ahead\s+and\s+)?(?:commit|create\s+a\s+commit|stage\s+and\s+commit)\b|\bcommit\s+(?:these|the|this|all\s+(?:the\s+)?)?\s*changes\s*\?",
    )
});

// `[MH] Redisplay menu help`, optionally numbered: `1. [CH] Chat`.
static BMAD_MENU_ITEM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?m)^[ \t>*-]*(?:\d+[.)]\s*)?\*{0,2}\[[A-Z]{2}\]\*{0,2}\s+\S"));

// `1. Fix`, `2) Skip`, `a. Retry`, `(b) Abort`, `**1.** Fix`, `- **2** Skip`.
static OPTION_ITEM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?m)^[ \t>]*(?:[-*][ \t]+)?(?:\*\*)?(?:\d{1,2}|[a-zA-Z])(?:[.)]|\*\*[.)]?|[.)]\*\*)(?:\*\*)?[ \t]+(\S.*)$|^[ \t>]*(?:[-*][ \t]+)?\((?:\d{1,2}|[a-zA-Z])\)[ \t]+(\S.*)$",
    )
});

static PROBLEM_VOCABULARY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?i)\b(?:fix|fixes|fixing|error|errors|conflict|conflicts|conflicting|fail|fails|failed|failing|failure|failures|broken|bug|bugs|issue|issues|problem|problems|blocker|blocked|cannot|can't|unable|regression|violation|violations|mismatch|missing)\b|build\s+(?:is\s+)?(?:fail|broken|error)",
    )
});

// Phrases that mention problem words while reporting their absence.
static NEGATED_PROBLEM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?i)\b(?:no|zero|0|without|without\s+any)\s+(?:remaining\s+|outstanding\s+|new\s+|known\s+)?(?:issues?|errors?|problems?|conflicts?|failures?|bugs?|blockers?)\b(?:\s+found|\s+detected|\s+remaining)?",
    )
});

static PROCEED_QUESTION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?i)how\s+(?:should|shall|do|would)\s+(?:i|we|you\s+like\s+(?:me\s+)?to)\s+proceed|how\s+would\s+you\s+like\s+(?:me\s+)?to\s+(?:proceed|handle|resolve|fix)|which\s+(?:option|approach|one)\s+(?:would|do|should)|please\s+(?:choose|select|pick)|(?:choose|select|pick)\s+(?:an?\s+)?option|what\s+would\s+you\s+like\s+(?:me\s+)?to\s+do\s*\?",
    )
});

static WHAT_NEXT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?i)what'?s\s+next\s*\?|what\s+(?:would\s+you\s+like|do\s+you\s+want)\s+(?:me\s+)?to\s+(?:do|work\s+on|tackle)\s+next|would\s+you\s+like\s+me\s+to\b|(?:shall|should)\s+i\s+(?:continue|proceed|move\s+on|keep\s+going|start)|(?:want|like)\s+me\s+to\s+(?:continue|proceed|keep\s+going)|let\s+me\s+know\s+(?:if|what|how|whether)\s+you",
    )
});

static COMPLETION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?i)\b(?:done|complete|completed|finished|ready\s+for\s+(?:commit|review|merge|testing)|no\s+(?:further\s+|remaining\s+|outstanding\s+)?issues(?:\s+(?:found|detected|remaining))?|all\s+tests\s+pass(?:ing|ed)?|successfully(?:\s+\w+)?)[\s.!*_`)✅🎉✓✔]*$",
    )
});

static FIX_OPTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b(?:fix|fixes|resolve|correct|repair|address)\b"));

/// The agent asks whether it should commit.
pub fn is_commit_question(text: &str) -> bool {
    COMMIT_QUESTION_REGEX.is_match(text)
}

/// A structured menu of two-letter bracketed codes.
///
/// Two items are required so a single `[OK]` in prose does not count.
pub fn is_bmad_menu(text: &str) -> bool {
    BMAD_MENU_ITEM_REGEX.find_iter(text).take(2).count() >= 2
}

/// Labels of numbered or lettered option lines, in order.
pub fn option_labels(text: &str) -> Vec<&str> {
    OPTION_ITEM_REGEX
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().trim())
        .collect()
}

/// A list of at least two numbered or lettered options.
pub fn has_option_list(text: &str) -> bool {
    option_labels(text).len() >= 2
}

/// Vocabulary describing a problem that needs a decision.
pub fn has_problem_vocabulary(text: &str) -> bool {
    let cleaned = NEGATED_PROBLEM_REGEX.replace_all(text, " ");
    PROBLEM_VOCABULARY_REGEX.is_match(&cleaned)
}

/// A direct "how should I proceed" style question.
pub fn has_proceed_question(text: &str) -> bool {
    PROCEED_QUESTION_REGEX.is_match(text)
}

/// Problem report offering numbered or lettered resolutions.
pub fn is_issue_prompt(text: &str) -> bool {
    if is_bmad_menu(text) || !has_option_list(text) {
        return false;
    }
    has_problem_vocabulary(text) || has_proceed_question(text)
}

/// Friendly follow-up phrasing such as "What's next?".
pub fn is_what_next(text: &str) -> bool {
    WHAT_NEXT_REGEX.is_match(text)
}

/// The trailing sentence ends in a completion marker.
pub fn is_completion(text: &str) -> bool {
    let Some(last) = last_sentence(text) else {
        return false;
    };
    let trimmed = last.trim_end_matches(|c: char| c.is_whitespace() || matches!(c, '*' | '_' | '`'));
    if trimmed.ends_with('?') || trimmed.ends_with(':') {
        return false;
    }
    COMPLETION_REGEX.is_match(trimmed)
}

/// The first offered option is a fix.
pub fn is_fix_first_option(text: &str) -> bool {
    option_labels(text)
        .first()
        .is_some_and(|label| FIX_OPTION_REGEX.is_match(label))
}

/// The last non-empty line, narrowed to its last sentence.
fn last_sentence(text: &str) -> Option<&str> {
    let line = text.lines().rev().map(str::trim).find(|l| !l.is_empty())?;
    let line = line.trim_end_matches(|c: char| c.is_whitespace() || matches!(c, '*' | '_' | '`'));
    let body = line.trim_end_matches(|c: char| matches!(c, '.' | '!' | '?' | ':' | ' '));
    let start = body
        .rfind(['.', '!', '?'])
        .map_or(0, |idx| idx + 1);
    Some(line[start..].trim())
}
