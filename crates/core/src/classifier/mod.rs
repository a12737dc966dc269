//! Output classification for agent interaction sessions.
//!
//! The orchestrator never understands what an agent says. It only needs to
//! know whether the agent is finished, asking something the engine can answer
//! with a canned reply, or asking for human input. That decision is made by
//! an [`OutputClassifier`] over the accumulated, ANSI-stripped output so the
//! heuristics can be swapped without touching the orchestrator.

pub mod patterns;
pub mod text;

use regex::Regex;
use std::fmt;

pub use text::{strip_ansi, tail_window, ChunkDecoder};

/// What the agent's latest output amounts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The agent asks whether to commit. Committing is the engine's job, so
    /// this counts as completion.
    CommitQuestion,
    /// A two-letter bracket menu. Always treated as step completion.
    BmadMenu,
    /// A problem report offering numbered or lettered resolutions.
    IssuePrompt,
    /// A friendly follow-up suggestion.
    WhatNext,
    /// A trailing sentence ending in a completion marker.
    Completion,
    /// Nothing recognisable.
    NoSignal,
}

impl Verdict {
    /// Whether the step can be resolved as successful on this verdict.
    pub fn completes_step(self) -> bool {
        !matches!(self, Self::IssuePrompt)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::CommitQuestion => "commit-question",
            Self::BmadMenu => "bmad-menu",
            Self::IssuePrompt => "issue-prompt",
            Self::WhatNext => "what-next",
            Self::Completion => "completion",
            Self::NoSignal => "no-signal",
        };
        f.write_str(label)
    }
}

/// Classifies agent output.
pub trait OutputClassifier: Send + Sync {
    /// Classify ANSI-stripped text.
    fn classify(&self, text: &str) -> Verdict;

    /// Whether the first offered option is a fix; only used to label replies.
    fn fix_is_first_option(&self, text: &str) -> bool;
}

/// Regex heuristics over the tail of the output.
#[derive(Debug, Clone)]
pub struct HeuristicClassifier {
    window_chars: usize,
}

impl HeuristicClassifier {
    pub fn new(window_chars: usize) -> Self {
        Self { window_chars }
    }
}

impl Default for HeuristicClassifier {
    fn default() -> Self {
        Self::new(3000)
    }
}

impl OutputClassifier for HeuristicClassifier {
    fn classify(&self, text: &str) -> Verdict {
        let window = tail_window(text, self.window_chars);

        if patterns::is_commit_question(window) {
            Verdict::CommitQuestion
        } else if patterns::is_bmad_menu(window) {
            Verdict::BmadMenu
        } else if patterns::is_issue_prompt(window) {
            Verdict::IssuePrompt
        } else if patterns::is_what_next(window) {
            Verdict::WhatNext
        } else if patterns::is_completion(window) {
            Verdict::Completion
        } else {
            Verdict::NoSignal
        }
    }

    fn fix_is_first_option(&self, text: &str) -> bool {
        patterns::is_fix_first_option(tail_window(text, self.window_chars))
    }
}

/// Compile one of the built-in patterns.
#[allow(clippy::expect_used)]
pub(crate) fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in classifier pattern must compile")
}
