//! Data model for one extraction run
//!
//! Everything here is owned by a single run: contexts are immutable once
//! built, candidates are ephemeral per attempt, and results are terminal.

use std::time::Duration;

/// Whether the remote model is expected to produce text or an image artifact.
///
/// Derived from the target model's capability flags; selects which attempt
/// budget and strategy set applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationKind {
    Text,
    Image,
}

/// One submitted request, immutable for the duration of its extraction run.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The question as the user typed it (without attachment URLs).
    pub question: String,
    /// Optional image attachment reference, prepended to the prompt on submit.
    pub image_url: Option<String>,
    /// Optional document attachment reference, prepended to the prompt on submit.
    pub document_url: Option<String>,
    /// Ask the remote model to use web search, when the model supports it.
    pub search_enabled: bool,
    pub kind: GenerationKind,
}

impl RequestContext {
    pub fn text(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            image_url: None,
            document_url: None,
            search_enabled: false,
            kind: GenerationKind::Text,
        }
    }

    pub fn image(question: impl Into<String>) -> Self {
        Self {
            kind: GenerationKind::Image,
            ..Self::text(question)
        }
    }

    /// The full text typed into the composer: attachment URLs first, then the
    /// question, matching what the remote page actually receives.
    pub fn full_prompt(&self) -> String {
        let mut prompt = String::new();
        if let Some(url) = &self.image_url {
            prompt.push_str(url);
            prompt.push('\n');
        }
        if let Some(url) = &self.document_url {
            prompt.push_str(url);
            prompt.push('\n');
        }
        if prompt.is_empty() {
            self.question.clone()
        } else {
            prompt.push('\n');
            prompt.push_str(&self.question);
            prompt
        }
    }
}

/// A downloaded or captured image artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    /// Where the bytes came from (img src, literal asset URL, or data:/blob: locator).
    pub source_url: String,
    /// Present once the asset has been materialized.
    pub bytes: Option<Vec<u8>>,
}

/// Content pulled out of the page by one strategy, not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionCandidate {
    Text(String),
    Image(ImageAsset),
}

/// Outcome of one completion-detector wait.
///
/// Purely observational: derived from re-checkable page state, never a side
/// effect of anything this crate did.
#[derive(Debug, Clone, Copy)]
pub struct CompletionSignal {
    /// True when an explicit completion marker appeared or content stabilized.
    pub finished: bool,
    pub elapsed: Duration,
}

/// Terminal outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Text(String),
    Image(ImageAsset),
    /// Budget exhausted without an accepted candidate. Not an error: the
    /// caller degrades to a link-based response.
    Timeout,
    /// Hard failure before the race could start (observer wiring, page gone).
    Error(String),
}

/// Returned exactly once per run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub outcome: RunOutcome,
    pub elapsed_ms: u64,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Text(_) | RunOutcome::Image(_))
    }
}
