//! Content classifier: "is this plausibly the assistant's answer?"
//!
//! A pure predicate over a candidate. No page access, no hidden state: the
//! same candidate always classifies the same way, which keeps every rule
//! unit-testable. The denylists are injectable configuration because they are
//! inherently site-specific and change without notice.

use serde::{Deserialize, Serialize};
use url::Url;

use super::types::ExtractionCandidate;

/// Rules the classifier applies. All defaults were lifted from what the chat
/// site actually leaks into its transcript region today.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Shorter text is a label or a button, not an answer.
    #[serde(default = "default_min_text_len")]
    pub min_text_len: usize,

    /// Boilerplate substrings that mark a candidate as noise: telemetry
    /// snippets, upsell banners, sign-in prompts, legal footers.
    #[serde(default = "default_text_denylist")]
    pub text_denylist: Vec<String>,

    /// img src fragments that mark chrome assets rather than generated content.
    #[serde(default = "default_image_src_denylist")]
    pub image_src_denylist: Vec<String>,

    /// Hosts known to serve user-generated content; these bypass the src
    /// denylist entirely.
    #[serde(default = "default_image_host_allowlist")]
    pub image_host_allowlist: Vec<String>,

    /// Opaque srcs (blob:, signed CDN URLs) shorter than this are assumed to
    /// be icons.
    #[serde(default = "default_opaque_src_min_len")]
    pub opaque_src_min_len: usize,
}

fn default_min_text_len() -> usize {
    20
}

fn default_text_denylist() -> Vec<String> {
    [
        "window.plausible",
        "function()",
        "analytics",
        ".push(arguments)",
        "Upgrade to Pro",
        "Terms and our Privacy Policy",
        "Sign in to",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_image_src_denylist() -> Vec<String> {
    ["avatar", "logo", "icon", "favicon", "sprite", "emoji"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_image_host_allowlist() -> Vec<String> {
    ["utfs.io", "uploadthing"].into_iter().map(str::to_string).collect()
}

fn default_opaque_src_min_len() -> usize {
    50
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_text_len: default_min_text_len(),
            text_denylist: default_text_denylist(),
            image_src_denylist: default_image_src_denylist(),
            image_host_allowlist: default_image_host_allowlist(),
            opaque_src_min_len: default_opaque_src_min_len(),
        }
    }
}

/// Classifier bound to one run's question (for echo suppression).
#[derive(Debug, Clone)]
pub struct ContentClassifier {
    config: ClassifierConfig,
    question: String,
}

impl ContentClassifier {
    pub fn new(config: ClassifierConfig, question: impl Into<String>) -> Self {
        Self {
            config,
            question: question.into(),
        }
    }

    /// The submitted question this run is bound to.
    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn accept(&self, candidate: &ExtractionCandidate) -> bool {
        match candidate {
            ExtractionCandidate::Text(text) => self.accept_text(text),
            ExtractionCandidate::Image(asset) => self.accept_image_src(&asset.source_url),
        }
    }

    /// Accept text that is long enough, is not an echo of the question, and
    /// carries none of the boilerplate markers.
    pub fn accept_text(&self, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.chars().count() < self.config.min_text_len {
            return false;
        }
        if trimmed == self.question.trim() {
            return false;
        }
        // Inline script leakage always starts with the window global.
        if trimmed.starts_with("window.") {
            return false;
        }
        !self
            .config
            .text_denylist
            .iter()
            .any(|marker| trimmed.contains(marker.as_str()))
    }

    /// Accept an img src that plausibly points at generated content.
    ///
    /// Allowlisted upload hosts win outright; otherwise the src must be long
    /// enough to be a real asset locator and must not look like site chrome.
    pub fn accept_image_src(&self, src: &str) -> bool {
        if src.is_empty() {
            return false;
        }
        if let Ok(parsed) = Url::parse(src) {
            if let Some(host) = parsed.host_str() {
                if self
                    .config
                    .image_host_allowlist
                    .iter()
                    .any(|allowed| host.contains(allowed.as_str()))
                {
                    return true;
                }
            }
        }
        if self
            .config
            .image_src_denylist
            .iter()
            .any(|marker| src.contains(marker.as_str()))
        {
            return false;
        }
        src.len() > self.config.opaque_src_min_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::types::ImageAsset;

    fn classifier() -> ContentClassifier {
        ContentClassifier::new(ClassifierConfig::default(), "What is 2+2?")
    }

    #[test]
    fn rejects_text_below_minimum_length() {
        let c = classifier();
        assert!(!c.accept_text("4"));
        assert!(!c.accept_text("The answer is 4."));
        assert!(c.accept_text("The answer to your question is four."));
    }

    #[test]
    fn rejects_echo_of_the_question() {
        let c = ContentClassifier::new(
            ClassifierConfig::default(),
            "Explain the borrow checker in plain words",
        );
        assert!(!c.accept_text("  Explain the borrow checker in plain words  "));
    }

    #[test]
    fn rejects_denylisted_boilerplate() {
        let c = classifier();
        assert!(!c.accept_text("window.plausible = window.plausible || function()"));
        assert!(!c.accept_text("Upgrade to Pro for unlimited access to every model"));
        assert!(!c.accept_text("By continuing you accept our Terms and our Privacy Policy blah"));
        assert!(!c.accept_text("window.dataLayer stuff that is certainly long enough"));
    }

    #[test]
    fn denylist_is_data_driven() {
        let mut config = ClassifierConfig::default();
        config.text_denylist.push("FORBIDDEN".into());
        let c = ContentClassifier::new(config, "q");
        assert!(!c.accept_text("a perfectly long sentence containing FORBIDDEN text"));
        assert!(c.accept_text("a perfectly long sentence without the marker"));
    }

    #[test]
    fn accepts_allowlisted_image_hosts() {
        let c = classifier();
        assert!(c.accept_image_src("https://utfs.io/f/AbC123"));
        assert!(c.accept_image_src("https://files.uploadthing.com/x/y"));
    }

    #[test]
    fn rejects_chrome_assets() {
        let c = classifier();
        assert!(!c.accept_image_src("https://cdn.example.com/static/avatar-32.png"));
        assert!(!c.accept_image_src("https://example.com/favicon.ico"));
        assert!(!c.accept_image_src(""));
    }

    #[test]
    fn long_opaque_srcs_pass_the_length_heuristic() {
        let c = classifier();
        let long = format!("https://images.example.com/signed/{}", "a".repeat(60));
        assert!(c.accept_image_src(&long));
        assert!(!c.accept_image_src("https://ex.com/x.png"));
    }

    #[test]
    fn accept_dispatches_on_candidate_kind() {
        let c = classifier();
        assert!(c.accept(&ExtractionCandidate::Text(
            "A sufficiently long and novel answer.".into()
        )));
        assert!(c.accept(&ExtractionCandidate::Image(ImageAsset {
            source_url: "https://utfs.io/f/AbC123".into(),
            bytes: None,
        })));
    }

    #[test]
    fn classification_is_deterministic() {
        let c = classifier();
        let candidate = ExtractionCandidate::Text("Some long candidate answer text here.".into());
        let first = c.accept(&candidate);
        for _ in 0..10 {
            assert_eq!(c.accept(&candidate), first);
        }
    }
}
