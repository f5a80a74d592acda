//! Extraction engine configuration
//!
//! Every selector list, marker string, and numeric budget the engine uses
//! lives here, deserializable from `config.yaml`. The remote UI changes
//! without notice, so nothing site-specific is hard-coded outside these
//! defaults.

use serde::{Deserialize, Serialize};

use super::budget::AttemptBudget;
use super::classifier::ClassifierConfig;
use super::types::GenerationKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Structural locators that typically hold the latest message bubble,
    /// in priority order. The last matching element per selector is the
    /// newest message.
    #[serde(default = "default_response_selectors")]
    pub response_selectors: Vec<String>,

    /// Accessibility label fragment naming the assistant's turn.
    #[serde(default = "default_assistant_label")]
    pub assistant_label: String,

    /// Generic content containers scanned by the structural heuristic.
    #[serde(default = "default_container_selector")]
    pub container_selector: String,

    /// Minimum aggregate length for a structural-heuristic block.
    #[serde(default = "default_structural_min_len")]
    pub structural_min_len: usize,

    /// Extra topical anchor phrases for the structural heuristic, on top of
    /// the terms derived from the question itself.
    #[serde(default)]
    pub anchor_phrases: Vec<String>,

    /// Minimum fragment length for the full-document text walk.
    #[serde(default = "default_walk_min_len")]
    pub walk_min_len: usize,

    /// Footer markers the raw-body fallback splits the rendered text on.
    #[serde(default = "default_footer_markers")]
    pub footer_markers: Vec<String>,

    /// Elements whose presence means the remote side is still generating.
    #[serde(default = "default_loading_selectors")]
    pub loading_selectors: Vec<String>,

    /// Elements whose presence is an explicit "generation finished" marker.
    #[serde(default = "default_completion_selectors")]
    pub completion_selectors: Vec<String>,

    /// Image locators, in priority order, for image-generation requests.
    #[serde(default = "default_image_selectors")]
    pub image_selectors: Vec<String>,

    /// JS regex source matching literal upload-host asset URLs in page text
    /// and attributes.
    #[serde(default = "default_asset_url_pattern")]
    pub asset_url_pattern: String,

    #[serde(default = "AttemptBudget::text")]
    pub text_budget: AttemptBudget,

    #[serde(default = "AttemptBudget::image")]
    pub image_budget: AttemptBudget,

    /// Bound on each post-race extraction pass, so the final attempts cannot
    /// blow the overall deadline by more than schedule overhead.
    #[serde(default = "default_final_pass_ms")]
    pub final_pass_ms: u64,
}

fn default_response_selectors() -> Vec<String> {
    [
        "[data-testid=\"message-content\"]",
        ".message-content",
        ".response",
        ".ai-response",
        ".chat-message",
        ".prose",
        "[role=\"main\"] > div:last-child",
        "main > div:last-child",
        ".conversation-item:last-child",
        ".chat-bubble:last-child",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_assistant_label() -> String {
    "assistant".to_string()
}

fn default_container_selector() -> String {
    "p, li, blockquote, pre, article".to_string()
}

fn default_structural_min_len() -> usize {
    40
}

fn default_walk_min_len() -> usize {
    50
}

fn default_footer_markers() -> Vec<String> {
    [
        "Upgrade to Pro",
        "Terms and our Privacy Policy",
        "Sign in to",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_loading_selectors() -> Vec<String> {
    [
        "[data-testid*=\"loading\"]",
        "[aria-busy=\"true\"]",
        ".animate-pulse",
        ".loading",
        ".generating",
        "[data-state=\"streaming\"]",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_completion_selectors() -> Vec<String> {
    [
        "[data-testid=\"message-complete\"]",
        "[data-state=\"complete\"]",
        ".message-actions",
        "button[aria-label*=\"Copy\"]",
        "button[aria-label*=\"Retry\"]",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_image_selectors() -> Vec<String> {
    [
        "img[src*=\"utfs.io\"]",
        "img[src*=\"uploadthing\"]",
        "img[src*=\"generated\"]",
        "img[src^=\"blob:\"]",
        "img[src^=\"data:image\"]",
        "img[alt*=\"generated\"]",
        "[data-testid=\"generated-image\"] img",
        ".generated-image img",
        ".ai-image img",
        "img:not([src*=\"avatar\"]):not([src*=\"logo\"]):not([src*=\"icon\"])",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_asset_url_pattern() -> String {
    r"https://utfs\.io/f/[A-Za-z0-9]+".to_string()
}

fn default_final_pass_ms() -> u64 {
    1000
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            response_selectors: default_response_selectors(),
            assistant_label: default_assistant_label(),
            container_selector: default_container_selector(),
            structural_min_len: default_structural_min_len(),
            anchor_phrases: Vec::new(),
            walk_min_len: default_walk_min_len(),
            footer_markers: default_footer_markers(),
            loading_selectors: default_loading_selectors(),
            completion_selectors: default_completion_selectors(),
            image_selectors: default_image_selectors(),
            asset_url_pattern: default_asset_url_pattern(),
            text_budget: AttemptBudget::text(),
            image_budget: AttemptBudget::image(),
            final_pass_ms: default_final_pass_ms(),
        }
    }
}

impl ExtractConfig {
    pub fn budget_for(&self, kind: GenerationKind) -> AttemptBudget {
        match kind {
            GenerationKind::Text => self.text_budget,
            GenerationKind::Image => self.image_budget,
        }
    }
}
