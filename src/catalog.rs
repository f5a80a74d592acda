//! Model catalog loaded from a markdown file
//!
//! The catalog file groups models under `# <Provider> Models` headings. Each
//! model is a single line of the form
//!
//! ```text
//! Model Name (vision, search) - https://beta.t3.chat/new?model=slug&q=%s Premium note
//! ```
//!
//! The URL is a prompt template: `%s` is replaced with the URL-encoded
//! question at request time.

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::extract::GenerationKind;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read model catalog: {0}")]
    Read(String),

    #[error("Invalid model line pattern: {0}")]
    Pattern(String),
}

/// Capability flags parsed from the parenthesized feature list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFeatures {
    #[serde(default)]
    pub vision: bool,
    #[serde(default)]
    pub reasoning: bool,
    #[serde(default)]
    pub pdf: bool,
    #[serde(default)]
    pub search: bool,
    #[serde(default)]
    pub effort_control: bool,
    #[serde(default)]
    pub fast: bool,
    #[serde(default)]
    pub image_gen: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelTier {
    Regular,
    Premium,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    pub provider: String,
    /// Prompt URL template containing a `%s` placeholder for the question.
    pub url: String,
    pub features: ModelFeatures,
    pub special_notes: Option<String>,
    pub tier: ModelTier,
}

impl Model {
    /// Image-generation models produce an image asset; everything else
    /// produces text.
    pub fn generation_kind(&self) -> GenerationKind {
        if self.features.image_gen {
            GenerationKind::Image
        } else {
            GenerationKind::Text
        }
    }
}

/// Parsed model catalog with lookup helpers.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: Vec<Model>,
}

impl ModelCatalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| CatalogError::Read(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, CatalogError> {
        let line_re = Regex::new(
            r"^(.+?)\s*\(([^)]*)\)\s*-\s*(https://beta\.t3\.chat/new\?model=([^&]+)&q=%s)(.*)$",
        )
        .map_err(|e| CatalogError::Pattern(e.to_string()))?;

        let mut models = Vec::new();
        let mut provider = String::new();

        for line in content.lines() {
            if let Some(heading) = line.strip_prefix("# ")
                && heading.contains("Models")
            {
                provider = heading.replace(" Models", "");
                continue;
            }
            if !line.contains("https://beta.t3.chat/new?model=") {
                continue;
            }
            let Some(caps) = line_re.captures(line) else {
                debug!("Skipping malformed model line: {}", line);
                continue;
            };

            let name = caps[1].trim().to_string();
            let mut features = parse_features(&caps[2]);
            let url = caps[3].to_string();
            let notes = caps[5].trim().to_string();
            let tier = parse_tier(&notes);

            let lower = name.to_lowercase();
            if lower.contains("imagegen") || lower.contains("image gen") {
                features.image_gen = true;
            }

            models.push(Model {
                name,
                provider: provider.clone(),
                url,
                features,
                special_notes: (!notes.is_empty()).then(|| notes.clone()),
                tier,
            });
        }

        Ok(Self { models })
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    /// Case-insensitive substring match on the model name.
    pub fn find(&self, name: &str) -> Option<&Model> {
        let needle = name.to_lowercase();
        self.models
            .iter()
            .find(|m| m.name.to_lowercase().contains(&needle))
    }

    pub fn by_provider(&self, provider: &str) -> Vec<&Model> {
        self.models
            .iter()
            .filter(|m| m.provider.eq_ignore_ascii_case(provider))
            .collect()
    }

    pub fn by_tier(&self, tier: ModelTier) -> Vec<&Model> {
        self.models.iter().filter(|m| m.tier == tier).collect()
    }
}

fn parse_tier(notes: &str) -> ModelTier {
    if notes.to_lowercase().contains("premium") {
        ModelTier::Premium
    } else {
        ModelTier::Regular
    }
}

fn parse_features(list: &str) -> ModelFeatures {
    let mut features = ModelFeatures::default();
    for item in list.split(',') {
        match item.trim().to_lowercase().as_str() {
            "vision" => features.vision = true,
            "reasoning" => features.reasoning = true,
            "pdf" => features.pdf = true,
            "search" => features.search = true,
            "effort control" => features.effort_control = true,
            "fast" => features.fast = true,
            _ => {}
        }
    }
    features
}
