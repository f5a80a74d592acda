//! Extraction strategy chains
//!
//! An ordered table of independent, idempotent strategies; the first one
//! producing a classifier-accepted candidate wins. Transient probe failures
//! (element detached, navigation in progress) are swallowed as "no candidate
//! this attempt"; the poller simply tries again.

use anyhow::{Context, Result, anyhow};
use tracing::{debug, warn};

use super::classifier::ContentClassifier;
use super::config::ExtractConfig;
use super::fetch::{AssetFetcher, decode_data_url};
use super::observe::PageObserver;
use super::types::{ExtractionCandidate, ImageAsset};

/// Text strategies, tried in this priority order on every attempt. The
/// raw-body fallback is deliberately not in the table: it only runs near the
/// deadline, when nothing else matched.
pub(crate) const TEXT_CHAIN: [TextStrategy; 4] = [
    TextStrategy::DirectSelector,
    TextStrategy::LabelledRegion,
    TextStrategy::StructuralHeuristic,
    TextStrategy::TextWalk,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextStrategy {
    /// Prioritized structural locators; last matching element holds the
    /// newest message bubble.
    DirectSelector,
    /// Region following an accessibility marker naming the assistant's turn.
    LabelledRegion,
    /// Generic content containers filtered by length and topical anchors.
    StructuralHeuristic,
    /// All visible text nodes, denylist-filtered, last long fragment wins.
    TextWalk,
    /// Rendered body split on footer markers; deadline-pressure only.
    RawBody,
}

impl TextStrategy {
    pub(crate) async fn attempt<O: PageObserver + ?Sized>(
        self,
        observer: &O,
        config: &ExtractConfig,
        classifier: &ContentClassifier,
    ) -> Option<String> {
        match self {
            Self::DirectSelector => direct_selector(observer, config, classifier).await,
            Self::LabelledRegion => labelled_region(observer, config, classifier).await,
            Self::StructuralHeuristic => structural_heuristic(observer, config, classifier).await,
            Self::TextWalk => text_walk(observer, config, classifier).await,
            Self::RawBody => raw_body(observer, config, classifier).await,
        }
    }
}

/// Run the text chain once. `include_raw_body` is set by the caller when the
/// overall deadline is near.
pub(crate) async fn run_text_chain<O: PageObserver + ?Sized>(
    observer: &O,
    config: &ExtractConfig,
    classifier: &ContentClassifier,
    include_raw_body: bool,
) -> Option<ExtractionCandidate> {
    for strategy in TEXT_CHAIN {
        if let Some(text) = strategy.attempt(observer, config, classifier).await {
            debug!(?strategy, len = text.len(), "strategy produced accepted candidate");
            return Some(ExtractionCandidate::Text(text));
        }
    }
    if include_raw_body
        && let Some(text) = TextStrategy::RawBody
            .attempt(observer, config, classifier)
            .await
    {
        debug!(len = text.len(), "raw-body fallback produced accepted candidate");
        return Some(ExtractionCandidate::Text(text));
    }
    None
}

async fn direct_selector<O: PageObserver + ?Sized>(
    observer: &O,
    config: &ExtractConfig,
    classifier: &ContentClassifier,
) -> Option<String> {
    for selector in &config.response_selectors {
        let texts = match observer.texts(selector).await {
            Ok(texts) => texts,
            Err(e) => {
                debug!("selector probe failed for {selector}: {e}");
                continue;
            }
        };
        if let Some(text) = texts.iter().rev().find(|t| !t.trim().is_empty())
            && classifier.accept_text(text)
        {
            return Some(text.trim().to_string());
        }
    }
    None
}

async fn labelled_region<O: PageObserver + ?Sized>(
    observer: &O,
    config: &ExtractConfig,
    classifier: &ContentClassifier,
) -> Option<String> {
    let text = observer
        .labelled_region_text(&config.assistant_label)
        .await
        .ok()
        .flatten()?;
    let trimmed = text.trim();
    classifier.accept_text(trimmed).then(|| trimmed.to_string())
}

async fn structural_heuristic<O: PageObserver + ?Sized>(
    observer: &O,
    config: &ExtractConfig,
    classifier: &ContentClassifier,
) -> Option<String> {
    let anchors = anchor_terms(classifier.question(), &config.anchor_phrases);
    if anchors.is_empty() {
        return None;
    }
    let blocks = observer.texts(&config.container_selector).await.ok()?;
    blocks
        .iter()
        .map(|b| b.trim())
        .filter(|b| b.chars().count() >= config.structural_min_len)
        .filter(|b| {
            let lower = b.to_lowercase();
            anchors.iter().any(|a| lower.contains(a.as_str()))
        })
        .filter(|b| classifier.accept_text(b))
        .max_by_key(|b| b.chars().count())
        .map(str::to_string)
}

/// Topical anchors: the question's longer words, plus any configured phrases.
fn anchor_terms(question: &str, extra: &[String]) -> Vec<String> {
    let mut terms: Vec<String> = question
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| w.chars().count() >= 5)
        .take(4)
        .collect();
    terms.extend(extra.iter().map(|p| p.to_lowercase()));
    terms.sort();
    terms.dedup();
    terms
}

async fn text_walk<O: PageObserver + ?Sized>(
    observer: &O,
    config: &ExtractConfig,
    classifier: &ContentClassifier,
) -> Option<String> {
    let blocks = observer.visible_text_blocks(config.walk_min_len).await.ok()?;
    blocks
        .iter()
        .rev()
        .map(|b| b.trim())
        .find(|b| classifier.accept_text(b))
        .map(str::to_string)
}

async fn raw_body<O: PageObserver + ?Sized>(
    observer: &O,
    config: &ExtractConfig,
    classifier: &ContentClassifier,
) -> Option<String> {
    let mut body = observer.body_text().await.unwrap_or_default();
    if body.trim().is_empty() {
        // SPA with empty innerText: fall back to the rendered DOM.
        let html = observer.rendered_html().await.ok()?;
        body = html2md::parse_html(&html);
    }

    let mut segments = vec![body];
    for marker in &config.footer_markers {
        segments = segments
            .into_iter()
            .flat_map(|s| {
                s.split(marker.as_str())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect();
    }
    segments
        .iter()
        .map(|s| s.trim())
        .filter(|s| classifier.accept_text(s))
        .max_by_key(|s| s.chars().count())
        .map(str::to_string)
}

/// Image locator chain for image-generation requests: prioritized selectors,
/// plausibility filter, then bytes via in-page capture or out-of-band fetch.
/// A failed download is logged and the next candidate is tried.
pub(crate) async fn run_image_chain<O, F>(
    observer: &O,
    fetcher: &F,
    config: &ExtractConfig,
    classifier: &ContentClassifier,
) -> Option<ExtractionCandidate>
where
    O: PageObserver + ?Sized,
    F: AssetFetcher + ?Sized,
{
    for selector in &config.image_selectors {
        let images = match observer.images(selector).await {
            Ok(images) => images,
            Err(e) => {
                debug!("image probe failed for {selector}: {e}");
                continue;
            }
        };
        for image in images {
            if !classifier.accept_image_src(&image.src) {
                continue;
            }
            match materialize(observer, fetcher, &image.src).await {
                Ok(bytes) => {
                    debug!(src = %image.src, size = bytes.len(), "materialized generated image");
                    return Some(ExtractionCandidate::Image(ImageAsset {
                        source_url: image.src,
                        bytes: Some(bytes),
                    }));
                }
                Err(e) => warn!("failed to materialize candidate image {}: {e:#}", image.src),
            }
        }
    }

    // No image element matched: scan page text and attributes for literal
    // upload-host URLs and try each in discovery order.
    let urls = observer
        .scan_asset_urls(&config.asset_url_pattern)
        .await
        .unwrap_or_default();
    for url in urls {
        match fetcher.fetch(&url).await {
            Ok(bytes) => {
                debug!(%url, size = bytes.len(), "downloaded image from scanned asset URL");
                return Some(ExtractionCandidate::Image(ImageAsset {
                    source_url: url,
                    bytes: Some(bytes),
                }));
            }
            Err(e) => warn!("failed to download scanned asset URL {url}: {e}"),
        }
    }
    None
}

/// Turn an image locator into bytes. Ephemeral locators (data:, blob:) must
/// be captured inside the page; anything else is fetched out of band.
async fn materialize<O, F>(observer: &O, fetcher: &F, src: &str) -> Result<Vec<u8>>
where
    O: PageObserver + ?Sized,
    F: AssetFetcher + ?Sized,
{
    if src.starts_with("data:") {
        return match decode_data_url(src) {
            Ok(bytes) => Ok(bytes),
            // Odd encodings still render; capture the element instead.
            Err(_) => observer
                .capture_image(src)
                .await
                .context("capture of data: image failed"),
        };
    }
    if src.starts_with("blob:") {
        return observer
            .capture_image(src)
            .await
            .context("capture of blob: image failed");
    }
    fetcher
        .fetch(src)
        .await
        .map_err(|e| anyhow!("download failed: {e}"))
}
