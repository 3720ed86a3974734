//! Image-text compatibility scoring.
//!
//! Provides the [`Scorer`] trait and a CLIP implementation backed by ONNX
//! Runtime. The scorer is created via [`create_scorer`] from configuration.

pub mod clip;

use thiserror::Error;

use crate::candidate::CandidateImage;

/// Template the user prompt is wrapped in before tokenization.
pub const DEFAULT_PROMPT_TEMPLATE: &str =
    "Give me an outfit based on following prompt from the user: {prompt}";

/// Placeholder substituted by [`render_prompt`].
pub const PROMPT_PLACEHOLDER: &str = "{prompt}";

#[derive(Debug, Error)]
pub enum ScoreError {
    /// The model or its processor could not handle the input.
    #[error("inference failed")]
    Inference(#[source] anyhow::Error),
}

/// Trait for scoring how well an image matches a text prompt.
///
/// Scores are raw logits: no fixed range, higher is better. All methods are
/// synchronous; callers in async contexts should use `tokio::task::spawn_blocking`.
pub trait Scorer: Send + Sync {
    /// Score one image against one prompt.
    fn score(&self, image: &CandidateImage, prompt: &str) -> Result<f32, ScoreError>;

    /// Score several images against one prompt, in input order.
    ///
    /// Implementations may override this for batched inference, but each score
    /// must equal what [`Scorer::score`] returns for that image alone.
    fn score_batch(&self, images: &[CandidateImage], prompt: &str) -> Result<Vec<f32>, ScoreError> {
        images.iter().map(|img| self.score(img, prompt)).collect()
    }
}

/// Wrap a user prompt in `template`, replacing every `{prompt}`.
pub fn render_prompt(template: &str, prompt: &str) -> String {
    template.replace(PROMPT_PLACEHOLDER, prompt)
}

/// Create a scorer from config.
///
/// Currently only `"clip"` is supported (ONNX Runtime + CLIP ViT-B/32).
/// Returns an error if model files are not found; run `stylist model download` first.
pub fn create_scorer(config: &crate::config::StylistConfig) -> anyhow::Result<Box<dyn Scorer>> {
    match config.model.provider.as_str() {
        "clip" => {
            let scorer = clip::ClipScorer::new(&config.resolved_model_dir(), &config.model)?;
            Ok(Box::new(scorer))
        }
        other => anyhow::bail!("unknown scoring provider: {other}. Supported: clip"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_wraps_prompt() {
        assert_eq!(
            render_prompt(DEFAULT_PROMPT_TEMPLATE, "beach wedding"),
            "Give me an outfit based on following prompt from the user: beach wedding"
        );
    }

    #[test]
    fn template_without_placeholder_is_unchanged() {
        assert_eq!(render_prompt("a photo of clothes", "ignored"), "a photo of clothes");
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let mut config = crate::config::StylistConfig::default();
        config.model.provider = "dall-e".into();
        let err = create_scorer(&config).err().expect("unknown provider must fail");
        assert!(err.to_string().contains("unknown scoring provider"));
    }
}
