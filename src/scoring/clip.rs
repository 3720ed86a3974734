//! CLIP scorer on ONNX Runtime.
//!
//! Implements [`Scorer`] with a combined CLIP ViT-B/32 export (text and vision
//! towers in one graph) via `ort`. Handles prompt templating, tokenization,
//! pixel normalization, and reads `logits_per_image`.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use ndarray::Array4;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::{render_prompt, ScoreError, Scorer};
use crate::candidate::{CandidateImage, CANDIDATE_SIZE};
use crate::config::ModelConfig;

/// CLIP's text context length.
const MAX_SEQ_LEN: usize = 77;

#[allow(clippy::excessive_precision)]
const CLIP_MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
#[allow(clippy::excessive_precision)]
const CLIP_STD: [f32; 3] = [0.26862954, 0.26130258, 0.27577711];

pub const MODEL_FILE: &str = "model.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// CLIP-based scorer.
///
/// The session is shared by every request and guarded by a `Mutex`, so forward
/// passes run one at a time. The tokenizer is read-only.
pub struct ClipScorer {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    prompt_template: String,
    batch_size: usize,
}

impl ClipScorer {
    pub fn new(model_dir: &Path, config: &ModelConfig) -> Result<Self> {
        let model_path = model_dir.join(MODEL_FILE);
        let tokenizer_path = model_dir.join(TOKENIZER_FILE);

        anyhow::ensure!(
            model_path.exists(),
            "ONNX model not found at {}. Run `stylist model download` first.",
            model_path.display()
        );
        anyhow::ensure!(
            tokenizer_path.exists(),
            "Tokenizer not found at {}. Run `stylist model download` first.",
            tokenizer_path.display()
        );

        let session = session_builder()?
            .with_intra_threads(config.intra_threads.max(1))?
            .commit_from_file(&model_path)
            .context("failed to load ONNX model")?;

        tracing::info!(model = %model_path.display(), name = %config.name, "ONNX model loaded");

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;

        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to set truncation: {e}"))?;

        tracing::info!(tokenizer = %tokenizer_path.display(), "tokenizer loaded");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            prompt_template: config.prompt_template.clone(),
            batch_size: config.batch_size.max(1),
        })
    }

    /// Tokenize the templated prompt into `(input_ids, attention_mask)`.
    fn encode_prompt(&self, prompt: &str) -> Result<(Vec<i64>, Vec<i64>)> {
        let text = render_prompt(&self.prompt_template, prompt);
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("tokenization failed: {e}"))?;

        let ids = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let mask = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        Ok((ids, mask))
    }

    /// One forward pass: every image in `images` against the same prompt.
    fn run_chunk(&self, images: &[CandidateImage], ids: &[i64], mask: &[i64]) -> Result<Vec<f32>> {
        let text_shape = vec![1i64, ids.len() as i64];
        let input_ids = Tensor::from_array((text_shape.clone(), ids.to_vec().into_boxed_slice()))?;
        let attention_mask = Tensor::from_array((text_shape, mask.to_vec().into_boxed_slice()))?;
        let pixel_values = Tensor::from_array(pixel_values(images))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("session lock poisoned: {e}"))?;

        let outputs = session.run(ort::inputs! {
            "input_ids" => input_ids,
            "attention_mask" => attention_mask,
            "pixel_values" => pixel_values,
        })?;

        let logits = outputs
            .get("logits_per_image")
            .context("model has no logits_per_image output")?;
        let (shape, data) = logits
            .try_extract_tensor::<f32>()
            .context("failed to extract logits_per_image tensor")?;

        let dims: &[i64] = &shape;
        image_logits(dims, data, images.len())
    }
}

impl Scorer for ClipScorer {
    fn score(&self, image: &CandidateImage, prompt: &str) -> Result<f32, ScoreError> {
        let scores = self.score_batch(std::slice::from_ref(image), prompt)?;
        scores
            .into_iter()
            .next()
            .ok_or_else(|| ScoreError::Inference(anyhow::anyhow!("model returned no score")))
    }

    fn score_batch(&self, images: &[CandidateImage], prompt: &str) -> Result<Vec<f32>, ScoreError> {
        if images.is_empty() {
            return Ok(vec![]);
        }

        let (ids, mask) = self.encode_prompt(prompt).map_err(ScoreError::Inference)?;
        let scores = score_in_chunks(images, self.batch_size, |chunk| {
            self.run_chunk(chunk, &ids, &mask)
        })
        .map_err(ScoreError::Inference)?;

        tracing::debug!(images = images.len(), "scored candidates");
        Ok(scores)
    }
}

/// Run `forward` over `images` in chunks of `batch_size`, concatenating the scores.
fn score_in_chunks<F>(images: &[CandidateImage], batch_size: usize, mut forward: F) -> Result<Vec<f32>>
where
    F: FnMut(&[CandidateImage]) -> Result<Vec<f32>>,
{
    let mut scores = Vec::with_capacity(images.len());
    for chunk in images.chunks(batch_size.max(1)) {
        let chunk_scores = forward(chunk)?;
        anyhow::ensure!(
            chunk_scores.len() == chunk.len(),
            "forward pass returned {} scores for {} images",
            chunk_scores.len(),
            chunk.len()
        );
        scores.extend(chunk_scores);
    }
    Ok(scores)
}

/// Session builder with CUDA registered when the `cuda` feature is on and available.
fn session_builder() -> Result<SessionBuilder> {
    #[allow(unused_mut)]
    let mut builder =
        Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

    #[cfg(feature = "cuda")]
    {
        use ort::ep::{self, ExecutionProvider};

        let ep = ep::CUDA::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
            tracing::info!("CUDA execution provider registered");
        } else {
            tracing::warn!("cuda feature is enabled, onnx runtime not compiled with cuda");
        }
    }

    Ok(builder)
}

/// Build the `[batch, 3, 224, 224]` NCHW tensor, scaled to `[0, 1]` then
/// normalized with CLIP's per-channel mean and std.
fn pixel_values(images: &[CandidateImage]) -> Array4<f32> {
    let size = CANDIDATE_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((images.len(), 3, size, size));

    for (b, image) in images.iter().enumerate() {
        for (x, y, pixel) in image.pixels().enumerate_pixels() {
            for c in 0..3usize {
                let val = pixel[c] as f32 / 255.0;
                tensor[[b, c, y as usize, x as usize]] = (val - CLIP_MEAN[c]) / CLIP_STD[c];
            }
        }
    }

    tensor
}

/// Pull column 0 of a `[batch, n_texts]` logits tensor.
fn image_logits(dims: &[i64], data: &[f32], batch: usize) -> Result<Vec<f32>> {
    anyhow::ensure!(
        dims.len() == 2 && dims[0] == batch as i64 && dims[1] >= 1,
        "unexpected logits_per_image shape: {dims:?}, expected [{batch}, 1]"
    );
    let stride = dims[1] as usize;
    Ok((0..batch).map(|b| data[b * stride]).collect())
}
