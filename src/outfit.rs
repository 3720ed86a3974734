//! Outfit selection: pick the candidate that best matches a prompt.
//!
//! [`select_outfit`] scores every candidate with a [`Scorer`] and keeps the
//! highest score. Ties go to the earliest candidate. Non-finite scores are
//! skipped so a single NaN cannot win or block later candidates.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::candidate::CandidateImage;
use crate::scoring::{ScoreError, Scorer};

#[derive(Debug, Error)]
pub enum SelectError {
    #[error("no candidate images to choose from")]
    NoCandidates,
    /// Every candidate produced a non-finite score.
    #[error("no candidate produced a finite score (first invalid: #{index} = {score})")]
    InvalidScore { index: usize, score: f32 },
    #[error(transparent)]
    Inference(#[from] ScoreError),
}

/// The winning candidate's position in the input and its score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Selection {
    pub index: usize,
    pub score: f32,
}

/// Argmax over `scores` with strict `>`, so the first of equal scores wins.
pub fn best_index(scores: &[f32]) -> Result<Selection, SelectError> {
    if scores.is_empty() {
        return Err(SelectError::NoCandidates);
    }

    let mut best: Option<Selection> = None;
    let mut first_invalid: Option<Selection> = None;

    for (index, &score) in scores.iter().enumerate() {
        if !score.is_finite() {
            warn!(index, score, "skipping candidate with non-finite score");
            first_invalid.get_or_insert(Selection { index, score });
            continue;
        }
        match best {
            Some(current) if score <= current.score => {}
            _ => best = Some(Selection { index, score }),
        }
    }

    match (best, first_invalid) {
        (Some(selection), _) => Ok(selection),
        (None, Some(invalid)) => Err(SelectError::InvalidScore {
            index: invalid.index,
            score: invalid.score,
        }),
        (None, None) => Err(SelectError::NoCandidates),
    }
}

/// Score every candidate against `prompt` and return the winner's position.
///
/// Fails before calling the scorer when `candidates` is empty. Any scoring
/// failure aborts the whole selection.
pub fn select_index(
    scorer: &dyn Scorer,
    prompt: &str,
    candidates: &[CandidateImage],
) -> Result<Selection, SelectError> {
    if candidates.is_empty() {
        return Err(SelectError::NoCandidates);
    }

    let scores = scorer.score_batch(candidates, prompt)?;
    if scores.len() != candidates.len() {
        return Err(ScoreError::Inference(anyhow::anyhow!(
            "scorer returned {} scores for {} candidates",
            scores.len(),
            candidates.len()
        ))
        .into());
    }
    debug!(candidates = candidates.len(), ?scores, "candidates scored");
    best_index(&scores)
}

/// Pick the best outfit for `prompt`. The result holds exactly one image.
pub fn select_outfit(
    scorer: &dyn Scorer,
    prompt: &str,
    mut candidates: Vec<CandidateImage>,
) -> Result<Vec<CandidateImage>, SelectError> {
    let selection = select_index(scorer, prompt, &candidates)?;
    Ok(vec![candidates.swap_remove(selection.index)])
}
