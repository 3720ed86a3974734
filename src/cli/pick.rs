//! CLI `pick` command: choose the best outfit among local image files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use stylist::candidate::CandidateImage;
use stylist::config::StylistConfig;
use stylist::outfit::{self, Selection};
use stylist::scoring;

#[derive(Serialize)]
struct PickResult<'a> {
    path: &'a Path,
    #[serde(flatten)]
    selection: Selection,
}

/// Score `images` against `prompt` with the configured model and print the winner.
pub fn pick(config: &StylistConfig, prompt: &str, images: &[PathBuf], json: bool) -> Result<()> {
    let candidates = images
        .iter()
        .map(|path| {
            let bytes =
                std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            CandidateImage::decode(&bytes)
                .with_context(|| format!("failed to decode {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let scorer = scoring::create_scorer(config)?;
    let selection = outfit::select_index(scorer.as_ref(), prompt, &candidates)?;
    let winner = &images[selection.index];

    if json {
        let out = PickResult {
            path: winner,
            selection,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("Best match: {}", winner.display());
        println!("Score:      {:.4}", selection.score);
        println!("Candidates: {}", candidates.len());
    }
    Ok(())
}
