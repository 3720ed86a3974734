mod helpers;

use helpers::{solid, ColorScorer, FailingScorer, RedScorer, ShortScorer};
use stylist::outfit::{select_index, select_outfit, SelectError};
use stylist::scoring::Scorer;

const RED: [u8; 3] = [255, 0, 0];
const GREEN: [u8; 3] = [0, 255, 0];
const BLUE: [u8; 3] = [0, 0, 255];
const GRAY: [u8; 3] = [128, 128, 128];

#[test]
fn returns_exactly_one_input_image() {
    let scorer = ColorScorer::new(&[(RED, 0.2), (GREEN, 0.9), (BLUE, 0.4)]);
    let candidates = vec![solid(RED), solid(GREEN), solid(BLUE)];

    let picked = select_outfit(&scorer, "summer picnic", candidates.clone()).unwrap();

    assert_eq!(picked.len(), 1);
    assert_eq!(picked[0], candidates[1]);
}

#[test]
fn winner_has_maximal_score() {
    let scores = [(RED, 21.5), (GREEN, 24.0), (BLUE, 19.25), (GRAY, 23.9)];
    let scorer = ColorScorer::new(&scores);
    let candidates: Vec<_> = scores.iter().map(|(c, _)| solid(*c)).collect();

    let selection = select_index(&scorer, "job interview", &candidates).unwrap();

    assert_eq!(selection.index, 1);
    assert!(scores.iter().all(|(_, s)| *s <= selection.score));
}

#[test]
fn ties_go_to_the_earliest_candidate() {
    let scorer = ColorScorer::new(&[(RED, 0.5), (GREEN, 0.8), (BLUE, 0.8)]);
    let candidates = vec![solid(RED), solid(GREEN), solid(BLUE)];

    let selection = select_index(&scorer, "wedding", &candidates).unwrap();
    assert_eq!(selection.index, 1);

    // Same image twice: the first copy wins.
    let selection = select_index(&scorer, "wedding", &[solid(GRAY), solid(GRAY)]).unwrap();
    assert_eq!(selection.index, 0);
}

#[test]
fn single_candidate_is_returned() {
    let scorer = ColorScorer::new(&[]);
    let picked = select_outfit(&scorer, "anything", vec![solid(BLUE)]).unwrap();
    assert_eq!(picked, vec![solid(BLUE)]);
}

#[test]
fn all_negative_scores_still_pick_a_winner() {
    let scorer = ColorScorer::new(&[(RED, -3.0), (GREEN, -1.5), (BLUE, -2.0)]);
    let selection = select_index(&scorer, "rainy day", &[solid(RED), solid(GREEN), solid(BLUE)])
        .unwrap();
    assert_eq!(selection.index, 1);
    assert_eq!(selection.score, -1.5);
}

#[test]
fn empty_input_is_an_error() {
    let scorer = ColorScorer::new(&[]);
    let err = select_outfit(&scorer, "anything", Vec::new()).unwrap_err();
    assert!(matches!(err, SelectError::NoCandidates));
    assert_eq!(scorer.calls(), 0, "scorer must not be called without candidates");
}

#[test]
fn every_candidate_is_scored_once() {
    let scorer = ColorScorer::new(&[(GREEN, 1.0)]);
    let candidates = vec![solid(RED), solid(GREEN), solid(BLUE), solid(GRAY), solid(RED)];
    select_index(&scorer, "gym", &candidates).unwrap();
    assert_eq!(scorer.calls(), candidates.len());
}

#[test]
fn nan_scores_never_win() {
    let scorer = ColorScorer::new(&[(RED, f32::NAN), (GREEN, 0.1), (BLUE, 0.3)]);
    let selection = select_index(&scorer, "party", &[solid(RED), solid(GREEN), solid(BLUE)])
        .unwrap();
    assert_eq!(selection.index, 2);
}

#[test]
fn all_nan_scores_are_reported() {
    let scorer = ColorScorer::new(&[(RED, f32::NAN), (BLUE, f32::NAN)]);
    let err = select_index(&scorer, "party", &[solid(RED), solid(BLUE)]).unwrap_err();
    assert!(matches!(err, SelectError::InvalidScore { index: 0, .. }));
}

#[test]
fn scorer_failure_propagates() {
    let err = select_index(&FailingScorer, "party", &[solid(RED)]).unwrap_err();
    assert!(matches!(err, SelectError::Inference(_)));
}

#[test]
fn short_score_list_is_an_inference_error() {
    let err = select_index(&ShortScorer, "party", &[solid(RED), solid(BLUE)]).unwrap_err();
    assert!(matches!(err, SelectError::Inference(_)));
}

#[test]
fn prompt_is_passed_through_for_every_candidate() {
    let scorer = RedScorer::default();
    select_index(&scorer, "black tie gala", &[solid(RED), solid(GRAY)]).unwrap();
    let prompts = scorer.prompts.lock().unwrap();
    assert_eq!(prompts.as_slice(), ["black tie gala", "black tie gala"]);
}

#[test]
fn score_does_not_depend_on_other_candidates() {
    let scorer = RedScorer::default();
    let alone = scorer.score(&solid(GRAY), "brunch").unwrap();
    let batch = scorer
        .score_batch(&[solid(RED), solid(GRAY), solid(BLUE)], "brunch")
        .unwrap();
    assert_eq!(batch[1], alone);
}

#[test]
fn reordering_moves_the_winner_with_its_image() {
    let scorer = ColorScorer::new(&[(RED, 0.3), (GREEN, 0.7), (BLUE, 0.5)]);
    let forward = select_outfit(&scorer, "beach", vec![solid(RED), solid(GREEN), solid(BLUE)])
        .unwrap();
    let reversed = select_outfit(&scorer, "beach", vec![solid(BLUE), solid(GREEN), solid(RED)])
        .unwrap();
    assert_eq!(forward, reversed);
    assert_eq!(forward[0], solid(GREEN));
}
