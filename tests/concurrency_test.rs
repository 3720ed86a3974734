mod helpers;

use std::sync::Arc;
use std::thread;

use helpers::{solid, ColorScorer};
use stylist::outfit::select_index;
use stylist::scoring::Scorer;

#[test]
fn concurrent_selections_agree() {
    let scorer: Arc<dyn Scorer> = Arc::new(ColorScorer::new(&[
        ([10, 10, 10], 0.1),
        ([20, 20, 20], 0.95),
        ([30, 30, 30], 0.4),
    ]));
    let candidates = Arc::new(vec![
        solid([10, 10, 10]),
        solid([20, 20, 20]),
        solid([30, 30, 30]),
    ]);

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let scorer = Arc::clone(&scorer);
            let candidates = Arc::clone(&candidates);
            thread::spawn(move || {
                let prompt = format!("request {i}");
                select_index(scorer.as_ref(), &prompt, &candidates).unwrap()
            })
        })
        .collect();

    for handle in handles {
        let selection = handle.join().unwrap();
        assert_eq!(selection.index, 1);
        assert_eq!(selection.score, 0.95);
    }
}

#[test]
fn shared_scorer_counts_every_call() {
    let scorer = Arc::new(ColorScorer::new(&[]));
    let candidates = Arc::new(vec![solid([1, 2, 3]); 5]);

    thread::scope(|s| {
        for _ in 0..8 {
            let scorer = Arc::clone(&scorer);
            let candidates = Arc::clone(&candidates);
            s.spawn(move || select_index(scorer.as_ref(), "office", &candidates).unwrap());
        }
    });

    assert_eq!(scorer.calls(), 8 * 5);
}
