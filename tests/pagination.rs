//! Property tests for cursor pagination over arbitrary score sets.

use feedline::{Database, Item, TimelineBackend, PAGE_SIZE};
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn scored(score: i64) -> Item {
    let published = chrono::DateTime::from_timestamp(score, 0)
        .unwrap()
        .to_rfc3339();
    Item::new(format!("s{score}")).published(published)
}

/// Page forward from the start, returning the ids seen and the page count.
async fn walk_forward(home: &impl TimelineBackend) -> (Vec<String>, usize) {
    let mut seen = Vec::new();
    let mut pages = 0;
    let mut after = String::new();
    loop {
        let page = home.items("", &after).await.unwrap();
        pages += 1;
        assert!(page.items.len() <= PAGE_SIZE as usize);
        seen.extend(page.items.into_iter().map(|i| i.id));
        if page.paging.is_exhausted() {
            break;
        }
        after = page.paging.after;
    }
    (seen, pages)
}

fn score_of(id: &str) -> i64 {
    id.trim_start_matches('s').parse().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn forward_paging_visits_every_score_once_in_order(
        scores in prop::collection::btree_set(0i64..2_000_000_000, 0..70)
    ) {
        let (seen, pages) = runtime().block_on(async {
            let db = Database::open(":memory:").await.unwrap();
            let home = db.timeline("home").await.unwrap();
            // Insert newest first so insertion order differs from score order
            for score in scores.iter().rev() {
                home.add_item(scored(*score)).await.unwrap();
            }
            walk_forward(&home).await
        });

        let seen: Vec<i64> = seen.iter().map(|id| score_of(id)).collect();
        let expected: Vec<i64> = scores.iter().copied().collect();
        prop_assert_eq!(seen, expected);
        prop_assert!(pages <= scores.len() / PAGE_SIZE as usize + 2);
    }

    #[test]
    fn forward_paging_visits_equal_scores_in_insertion_order(
        scores in prop::collection::vec(0i64..4, 0..70)
    ) {
        let (seen, _) = runtime().block_on(async {
            let db = Database::open(":memory:").await.unwrap();
            let home = db.timeline("home").await.unwrap();
            for (n, score) in scores.iter().enumerate() {
                let published = chrono::DateTime::from_timestamp(*score, 0)
                    .unwrap()
                    .to_rfc3339();
                home.add_item(Item::new(format!("n{n}")).published(published))
                    .await
                    .unwrap();
            }
            walk_forward(&home).await
        });

        // Stable sort: equal scores keep insertion order
        let mut expected: Vec<(i64, usize)> = scores.iter().copied().zip(0..).collect();
        expected.sort_by_key(|(score, _)| *score);
        let expected: Vec<String> = expected.into_iter().map(|(_, n)| format!("n{n}")).collect();
        prop_assert_eq!(seen, expected);
    }

    #[test]
    fn bounded_listing_stays_inside_open_interval(
        scores in prop::collection::btree_set(0i64..1_000, 2..40),
        lo in 0i64..1_000,
        width in 1i64..1_000,
    ) {
        let hi = lo + width;
        let items = runtime().block_on(async {
            let db = Database::open(":memory:").await.unwrap();
            let home = db.timeline("home").await.unwrap();
            for score in &scores {
                home.add_item(scored(*score)).await.unwrap();
            }
            home.items(&hi.to_string(), &lo.to_string()).await.unwrap().items
        });

        let got: Vec<i64> = items.iter().map(|i| score_of(&i.id)).collect();
        let expected: Vec<i64> = scores
            .range(lo + 1..hi)
            .copied()
            .take(PAGE_SIZE as usize)
            .collect();
        prop_assert_eq!(got, expected);
    }
}
