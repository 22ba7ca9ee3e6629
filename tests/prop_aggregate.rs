use bson::doc;
use proptest::prelude::*;
use voyagelite::Database;
use voyagelite::aggregate::{AggregateConfig, AggregateMaintainer, DEFAULT_NEUTRAL_AVERAGE};

proptest! {
    #[test]
    fn prop_recompute_converges_to_count_and_mean(ratings in proptest::collection::vec(1i64..=5, 0..40)) {
        let db = Database::new();
        let tours = db.create_collection("tours");
        db.create_collection("reviews");
        let tour = tours.insert_document(doc!{"name": "t"}).unwrap();
        let tour_id = tour.id.to_string();
        let reviews = db.handler("reviews");
        let maintainer = AggregateMaintainer::new(db.engine(), AggregateConfig::tours_reviews());

        for (i, r) in ratings.iter().enumerate() {
            reviews.create(doc!{"tour": tour_id.clone(), "user": format!("u{i}"), "rating": *r}).unwrap();
            // Redundant triggers along the way must not disturb the end state.
            if i % 2 == 0 {
                maintainer.recompute(&tour_id).unwrap();
            }
        }
        maintainer.recompute(&tour_id).unwrap();

        let parent = db.handler("tours").get(tour_id.as_str()).unwrap();
        let quantity = parent.get_i64("ratingsQuantity").unwrap();
        let average = parent.get_f64("ratingsAverage").unwrap();
        prop_assert_eq!(quantity, ratings.len() as i64);
        #[allow(clippy::cast_precision_loss)]
        let expected = if ratings.is_empty() {
            DEFAULT_NEUTRAL_AVERAGE
        } else {
            ratings.iter().sum::<i64>() as f64 / ratings.len() as f64
        };
        prop_assert!((average - expected).abs() < 1e-9);
    }

    #[test]
    fn prop_deleting_any_subset_leaves_the_stat_consistent(
        ratings in proptest::collection::vec(1i64..=5, 1..20),
        drop_mask in proptest::collection::vec(any::<bool>(), 1..20),
    ) {
        let db = Database::new();
        let tours = db.create_collection("tours");
        db.create_collection("reviews");
        let tour = tours.insert_document(doc!{"name": "t"}).unwrap();
        let tour_id = tour.id.to_string();
        let reviews = db.handler("reviews");
        let maintainer = AggregateMaintainer::new(db.engine(), AggregateConfig::tours_reviews());

        let mut ids = Vec::new();
        for (i, r) in ratings.iter().enumerate() {
            let created = reviews.create(doc!{"tour": tour_id.clone(), "user": format!("u{i}"), "rating": *r}).unwrap();
            ids.push(created.get_str("_id").unwrap().to_string());
        }
        let mut kept: Vec<i64> = Vec::new();
        for (i, id) in ids.iter().enumerate() {
            if drop_mask.get(i).copied().unwrap_or(false) {
                reviews.delete(id).unwrap();
                maintainer.recompute(&tour_id).unwrap();
            } else {
                kept.push(ratings[i]);
            }
        }
        maintainer.recompute(&tour_id).unwrap();

        let parent = db.handler("tours").get(tour_id.as_str()).unwrap();
        let quantity = parent.get_i64("ratingsQuantity").unwrap();
        let average = parent.get_f64("ratingsAverage").unwrap();
        prop_assert_eq!(quantity, kept.len() as i64);
        #[allow(clippy::cast_precision_loss)]
        let expected = if kept.is_empty() {
            DEFAULT_NEUTRAL_AVERAGE
        } else {
            kept.iter().sum::<i64>() as f64 / kept.len() as f64
        };
        prop_assert!((average - expected).abs() < 1e-9);
    }
}
