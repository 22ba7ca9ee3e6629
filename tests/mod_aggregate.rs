use bson::doc;
use std::sync::Arc;
use voyagelite::Database;
use voyagelite::aggregate::{AggregateConfig, AggregateMaintainer, DEFAULT_NEUTRAL_AVERAGE};
use voyagelite::errors::DbError;

fn tour_db() -> (Database, String) {
    let db = Database::new();
    let tours = db.create_collection("tours");
    db.create_collection("reviews");
    let tour = tours
        .insert_document(doc! {"name": "Forest Hiker", "ratingsAverage": DEFAULT_NEUTRAL_AVERAGE, "ratingsQuantity": 0_i64})
        .unwrap();
    (db, tour.id.to_string())
}

fn stats(db: &Database, tour_id: &str) -> (i64, f64) {
    let tour = db.handler("tours").get(tour_id).unwrap();
    (tour.get_i64("ratingsQuantity").unwrap(), tour.get_f64("ratingsAverage").unwrap())
}

#[test]
fn recompute_reflects_the_full_child_set() {
    let (db, tour_id) = tour_db();
    let reviews = db.handler("reviews");
    let maintainer = AggregateMaintainer::new(db.engine(), AggregateConfig::tours_reviews());

    for rating in [5, 3, 4] {
        reviews.create(doc! {"tour": tour_id.clone(), "user": format!("u{rating}"), "rating": rating}).unwrap();
        maintainer.recompute(&tour_id).unwrap();
    }
    let (quantity, average) = stats(&db, &tour_id);
    assert_eq!(quantity, 3);
    assert!((average - 4.0).abs() < 1e-9);
}

#[test]
fn recompute_is_idempotent_regardless_of_trigger_ordering() {
    let (db, tour_id) = tour_db();
    let reviews = db.handler("reviews");
    let maintainer = AggregateMaintainer::new(db.engine(), AggregateConfig::tours_reviews());

    for rating in [1, 2, 5] {
        reviews.create(doc! {"tour": tour_id.clone(), "user": format!("u{rating}"), "rating": rating}).unwrap();
    }
    // Stale, duplicated and late triggers all converge to the same state
    // because every recompute re-reads the complete child set.
    for _ in 0..5 {
        maintainer.recompute(&tour_id).unwrap();
    }
    let (quantity, average) = stats(&db, &tour_id);
    assert_eq!(quantity, 3);
    assert!((average - (8.0 / 3.0)).abs() < 1e-9);
}

#[test]
fn deleting_the_last_child_resets_to_the_neutral_default() {
    let (db, tour_id) = tour_db();
    let reviews = db.handler("reviews");
    let maintainer = AggregateMaintainer::new(db.engine(), AggregateConfig::tours_reviews());

    let created = reviews.create(doc! {"tour": tour_id.clone(), "user": "u1", "rating": 1}).unwrap();
    maintainer.recompute(&tour_id).unwrap();
    assert_eq!(stats(&db, &tour_id), (1, 1.0));

    reviews.delete(created.get_str("_id").unwrap()).unwrap();
    maintainer.recompute(&tour_id).unwrap();
    let (quantity, average) = stats(&db, &tour_id);
    assert_eq!(quantity, 0);
    // Never (0, 0): zero reviews must not read as the worst rating.
    assert!((average - DEFAULT_NEUTRAL_AVERAGE).abs() < 1e-9);
}

#[test]
fn recompute_for_a_missing_parent_is_an_error() {
    let (db, _) = tour_db();
    let maintainer = AggregateMaintainer::new(db.engine(), AggregateConfig::tours_reviews());
    assert!(matches!(maintainer.recompute("ghost"), Err(DbError::NotFound { .. })));
}

#[tokio::test]
async fn channel_driven_maintainer_converges_after_all_writes_settle() {
    let (db, tour_id) = tour_db();
    let (tx, handle) = db.spawn_ratings_maintainer(AggregateConfig::tours_reviews());
    let reviews = db.handler("reviews").notify_stats(tx.clone(), "tour");

    let ratings = [5, 4, 4, 2, 3, 5, 1, 4];
    for (i, rating) in ratings.iter().enumerate() {
        reviews
            .create(doc! {"tour": tour_id.clone(), "user": format!("u{i}"), "rating": *rating})
            .unwrap();
    }
    // Closing the channel lets the maintainer drain every pending event.
    drop(tx);
    drop(reviews);
    handle.await.unwrap();

    let (quantity, average) = stats(&db, &tour_id);
    let expected = f64::from(ratings.iter().sum::<i32>()) / ratings.len() as f64;
    assert_eq!(quantity, ratings.len() as i64);
    assert!((average - expected).abs() < 1e-9);
}

#[tokio::test]
async fn maintainer_failure_does_not_fail_the_triggering_write() {
    let db = Database::new();
    db.create_collection("tours");
    db.create_collection("reviews");
    let (tx, handle) = db.spawn_ratings_maintainer(AggregateConfig::tours_reviews());
    let reviews = db.handler("reviews").notify_stats(tx.clone(), "tour");

    // The referenced parent does not exist: the recompute will fail and be
    // logged, but the child write itself succeeds.
    let created = reviews.create(doc! {"tour": "ghost", "user": "u1", "rating": 5_i64}).unwrap();
    drop(tx);
    drop(reviews);
    handle.await.unwrap();

    let fetched = db.handler("reviews").get(created.get_str("_id").unwrap()).unwrap();
    assert_eq!(fetched.get_i64("rating").unwrap(), 5);
}

#[tokio::test]
async fn update_and_delete_also_trigger_recomputes() {
    let (db, tour_id) = tour_db();
    let (tx, handle) = db.spawn_ratings_maintainer(AggregateConfig::tours_reviews());
    let reviews = db
        .handler("reviews")
        .allow_update_fields(&["review", "rating"])
        .notify_stats(tx.clone(), "tour");

    let first = reviews.create(doc! {"tour": tour_id.clone(), "user": "u1", "rating": 2}).unwrap();
    reviews.create(doc! {"tour": tour_id.clone(), "user": "u2", "rating": 4}).unwrap();
    reviews.update(first.get_str("_id").unwrap(), doc! {"rating": 5}).unwrap();
    reviews.delete(first.get_str("_id").unwrap()).unwrap();
    drop(tx);
    drop(reviews);
    handle.await.unwrap();

    let (quantity, average) = stats(&db, &tour_id);
    assert_eq!(quantity, 1);
    assert!((average - 4.0).abs() < 1e-9);
}

// Convergence under interleaved triggers: maintainers racing on the same
// parent end in the same state as a single serial recompute.
#[test]
fn interleaved_recomputes_from_two_maintainers_converge() {
    let (db, tour_id) = tour_db();
    let reviews = db.handler("reviews");
    let a = Arc::new(AggregateMaintainer::new(db.engine(), AggregateConfig::tours_reviews()));
    let b = Arc::new(AggregateMaintainer::new(db.engine(), AggregateConfig::tours_reviews()));

    for (i, rating) in [5, 1, 3, 3].iter().enumerate() {
        reviews
            .create(doc! {"tour": tour_id.clone(), "user": format!("u{i}"), "rating": *rating})
            .unwrap();
        a.recompute(&tour_id).unwrap();
        b.recompute(&tour_id).unwrap();
    }
    let (quantity, average) = stats(&db, &tour_id);
    assert_eq!(quantity, 4);
    assert!((average - 3.0).abs() < 1e-9);
}
