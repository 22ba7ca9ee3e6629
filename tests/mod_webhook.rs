use bson::doc;
use voyagelite::Database;
use voyagelite::collection::UniqueIndex;
use voyagelite::config::DatabaseOptions;
use voyagelite::errors::DbError;
use voyagelite::webhook::{Outcome, sign_payload};

const SECRET: &[u8] = b"whsec_test_key";

fn payment_db() -> Database {
    let options = DatabaseOptions {
        webhook_secret: Some(String::from_utf8_lossy(SECRET).into_owned()),
        ..DatabaseOptions::default()
    };
    let db = Database::with_relations(options, voyagelite::hydrate::HydratorRegistry::new());
    let users = db.create_collection("users");
    let bookings = db.create_collection("bookings");
    bookings.add_unique_index(UniqueIndex::new("event_id_unique", &["event_id"]));
    users
        .insert_document(doc! {"name": "alice", "email": "alice@example.com"})
        .unwrap();
    db
}

fn checkout_event(event_id: &str, tour_id: &str, email: &str, amount_total: i64) -> Vec<u8> {
    serde_json::json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "client_reference_id": tour_id,
                "customer_details": {"email": email},
                "amount_total": amount_total,
            }
        }
    })
    .to_string()
    .into_bytes()
}

#[test]
fn valid_delivery_creates_a_booking_in_major_units() {
    let db = payment_db();
    let reconciler = db.reconciler().unwrap();
    let payload = checkout_event("evt_1", "tour_9", "alice@example.com", 49_700);
    let header = sign_payload(SECRET, 1_724_400_000, &payload);

    let outcome = reconciler.handle(&payload, &header).unwrap();
    let Outcome::BookingCreated(id) = outcome else {
        panic!("expected a created booking, got {outcome:?}");
    };

    let booking = db.handler("bookings").get(id.as_str()).unwrap();
    assert_eq!(booking.get_str("tour").unwrap(), "tour_9");
    assert!((booking.get_f64("price").unwrap() - 497.0).abs() < 1e-9);
    assert_eq!(booking.get_str("event_id").unwrap(), "evt_1");
    // The user reference is the stored user's id, not the email.
    let user_id = booking.get_str("user").unwrap();
    assert!(db.handler("users").get(user_id).is_ok());
}

#[test]
fn replayed_event_is_ignored_and_leaves_one_booking() {
    let db = payment_db();
    let reconciler = db.reconciler().unwrap();
    let payload = checkout_event("evt_1", "tour_9", "alice@example.com", 49_700);
    let header = sign_payload(SECRET, 1_724_400_000, &payload);

    assert!(matches!(reconciler.handle(&payload, &header).unwrap(), Outcome::BookingCreated(_)));
    // At-least-once delivery: the gateway retries the same event id.
    assert_eq!(reconciler.handle(&payload, &header).unwrap(), Outcome::DuplicateIgnored);
    let resigned = sign_payload(SECRET, 1_724_400_060, &payload);
    assert_eq!(reconciler.handle(&payload, &resigned).unwrap(), Outcome::DuplicateIgnored);

    assert_eq!(db.handler("bookings").list(&[]).unwrap().count, 1);
}

#[test]
fn bad_signature_is_rejected_before_any_side_effect() {
    let db = payment_db();
    let reconciler = db.reconciler().unwrap();
    let payload = checkout_event("evt_1", "tour_9", "alice@example.com", 49_700);

    let wrong_key = sign_payload(b"whsec_other_key", 1_724_400_000, &payload);
    assert!(matches!(
        reconciler.handle(&payload, &wrong_key),
        Err(DbError::RejectedSignature(_))
    ));

    // Signature over different bytes than the delivered payload.
    let other = checkout_event("evt_2", "tour_9", "alice@example.com", 100);
    let mismatched = sign_payload(SECRET, 1_724_400_000, &other);
    assert!(matches!(
        reconciler.handle(&payload, &mismatched),
        Err(DbError::RejectedSignature(_))
    ));

    for header in ["", "t=123", "v1=ff", "t=123,v1=not-hex"] {
        assert!(matches!(
            reconciler.handle(&payload, header),
            Err(DbError::RejectedSignature(_))
        ));
    }
    assert_eq!(db.handler("bookings").list(&[]).unwrap().count, 0);
}

#[test]
fn unrelated_event_types_are_acknowledged_without_effect() {
    let db = payment_db();
    let reconciler = db.reconciler().unwrap();
    let payload = serde_json::json!({
        "id": "evt_3",
        "type": "payment_intent.created",
        "data": {"object": {}}
    })
    .to_string()
    .into_bytes();
    let header = sign_payload(SECRET, 1_724_400_000, &payload);

    assert_eq!(reconciler.handle(&payload, &header).unwrap(), Outcome::Ignored);
    assert_eq!(db.handler("bookings").list(&[]).unwrap().count, 0);
}

#[test]
fn missing_session_fields_fail_validation() {
    let db = payment_db();
    let reconciler = db.reconciler().unwrap();
    let payload = serde_json::json!({
        "id": "evt_4",
        "type": "checkout.session.completed",
        "data": {"object": {"client_reference_id": "tour_9"}}
    })
    .to_string()
    .into_bytes();
    let header = sign_payload(SECRET, 1_724_400_000, &payload);

    let err = reconciler.handle(&payload, &header).unwrap_err();
    assert!(matches!(err, DbError::Validation { ref fields } if fields.len() == 2));
    assert_eq!(db.handler("bookings").list(&[]).unwrap().count, 0);
}

#[test]
fn unknown_payer_email_is_not_found() {
    let db = payment_db();
    let reconciler = db.reconciler().unwrap();
    let payload = checkout_event("evt_5", "tour_9", "stranger@example.com", 100);
    let header = sign_payload(SECRET, 1_724_400_000, &payload);

    assert!(matches!(reconciler.handle(&payload, &header), Err(DbError::NotFound { .. })));
    assert_eq!(db.handler("bookings").list(&[]).unwrap().count, 0);
}

#[test]
fn reconciler_requires_a_configured_secret() {
    let db = Database::new();
    assert!(matches!(db.reconciler(), Err(DbError::Unauthorized)));
}
