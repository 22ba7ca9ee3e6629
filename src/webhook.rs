//! Payment-webhook reconciliation.
//!
//! State machine: received -> signature-verified -> event-matched ->
//! booking-created | duplicate-ignored. Failures before event-matched
//! create no state. Delivery is at-least-once, so the booking write is
//! keyed on the external event id through a unique index rather than
//! trusting the gateway to deduplicate.

use crate::engine::Engine;
use crate::errors::DbError;
use crate::types::DocumentId;
use bson::{Bson, doc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// The only event type that triggers a side effect.
pub const PAYMENT_COMPLETED: &str = "checkout.session.completed";

/// Terminal states of a successfully processed webhook. Everything here is
/// acknowledged to the gateway; rejection paths surface as errors instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    BookingCreated(DocumentId),
    /// A replay of an already-reconciled event; exactly one booking exists.
    DuplicateIgnored,
    /// Recognized envelope, uninteresting event type. Acknowledged so the
    /// gateway does not retry it.
    Ignored,
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: CheckoutSession,
}

#[derive(Debug, Deserialize)]
struct CheckoutSession {
    client_reference_id: Option<String>,
    customer_details: Option<CustomerDetails>,
    /// Settled amount in the currency's minor unit.
    amount_total: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct CustomerDetails {
    email: Option<String>,
}

pub struct WebhookReconciler {
    engine: Arc<Engine>,
    secret: Vec<u8>,
    users_collection: String,
    bookings_collection: String,
}

impl WebhookReconciler {
    #[must_use]
    pub fn new(engine: Arc<Engine>, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            engine,
            secret: secret.into(),
            users_collection: "users".to_string(),
            bookings_collection: "bookings".to_string(),
        }
    }

    #[must_use]
    pub fn with_collections(mut self, users: &str, bookings: &str) -> Self {
        self.users_collection = users.to_string();
        self.bookings_collection = bookings.to_string();
        self
    }

    /// Processes one raw webhook delivery.
    ///
    /// # Errors
    /// `RejectedSignature` before any side effect; `Json` for an unparsable
    /// verified payload; `Validation` when a matched event is missing
    /// required fields; `NotFound` when the payer email matches no user.
    pub fn handle(&self, payload: &[u8], signature_header: &str) -> Result<Outcome, DbError> {
        self.verify_signature(payload, signature_header)?;

        let envelope: EventEnvelope = serde_json::from_slice(payload)?;
        if envelope.kind != PAYMENT_COMPLETED {
            log::info!("ignoring webhook event {} of type {}", envelope.id, envelope.kind);
            return Ok(Outcome::Ignored);
        }

        let session = envelope.data.object;
        let mut missing = Vec::new();
        if session.client_reference_id.is_none() {
            missing.push("data.object.client_reference_id: required".to_string());
        }
        let email = session.customer_details.and_then(|c| c.email);
        if email.is_none() {
            missing.push("data.object.customer_details.email: required".to_string());
        }
        if session.amount_total.is_none() {
            missing.push("data.object.amount_total: required".to_string());
        }
        if !missing.is_empty() {
            return Err(DbError::Validation { fields: missing });
        }
        let tour_id = session.client_reference_id.unwrap_or_default();
        let email = email.unwrap_or_default();
        let amount_total = session.amount_total.unwrap_or_default();

        let users = self.engine.collection(&self.users_collection)?;
        let user = users
            .find_one_eq("email", &Bson::String(email.clone()))
            .ok_or_else(|| DbError::NotFound {
                collection: self.users_collection.clone(),
                id: email,
            })?;

        #[allow(clippy::cast_precision_loss)]
        let price = amount_total as f64 / 100.0;
        let booking = doc! {
            "tour": tour_id,
            "user": user.id.to_string(),
            "price": price,
            "event_id": envelope.id.clone(),
        };

        let bookings = self.engine.collection(&self.bookings_collection)?;
        match bookings.insert_document(booking) {
            Ok(created) => {
                log::info!("booking {} created for event {}", created.id, envelope.id);
                Ok(Outcome::BookingCreated(created.id))
            }
            Err(DbError::Conflict { .. }) => {
                log::info!("event {} already reconciled; ignoring replay", envelope.id);
                Ok(Outcome::DuplicateIgnored)
            }
            Err(e) => Err(e),
        }
    }

    // Header format: `t=<unix seconds>,v1=<hex hmac-sha256>` over
    // `"{t}.{payload}"`. Comparison is constant-time via `verify_slice`.
    fn verify_signature(&self, payload: &[u8], header: &str) -> Result<(), DbError> {
        let mut timestamp = None;
        let mut signature = None;
        for part in header.split(',') {
            match part.split_once('=') {
                Some(("t", v)) => timestamp = Some(v),
                Some(("v1", v)) => signature = Some(v),
                _ => {}
            }
        }
        let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
            return Err(DbError::RejectedSignature("malformed signature header".to_string()));
        };
        let sig_bytes = hex::decode(signature)
            .map_err(|_| DbError::RejectedSignature("signature is not hex".to_string()))?;

        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(&sig_bytes)
            .map_err(|_| DbError::RejectedSignature("signature mismatch".to_string()))
    }
}

/// Builds the signature header for a payload. The counterpart of
/// `verify_signature`, used by callers emitting test deliveries.
#[must_use]
pub fn sign_payload(secret: &[u8], timestamp: u64, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let sig = hex::encode(mac.finalize().into_bytes());
    format!("t={timestamp},v1={sig}")
}
