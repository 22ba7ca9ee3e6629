//! Derived rating aggregate maintenance.
//!
//! The parent collection carries `ratingsAverage`/`ratingsQuantity`,
//! denormalized from the child collection. Every recompute re-reads the
//! full current child set and overwrites the stat in one parent update, so
//! concurrent recomputes converge to the correct values regardless of
//! trigger ordering. That idempotent convergence, not locking, is the
//! correctness mechanism. Intermediate states may be transiently stale;
//! read-your-writes is not guaranteed for the stat.

use crate::engine::Engine;
use crate::errors::DbError;
use crate::query::exec::{bson_equal, get_path};
use crate::types::DocumentId;
use bson::{Bson, doc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Average written when the last child disappears. Never zero: a parent
/// with no reviews must not read as having the worst possible rating.
pub const DEFAULT_NEUTRAL_AVERAGE: f64 = 3.0;

/// Post-commit notification that a child write touched `parent_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatEvent {
    pub parent_id: String,
}

/// Convenience constructor for the post-commit event channel.
#[must_use]
pub fn stat_channel() -> (mpsc::UnboundedSender<StatEvent>, mpsc::UnboundedReceiver<StatEvent>) {
    mpsc::unbounded_channel()
}

#[derive(Debug, Clone)]
pub struct AggregateConfig {
    pub parent_collection: String,
    pub child_collection: String,
    /// Child field referencing the parent id.
    pub parent_field: String,
    pub rating_field: String,
    pub neutral_average: f64,
}

impl AggregateConfig {
    /// The tour/review wiring used throughout this system.
    #[must_use]
    pub fn tours_reviews() -> Self {
        Self {
            parent_collection: "tours".to_string(),
            child_collection: "reviews".to_string(),
            parent_field: "tour".to_string(),
            rating_field: "rating".to_string(),
            neutral_average: DEFAULT_NEUTRAL_AVERAGE,
        }
    }
}

pub struct AggregateMaintainer {
    engine: Arc<Engine>,
    config: AggregateConfig,
}

impl AggregateMaintainer {
    #[must_use]
    pub fn new(engine: Arc<Engine>, config: AggregateConfig) -> Self {
        Self { engine, config }
    }

    /// Recomputes the parent's stat from the full current child set and
    /// writes it in a single parent update. Zero children resets to
    /// `(0, neutral_average)`.
    ///
    /// # Errors
    /// `NoSuchCollection` or `NotFound` when the parent is missing; callers
    /// on the event path log and swallow these.
    pub fn recompute(&self, parent_id: &str) -> Result<(), DbError> {
        let children = self.engine.collection(&self.config.child_collection)?;
        let parent_ref = Bson::String(parent_id.to_string());

        let mut count = 0u64;
        let mut ratings: Vec<f64> = Vec::new();
        for child in children.scan() {
            let matches = get_path(&child.data, &self.config.parent_field)
                .is_some_and(|v| bson_equal(v, &parent_ref));
            if !matches {
                continue;
            }
            count += 1;
            if let Some(r) = get_path(&child.data, &self.config.rating_field).and_then(as_f64) {
                ratings.push(r);
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let average = if ratings.is_empty() {
            self.config.neutral_average
        } else {
            ratings.iter().sum::<f64>() / ratings.len() as f64
        };

        let parents = self.engine.collection(&self.config.parent_collection)?;
        let patch = doc! {
            "ratingsQuantity": i64::try_from(count).unwrap_or(i64::MAX),
            "ratingsAverage": average,
        };
        parents.update_document(&DocumentId::from(parent_id), patch)?;
        log::info!(
            "recomputed ratings for {}/{parent_id}: quantity={count} average={average}",
            self.config.parent_collection
        );
        Ok(())
    }

    /// Consumes stat events until the channel closes. Recompute failures are
    /// logged and never fail the triggering write; the recompute is
    /// decoupled from write-path latency.
    pub fn spawn(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<StatEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let Err(e) = self.recompute(&event.parent_id) {
                    log::error!("ratings recompute failed for {}: {e}", event.parent_id);
                }
            }
        })
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(b: &Bson) -> Option<f64> {
    match b {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}
