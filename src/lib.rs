pub mod aggregate;
pub mod collection;
pub mod config;
pub mod document;
pub mod engine;
pub mod errors;
pub mod handler;
pub mod hydrate;
pub mod logger;
pub mod query;
pub mod schema;
pub mod types;
pub mod webhook;

use crate::aggregate::{AggregateConfig, AggregateMaintainer, StatEvent};
use crate::collection::Collection;
use crate::config::DatabaseOptions;
use crate::engine::Engine;
use crate::errors::DbError;
use crate::handler::ResourceHandler;
use crate::hydrate::HydratorRegistry;
use crate::webhook::WebhookReconciler;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// The main database struct: the engine plus the startup-time relation
/// registry, from which per-resource handlers are produced.
pub struct Database {
    engine: Arc<Engine>,
    hydrator: Arc<HydratorRegistry>,
    options: DatabaseOptions,
}

impl Database {
    /// Creates a database with default options and no relations.
    #[must_use]
    pub fn new() -> Self {
        Self::with_relations(DatabaseOptions::default(), HydratorRegistry::new())
    }

    /// Creates a database with the given options and relation registry.
    /// The registry is immutable from here on.
    #[must_use]
    pub fn with_relations(options: DatabaseOptions, hydrator: HydratorRegistry) -> Self {
        if let Some(dir) = &options.log_dir {
            let _ = logger::init_for_db_in(dir, &options.db_name);
        }
        Self { engine: Arc::new(Engine::new()), hydrator: Arc::new(hydrator), options }
    }

    #[must_use]
    pub fn engine(&self) -> Arc<Engine> {
        self.engine.clone()
    }

    /// Creates a collection if missing and returns a handle to it.
    pub fn create_collection(&self, name: &str) -> Arc<Collection> {
        self.engine.create_collection(name)
    }

    #[must_use]
    pub fn get_collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.engine.get_collection(name)
    }

    pub fn delete_collection(&self, name: &str) -> bool {
        self.engine.delete_collection(name)
    }

    #[must_use]
    pub fn list_collection_names(&self) -> Vec<String> {
        self.engine.list_collection_names()
    }

    /// Produces the CRUD handler for a collection. Configure it further
    /// with `allow_update_fields` / `notify_stats`.
    #[must_use]
    pub fn handler(&self, collection: &str) -> ResourceHandler {
        ResourceHandler::new(self.engine.clone(), self.hydrator.clone(), collection)
    }

    /// Spawns the ratings maintainer task and returns the post-commit event
    /// sender (wire it into the child collection's handler) and the task
    /// handle.
    pub fn spawn_ratings_maintainer(
        &self,
        config: AggregateConfig,
    ) -> (UnboundedSender<StatEvent>, JoinHandle<()>) {
        let (tx, rx) = aggregate::stat_channel();
        let maintainer = Arc::new(AggregateMaintainer::new(self.engine.clone(), config));
        let handle = maintainer.spawn(rx);
        (tx, handle)
    }

    /// The webhook reconciler, when a shared secret is configured.
    ///
    /// # Errors
    /// Returns `Unauthorized` when no webhook secret is configured.
    pub fn reconciler(&self) -> Result<WebhookReconciler, DbError> {
        let secret = self.options.webhook_secret.as_deref().ok_or(DbError::Unauthorized)?;
        Ok(WebhookReconciler::new(self.engine.clone(), secret.as_bytes().to_vec()))
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

/// Initializes the logging system from `log4rs.yaml`. Call once before any
/// other operation when file-based logger config is preferred.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    logger::init()?;
    Ok(())
}
