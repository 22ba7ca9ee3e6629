use std::path::PathBuf;

/// Database-wide configuration.
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    /// Name used to scope log files.
    pub db_name: String,
    /// When set, logging is initialized under `{log_dir}/{db_name}_logs`.
    pub log_dir: Option<PathBuf>,
    /// Shared secret for webhook signature verification.
    pub webhook_secret: Option<String>,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self { db_name: "voyagelite".to_string(), log_dir: None, webhook_secret: None }
    }
}
