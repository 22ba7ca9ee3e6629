use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Collection not found: {0}")]
    NoSuchCollection(String),

    #[error("No {collection} document found with id {id}")]
    NotFound { collection: String, id: String },

    #[error("Validation failed: {}", fields.join(", "))]
    Validation { fields: Vec<String> },

    #[error("Duplicate value for unique index {index} on {collection}")]
    Conflict { collection: String, index: String },

    #[error("Webhook signature rejected: {0}")]
    RejectedSignature(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl DbError {
    /// True for errors a boundary layer maps to a 4xx response.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Validation { .. }
                | Self::Conflict { .. }
                | Self::RejectedSignature(_)
                | Self::Unauthorized
                | Self::Forbidden(_)
        )
    }
}
