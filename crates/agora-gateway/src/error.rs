use uuid::Uuid;

/// Failures surfaced by the gateway core to whoever invoked it.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Missing, unknown or expired session.
    #[error("authentication required")]
    Auth,

    /// The actor may not perform this operation (e.g. not an accepted group member).
    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("invalid request: {0}")]
    Validation(String),

    /// The atomic persistence unit failed; nothing was committed or pushed.
    #[error("persistence failed: {0:#}")]
    Persistence(anyhow::Error),
}

impl From<anyhow::Error> for GatewayError {
    fn from(e: anyhow::Error) -> Self {
        Self::Persistence(e)
    }
}

/// A live push that could not be enqueued. Logged, never surfaced or retried.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("connection {conn_id} for user {user_id} is closed")]
    Closed { user_id: Uuid, conn_id: Uuid },
}
