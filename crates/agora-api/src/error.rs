use axum::http::StatusCode;
use tracing::{debug, error, warn};

use agora_gateway::GatewayError;

/// HTTP status for a gateway failure. Logged here so handlers can just `map_err`.
pub fn status_for(err: GatewayError) -> StatusCode {
    match err {
        GatewayError::Auth => StatusCode::UNAUTHORIZED,
        GatewayError::Authorization(reason) => {
            warn!("Forbidden: {}", reason);
            StatusCode::FORBIDDEN
        }
        GatewayError::Validation(reason) => {
            debug!("Rejected request: {}", reason);
            StatusCode::BAD_REQUEST
        }
        GatewayError::Persistence(e) => {
            error!("Persistence failure: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
