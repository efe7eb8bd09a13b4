pub mod connection;
pub mod dedup;
pub mod error;
pub mod fanout;
pub mod registry;
pub mod session;

pub use error::{DeliveryError, GatewayError};
pub use fanout::Fanout;
pub use registry::{ConnectionHandle, Registry};
pub use session::SessionStore;
