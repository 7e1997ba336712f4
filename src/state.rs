use crate::store::Store;
use crate::ws::ConnectionRegistry;

/// Shared application state passed to all handlers via axum's State
/// extractor.
#[derive(Clone)]
pub struct AppState {
    /// Authoritative collections + snapshot persistence.
    pub store: Store,
    /// Live WebSocket connections: principal and group indexes.
    pub registry: ConnectionRegistry,
    /// JWT signing secret (256-bit random key).
    pub jwt_secret: Vec<u8>,
}
