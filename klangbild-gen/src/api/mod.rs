//! HTTP API handlers for klangbild-gen
//!
//! REST endpoints for submitting and polling transactions, plus SSE.

pub mod health;
pub mod sse;
pub mod transactions;

pub use health::health_routes;
pub use sse::event_stream;
pub use transactions::transaction_routes;
