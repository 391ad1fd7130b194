//! HTTP surface: server, handlers, and embeddable middleware.

mod handlers;
mod layer;
mod server;

pub use layer::{rate_limit, require_cron_auth, RateLimitLayerState};
pub use server::{AppState, HttpServer};
