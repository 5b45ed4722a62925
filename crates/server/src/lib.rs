//! HTTP service for subhub.
//!
//! This crate provides the public subscription endpoint and the admin
//! control plane:
//! - Token-addressed subscription delivery with caching and ETags
//! - Subscription resolution across global, tag and user sources
//! - Admin endpoints for users, tags, upstreams and static nodes
//! - Cache invalidation on every write that changes a user's view

pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod invalidation;
pub mod metrics;
pub mod resolver;
pub mod routes;
pub mod state;

pub use auth::TraceId;
pub use error::ApiError;
pub use invalidation::CacheInvalidator;
pub use resolver::{PreviewReport, ResolveError, SubscriptionResolver};
pub use routes::create_router;
pub use state::AppState;
