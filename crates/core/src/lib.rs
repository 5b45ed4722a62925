//! Core domain types and shared logic for subhub.
//!
//! This crate defines the data model and pure logic used by all other crates:
//! - Proxy node fingerprinting, extraction and deduplication
//! - Source scopes and their merge priorities
//! - Subscription encoding and ETags
//! - Token scopes and secret handling
//! - Configuration

pub mod config;
pub mod error;
pub mod node;
pub mod scope;
pub mod subscription;
pub mod token;

pub use error::{Error, Result};
pub use node::{NodeCandidate, NodeFingerprint, Protocol};
pub use scope::{SourceScope, SourceTarget};
pub use subscription::RenderedSubscription;
pub use token::{Token, TokenId, TokenScope};
