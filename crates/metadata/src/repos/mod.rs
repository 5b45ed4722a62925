//! Repository traits for metadata operations.

pub mod admin_token;
pub mod cache_entries;
pub mod static_nodes;
pub mod tags;
pub mod tokens;
pub mod upstreams;
pub mod users;

pub use admin_token::AdminTokenRepo;
pub use cache_entries::CacheEntryRepo;
pub use static_nodes::StaticNodeRepo;
pub use tags::TagRepo;
pub use tokens::TokenRepo;
pub use upstreams::UpstreamRepo;
pub use users::UserRepo;
