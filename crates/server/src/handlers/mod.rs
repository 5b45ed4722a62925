//! HTTP request handlers.

pub mod common;
pub mod health;
pub mod maintenance;
pub mod sources;
pub mod subscription;
pub mod tags;
pub mod users;

pub use common::*;
pub use health::*;
pub use maintenance::*;
pub use sources::*;
pub use subscription::*;
pub use tags::*;
pub use users::*;
