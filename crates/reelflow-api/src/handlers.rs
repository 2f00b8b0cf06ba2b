//! Request handlers.

pub mod health;
pub mod internal;
pub mod jobs;
pub mod resources;
pub mod webhooks;

pub use health::*;
pub use internal::*;
pub use jobs::*;
pub use resources::*;
pub use webhooks::*;
