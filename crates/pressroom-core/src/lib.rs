//! `pressroom-core` — contracts shared between the publish scheduling engine
//! and the rest of the application.
//!
//! The engine is deliberately decoupled from the blog/social post models: it
//! only sees the [`publish::Publishable`] capability and a
//! [`publish::PublishResolver`] that turns a stored target reference into a
//! live publishable entity at execution time. Configuration lives here too so
//! the composition root can wire every subsystem from one `pressroom.toml`.

pub mod config;
pub mod error;
pub mod publish;

pub use config::{PressroomConfig, SchedulerConfig};
pub use error::{PressroomError, Result};
pub use publish::{PublishError, PublishResolver, PublishTarget, Publishable, TargetRefError};
