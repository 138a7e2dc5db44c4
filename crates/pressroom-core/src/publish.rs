//! Publish capability types — shared between the scheduler engine and the
//! content models that implement actual publication.
//!
//! The scheduler never touches a blog or social post directly. It stores a
//! [`PublishTarget`] and, at execution time, asks a [`PublishResolver`] for a
//! live [`Publishable`] handle. Resolution failure (the referenced content was
//! deleted) is an ordinary execution failure, not an engine fault.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reference to the single content item a schedule publishes.
///
/// Persisted as two nullable foreign-key columns with exactly one populated;
/// in memory it is a tagged union so the "which kind is this" branch happens
/// once, at construction, instead of on every access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PublishTarget {
    Blog(String),
    Social(String),
}

/// Raised when the pair of optional foreign keys does not identify exactly
/// one content item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetRefError {
    #[error("either a blog post or a social post reference must be provided")]
    NeitherSet,

    #[error("cannot schedule both a blog post and a social post on the same item")]
    BothSet,
}

impl PublishTarget {
    /// Build a target from the two-column persisted form. Exactly one of the
    /// references must be set.
    pub fn from_refs(
        blog_post_id: Option<String>,
        social_post_id: Option<String>,
    ) -> Result<Self, TargetRefError> {
        match (blog_post_id, social_post_id) {
            (Some(id), None) => Ok(PublishTarget::Blog(id)),
            (None, Some(id)) => Ok(PublishTarget::Social(id)),
            (None, None) => Err(TargetRefError::NeitherSet),
            (Some(_), Some(_)) => Err(TargetRefError::BothSet),
        }
    }

    /// The two-column form for persistence: `(blog_post_id, social_post_id)`.
    pub fn as_refs(&self) -> (Option<&str>, Option<&str>) {
        match self {
            PublishTarget::Blog(id) => (Some(id), None),
            PublishTarget::Social(id) => (None, Some(id)),
        }
    }

    pub fn is_blog(&self) -> bool {
        matches!(self, PublishTarget::Blog(_))
    }

    pub fn is_social(&self) -> bool {
        matches!(self, PublishTarget::Social(_))
    }

    /// The referenced content item's ID, whichever kind it is.
    pub fn content_id(&self) -> &str {
        match self {
            PublishTarget::Blog(id) | PublishTarget::Social(id) => id,
        }
    }
}

impl std::fmt::Display for PublishTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishTarget::Blog(id) => write!(f, "blog_post:{id}"),
            PublishTarget::Social(id) => write!(f, "social_post:{id}"),
        }
    }
}

/// Error returned by a content model's `publish()`.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PublishError {
    pub message: String,
}

impl PublishError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Capability implemented by blog and social post entities.
///
/// `publish()` must tolerate being invoked on an already-published item
/// (either as a no-op or by returning an error); the scheduler does not
/// guarantee idempotent invocation across retries.
#[async_trait]
pub trait Publishable: Send + Sync {
    async fn publish(&self) -> Result<(), PublishError>;
}

/// Resolves a stored target reference into a live publishable entity.
///
/// Returns `None` when the referenced content no longer exists.
#[async_trait]
pub trait PublishResolver: Send + Sync {
    async fn resolve(&self, target: &PublishTarget) -> Option<Box<dyn Publishable>>;
}
