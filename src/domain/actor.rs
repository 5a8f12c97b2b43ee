//! Actor identity and per-category state keys.

use crate::domain::tier::Category;
use std::fmt;
use std::sync::Arc;

/// Identifier of the caller whose usage is tracked.
///
/// Supplied by the transport layer and trusted as-is. Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(Arc<str>);

impl ActorId {
    /// Create an actor id.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ActorId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

/// Key of one (actor, category) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActorKey {
    /// The actor
    pub actor: ActorId,
    /// The category of the request
    pub category: Category,
}

impl ActorKey {
    /// Create a key.
    pub fn new(actor: ActorId, category: Category) -> Self {
        Self { actor, category }
    }

    /// Logical shared-store key of this pair's sliding window.
    pub fn window_key(&self) -> String {
        format!("window:{}:{}", self.category, self.actor)
    }
}

/// Logical shared-store key of an actor's violation counter.
pub fn violation_count_key(actor: &ActorId) -> String {
    format!("violations:{}", actor)
}

/// Logical shared-store key of an actor's last violation timestamp.
pub fn violation_time_key(actor: &ActorId) -> String {
    format!("violations-at:{}", actor)
}

/// Logical shared-store key of the latest violation against one category.
pub fn penalty_key(actor: &ActorId, category: Category) -> String {
    format!("penalty:{}:{}", category, actor)
}
