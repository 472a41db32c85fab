//! The persistence seam: where finished targets go.

use async_trait::async_trait;

use crate::error::PersistError;
use crate::types::{ElementId, Target};

/// Commits a successfully transformed target to the element's persisted state.
///
/// Called once per successful row. Implementations must be shareable across
/// the runner's worker tasks.
#[async_trait]
pub trait Persister: Send + Sync {
    /// Save `target` for `element`.
    async fn save(&self, element: &ElementId, target: &Target) -> Result<(), PersistError>;
}
