//! Explicit actor context.
//!
//! Every mutating operation takes an `ActorContext` instead of consulting any
//! ambient "current session" state. This keeps authorization checks local and
//! deterministic.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::ActorId;

/// Capability level of an acting user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    /// Day-to-day billing/stock operations.
    Operator,
    /// Additionally allowed to force-delete finalized bills and apply
    /// overrides to locked documents.
    Admin,
}

/// Identity + capability of the caller for a single operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    actor_id: ActorId,
    role: ActorRole,
}

impl ActorContext {
    pub fn new(actor_id: ActorId, role: ActorRole) -> Self {
        Self { actor_id, role }
    }

    pub fn actor_id(&self) -> ActorId {
        self.actor_id
    }

    pub fn role(&self) -> ActorRole {
        self.role
    }

    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }

    /// Gate for admin-only paths (force-delete, bill overrides).
    pub fn require_admin(&self) -> DomainResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(DomainError::Unauthorized)
        }
    }
}
