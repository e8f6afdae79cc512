//! `rxledger-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod actor;
pub mod error;
pub mod id;
pub mod money;

pub use actor::{ActorContext, ActorRole};
pub use error::{DomainError, DomainResult};
pub use id::{ActorId, BatchId, BillId, MovementId, PartyId, PaymentId, ProductId};
pub use money::{Paise, Percent, round_to_rupee};
