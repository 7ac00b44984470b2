//! `stockledger-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod error;
pub mod event;
pub mod id;
pub mod quantity;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot};
pub use error::{BalanceCounter, DomainError, DomainResult};
pub use event::Event;
pub use id::{AddressName, ArticleId};
pub use quantity::Quantity;
pub use value_object::ValueObject;
