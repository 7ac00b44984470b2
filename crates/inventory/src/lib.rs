//! Inventory ledger domain module.
//!
//! This crate contains the business rules for article balances, implemented
//! purely as deterministic domain logic (no IO, no SQL, no caching).

pub mod article;
pub mod balance;
pub mod movement;
pub mod reorder;
pub mod views;

pub use article::{
    Article, ArticleCommand, ArticleEvent, ArticleRegistered, ArticleUpdated, EnsureArticle,
    MovementRecorded, UpdateArticle,
};
pub use balance::Balance;
pub use movement::{Direction, Location, Movement, MovementForm, MovementRequest, NewMovement};
pub use reorder::{ReorderLine, compute_reorder_set, effective_threshold};
pub use views::{search_articles, warranty_table};
