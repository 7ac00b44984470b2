//! The two-counter balance carried by every article.

use serde::{Deserialize, Serialize};

use stockledger_core::{BalanceCounter, DomainError, DomainResult, Quantity, ValueObject};

use crate::movement::{Direction, Location};

/// Current (stock, warranty) pair of an article. Both counters are never negative.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Balance {
    pub stock: i64,
    pub warranty: i64,
}

impl ValueObject for Balance {}

impl Balance {
    pub const ZERO: Balance = Balance { stock: 0, warranty: 0 };

    pub fn new(stock: i64, warranty: i64) -> DomainResult<Self> {
        if stock < 0 || warranty < 0 {
            return Err(DomainError::validation(format!(
                "balances cannot be negative (stock {stock}, warranty {warranty})"
            )));
        }
        Ok(Self { stock, warranty })
    }

    /// Balance after moving `quantity` units, or the reason it is refused.
    ///
    /// | location | IN                     | OUT            |
    /// |----------|------------------------|----------------|
    /// | stock-like | stock + q            | stock - q      |
    /// | warranty | warranty + q, stock - q | warranty - q  |
    ///
    /// Warranty entries are transfers out of active stock; warranty exits leave
    /// the ledger entirely.
    pub fn apply(
        self,
        article: &str,
        direction: Direction,
        location: Location,
        quantity: Quantity,
    ) -> DomainResult<Balance> {
        let q = quantity.get();
        let overflow = || DomainError::validation("quantity overflows the balance counter");

        let next = match (location.is_warranty(), direction) {
            (false, Direction::In) => Balance {
                stock: self.stock.checked_add(q).ok_or_else(overflow)?,
                ..self
            },
            (false, Direction::Out) => Balance {
                stock: self.stock - q,
                ..self
            },
            (true, Direction::In) => Balance {
                stock: self.stock - q,
                warranty: self.warranty.checked_add(q).ok_or_else(overflow)?,
            },
            (true, Direction::Out) => Balance {
                warranty: self.warranty - q,
                ..self
            },
        };

        if next.stock < 0 {
            return Err(DomainError::insufficient(article, BalanceCounter::Stock, self.stock, q));
        }
        if next.warranty < 0 {
            return Err(DomainError::insufficient(
                article,
                BalanceCounter::Warranty,
                self.warranty,
                q,
            ));
        }
        Ok(next)
    }
}
