//! Movement requests and the immutable records they produce.

use core::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use stockledger_core::{AddressName, ArticleId, DomainError, Quantity};

/// Whether units enter or leave the targeted counter.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::In => "IN",
            Direction::Out => "OUT",
        }
    }
}

impl FromStr for Direction {
    type Err = DomainError;

    /// Accepts the English labels and the French ones used by the stock forms.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IN" | "ENTRY" | "ENTREE" => Ok(Direction::In),
            "OUT" | "EXIT" | "SORTIE" => Ok(Direction::Out),
            other => Err(DomainError::validation(format!("unknown direction '{other}'"))),
        }
    }
}

impl core::fmt::Display for Direction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a movement lands.
///
/// `Site` (CHANTIER) and `Depot` are bookkeeping labels only: they move the
/// stock counter exactly like `Stock`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Location {
    Stock,
    Warranty,
    Site,
    Depot,
}

impl Location {
    pub fn as_str(self) -> &'static str {
        match self {
            Location::Stock => "STOCK",
            Location::Warranty => "WARRANTY",
            Location::Site => "SITE",
            Location::Depot => "DEPOT",
        }
    }

    pub fn is_warranty(self) -> bool {
        matches!(self, Location::Warranty)
    }
}

impl FromStr for Location {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STOCK" => Ok(Location::Stock),
            "WARRANTY" | "GARANTIE" => Ok(Location::Warranty),
            "SITE" | "CHANTIER" => Ok(Location::Site),
            "DEPOT" => Ok(Location::Depot),
            other => Err(DomainError::validation(format!("unknown location '{other}'"))),
        }
    }
}

impl core::fmt::Display for Location {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated request to move units of one article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRequest {
    pub article_id: ArticleId,
    /// Display name to record with the movement; `None` records the article's current name.
    pub display_name: Option<String>,
    pub direction: Direction,
    pub location: Location,
    pub quantity: Quantity,
    pub address: Option<AddressName>,
    pub comment: Option<String>,
    pub date: NaiveDate,
}

impl MovementRequest {
    pub fn new(
        article_id: ArticleId,
        direction: Direction,
        location: Location,
        quantity: Quantity,
        date: NaiveDate,
    ) -> Self {
        Self {
            article_id,
            display_name: None,
            direction,
            location,
            quantity,
            address: None,
            comment: None,
            date,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = non_blank(name.into());
        self
    }

    pub fn with_address(mut self, address: AddressName) -> Self {
        self.address = Some(address);
        self
    }

    /// A blank comment is dropped; anything else is kept verbatim.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        let comment = comment.into();
        self.comment = (!comment.trim().is_empty()).then_some(comment);
        self
    }
}

/// Raw, unvalidated movement input as typed into a form.
///
/// Blank optional fields mean "absent".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementForm {
    pub article_id: String,
    pub display_name: String,
    pub direction: String,
    pub location: String,
    pub quantity: i64,
    pub address: String,
    pub comment: String,
    pub date: Option<NaiveDate>,
}

impl MovementForm {
    /// Validate the raw input without touching any persisted state.
    ///
    /// `today` is used when the form carries no date.
    pub fn validate(&self, today: NaiveDate) -> Result<MovementRequest, DomainError> {
        let article_id = ArticleId::parse(&self.article_id)?;
        let direction = self.direction.parse::<Direction>()?;
        let location = self.location.parse::<Location>()?;
        let quantity = Quantity::new(self.quantity)?;
        let address = match self.address.trim() {
            "" => None,
            name => Some(AddressName::parse(name)?),
        };

        let mut request = MovementRequest::new(
            article_id,
            direction,
            location,
            quantity,
            self.date.unwrap_or(today),
        )
        .with_display_name(self.display_name.clone())
        .with_comment(self.comment.clone());
        request.address = address;
        Ok(request)
    }
}

/// A movement accepted by the ledger but not yet assigned a log position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovement {
    pub date: NaiveDate,
    pub article_id: ArticleId,
    pub display_name: String,
    pub direction: Direction,
    pub location: Location,
    pub quantity: Quantity,
    pub address: Option<AddressName>,
    pub comment: Option<String>,
}

impl NewMovement {
    pub fn into_recorded(self, id: i64) -> Movement {
        Movement {
            id,
            date: self.date,
            article_id: self.article_id,
            display_name: self.display_name,
            direction: self.direction,
            location: self.location,
            quantity: self.quantity,
            address: self.address,
            comment: self.comment,
        }
    }
}

/// Immutable audit record of one balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    /// Monotonic position in the movement log (higher is more recent).
    pub id: i64,
    pub date: NaiveDate,
    pub article_id: ArticleId,
    pub display_name: String,
    pub direction: Direction,
    pub location: Location,
    pub quantity: Quantity,
    pub address: Option<AddressName>,
    pub comment: Option<String>,
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
