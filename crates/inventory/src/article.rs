use serde::{Deserialize, Serialize};

use stockledger_core::{Aggregate, AggregateRoot, ArticleId, DomainError, Event};

use crate::balance::Balance;
use crate::movement::{MovementRequest, NewMovement};

/// Aggregate root: Article.
///
/// Owns the live (stock, warranty) counters. Storage adapters rehydrate it with
/// [`Article::restore`], ask it to `handle` a command and persist the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    id: ArticleId,
    display_name: String,
    balance: Balance,
    reorder_threshold: Option<i64>,
    registered: bool,
}

impl Article {
    /// Create an empty, not-yet-registered aggregate instance.
    pub fn empty(id: ArticleId) -> Self {
        Self {
            id,
            display_name: String::new(),
            balance: Balance::ZERO,
            reorder_threshold: None,
            registered: false,
        }
    }

    /// Rehydrate a registered article from persisted state.
    pub fn restore(
        id: ArticleId,
        display_name: impl Into<String>,
        balance: Balance,
        reorder_threshold: Option<i64>,
    ) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            balance,
            reorder_threshold,
            registered: true,
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn balance(&self) -> Balance {
        self.balance
    }

    pub fn stock(&self) -> i64 {
        self.balance.stock
    }

    pub fn warranty(&self) -> i64 {
        self.balance.warranty
    }

    /// Per-article reorder threshold; `None` means the global threshold applies.
    pub fn reorder_threshold(&self) -> Option<i64> {
        self.reorder_threshold
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Same article under a new identifier (counters and settings carried over).
    pub fn renamed(&self, id: ArticleId) -> Self {
        Self {
            id,
            ..self.clone()
        }
    }
}

impl AggregateRoot for Article {
    type Id = ArticleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Command: register the article, or refresh its name/threshold if it exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnsureArticle {
    pub article_id: ArticleId,
    /// A blank name keeps the current one.
    pub display_name: String,
    pub reorder_threshold: Option<i64>,
}

/// Command: edit an article that must already exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateArticle {
    pub article_id: ArticleId,
    pub display_name: String,
    pub reorder_threshold: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArticleCommand {
    Ensure(EnsureArticle),
    Update(UpdateArticle),
    RecordMovement(MovementRequest),
}

/// Event: ArticleRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRegistered {
    pub article_id: ArticleId,
    pub display_name: String,
    pub reorder_threshold: Option<i64>,
}

/// Event: ArticleUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleUpdated {
    pub article_id: ArticleId,
    pub display_name: String,
    pub reorder_threshold: Option<i64>,
}

/// Event: MovementRecorded. Carries the balance that results from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecorded {
    pub movement: NewMovement,
    pub balance: Balance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArticleEvent {
    ArticleRegistered(ArticleRegistered),
    ArticleUpdated(ArticleUpdated),
    MovementRecorded(MovementRecorded),
}

impl Event for ArticleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ArticleEvent::ArticleRegistered(_) => "ledger.article.registered",
            ArticleEvent::ArticleUpdated(_) => "ledger.article.updated",
            ArticleEvent::MovementRecorded(_) => "ledger.movement.recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }
}

impl Aggregate for Article {
    type Command = ArticleCommand;
    type Event = ArticleEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ArticleEvent::ArticleRegistered(e) => {
                self.id = e.article_id.clone();
                self.display_name = e.display_name.clone();
                self.reorder_threshold = e.reorder_threshold;
                self.balance = Balance::ZERO;
                self.registered = true;
            }
            ArticleEvent::ArticleUpdated(e) => {
                self.display_name = e.display_name.clone();
                self.reorder_threshold = e.reorder_threshold;
            }
            ArticleEvent::MovementRecorded(e) => {
                self.balance = e.balance;
            }
        }
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ArticleCommand::Ensure(cmd) => self.handle_ensure(cmd),
            ArticleCommand::Update(cmd) => self.handle_update(cmd),
            ArticleCommand::RecordMovement(req) => self.handle_movement(req),
        }
    }
}

impl Article {
    fn ensure_article_id(&self, article_id: &ArticleId) -> Result<(), DomainError> {
        if &self.id != article_id {
            return Err(DomainError::validation(format!(
                "command targets article {article_id}, loaded {}",
                self.id
            )));
        }
        Ok(())
    }

    fn handle_ensure(&self, cmd: &EnsureArticle) -> Result<Vec<ArticleEvent>, DomainError> {
        self.ensure_article_id(&cmd.article_id)?;
        validate_threshold(cmd.reorder_threshold)?;

        if !self.registered {
            return Ok(vec![ArticleEvent::ArticleRegistered(ArticleRegistered {
                article_id: cmd.article_id.clone(),
                display_name: cmd.display_name.trim().to_string(),
                reorder_threshold: cmd.reorder_threshold,
            })]);
        }

        Ok(self.changes(&cmd.display_name, cmd.reorder_threshold))
    }

    fn handle_update(&self, cmd: &UpdateArticle) -> Result<Vec<ArticleEvent>, DomainError> {
        if !self.registered {
            return Err(DomainError::not_found(format!("article {}", cmd.article_id)));
        }
        self.ensure_article_id(&cmd.article_id)?;
        validate_threshold(cmd.reorder_threshold)?;

        Ok(self.changes(&cmd.display_name, cmd.reorder_threshold))
    }

    fn changes(&self, display_name: &str, reorder_threshold: Option<i64>) -> Vec<ArticleEvent> {
        let display_name = match display_name.trim() {
            "" => self.display_name.clone(),
            name => name.to_string(),
        };

        if display_name == self.display_name && reorder_threshold == self.reorder_threshold {
            return vec![];
        }

        vec![ArticleEvent::ArticleUpdated(ArticleUpdated {
            article_id: self.id.clone(),
            display_name,
            reorder_threshold,
        })]
    }

    fn handle_movement(&self, req: &MovementRequest) -> Result<Vec<ArticleEvent>, DomainError> {
        if !self.registered {
            return Err(DomainError::not_found(format!("article {}", req.article_id)));
        }
        self.ensure_article_id(&req.article_id)?;

        let balance = self.balance.apply(
            self.id.as_str(),
            req.direction,
            req.location,
            req.quantity,
        )?;

        let display_name = req
            .display_name
            .clone()
            .unwrap_or_else(|| self.display_name.clone());

        Ok(vec![ArticleEvent::MovementRecorded(MovementRecorded {
            movement: NewMovement {
                date: req.date,
                article_id: req.article_id.clone(),
                display_name,
                direction: req.direction,
                location: req.location,
                quantity: req.quantity,
                address: req.address.clone(),
                comment: req.comment.clone(),
            },
            balance,
        })])
    }
}

fn validate_threshold(threshold: Option<i64>) -> Result<(), DomainError> {
    match threshold {
        Some(t) if t < 0 => Err(DomainError::validation(format!(
            "reorder threshold cannot be negative (got {t})"
        ))),
        _ => Ok(()),
    }
}
