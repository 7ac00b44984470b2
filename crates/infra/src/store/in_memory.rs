use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::debug;

use stockledger_core::{AddressName, Aggregate, ArticleId, DomainError, Event};
use stockledger_inventory::{
    Article, ArticleCommand, EnsureArticle, Movement, MovementRequest, UpdateArticle,
};

use super::r#trait::{LedgerStore, recorded_movement};
use crate::error::{LedgerError, LedgerResult};

#[derive(Debug, Default)]
struct LedgerState {
    articles: BTreeMap<ArticleId, Article>,
    /// Ascending by id.
    movements: Vec<Movement>,
    last_movement_id: i64,
    addresses: BTreeSet<AddressName>,
    settings: HashMap<String, String>,
}

/// In-memory ledger store for tests/dev.
///
/// A single write lock guards the whole state, so the read-validate-write
/// sequence of `apply_movement` is serialized for every article at once.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    inner: RwLock<LedgerState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, LedgerState>> {
        self.inner
            .read()
            .map_err(|_| LedgerError::storage("lock poisoned"))
    }

    fn write(&self) -> LedgerResult<RwLockWriteGuard<'_, LedgerState>> {
        self.inner
            .write()
            .map_err(|_| LedgerError::storage("lock poisoned"))
    }

    fn decide(
        state: &mut LedgerState,
        id: &ArticleId,
        command: ArticleCommand,
    ) -> LedgerResult<Article> {
        let mut article = state
            .articles
            .get(id)
            .cloned()
            .unwrap_or_else(|| Article::empty(id.clone()));

        let events = article.handle(&command)?;
        for e in &events {
            debug!(article_id = %id, event = e.event_type(), "applying event");
            article.apply(e);
        }
        if !events.is_empty() {
            state.articles.insert(id.clone(), article.clone());
        }
        Ok(article)
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn ensure_article(&self, cmd: EnsureArticle) -> LedgerResult<Article> {
        let mut state = self.write()?;
        let id = cmd.article_id.clone();
        Self::decide(&mut state, &id, ArticleCommand::Ensure(cmd))
    }

    async fn update_article(&self, cmd: UpdateArticle) -> LedgerResult<Article> {
        let mut state = self.write()?;
        let id = cmd.article_id.clone();
        Self::decide(&mut state, &id, ArticleCommand::Update(cmd))
    }

    async fn rename_article(&self, from: &ArticleId, to: &ArticleId) -> LedgerResult<Article> {
        let mut state = self.write()?;

        let article = state
            .articles
            .get(from)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("article {from}")))?;
        if from == to {
            return Ok(article);
        }
        if state.articles.contains_key(to) {
            return Err(DomainError::conflict(format!("article {to} already exists")).into());
        }

        let renamed = article.renamed(to.clone());
        state.articles.remove(from);
        state.articles.insert(to.clone(), renamed.clone());
        for m in state.movements.iter_mut().filter(|m| &m.article_id == from) {
            m.article_id = to.clone();
        }
        Ok(renamed)
    }

    async fn apply_movement(&self, request: MovementRequest) -> LedgerResult<Movement> {
        let mut state = self.write()?;

        let mut article = state
            .articles
            .get(&request.article_id)
            .cloned()
            .unwrap_or_else(|| Article::empty(request.article_id.clone()));

        let events = article.handle(&ArticleCommand::RecordMovement(request.clone()))?;

        if let Some(address) = &request.address {
            if !state.addresses.contains(address) {
                return Err(DomainError::not_found(format!("address {address}")).into());
            }
        }

        let new_movement = recorded_movement(&events)
            .cloned()
            .ok_or_else(|| LedgerError::storage("movement decision produced no record"))?;

        for e in &events {
            article.apply(e);
        }
        state.last_movement_id += 1;
        let movement = new_movement.into_recorded(state.last_movement_id);

        state.articles.insert(request.article_id.clone(), article);
        state.movements.push(movement.clone());
        Ok(movement)
    }

    async fn get_article(&self, id: &ArticleId) -> LedgerResult<Option<Article>> {
        Ok(self.read()?.articles.get(id).cloned())
    }

    async fn list_articles(&self) -> LedgerResult<Vec<Article>> {
        Ok(self.read()?.articles.values().cloned().collect())
    }

    async fn list_movements(
        &self,
        article: Option<&ArticleId>,
        limit: usize,
    ) -> LedgerResult<Vec<Movement>> {
        let state = self.read()?;
        Ok(state
            .movements
            .iter()
            .rev()
            .filter(|m| article.is_none_or(|id| &m.article_id == id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete_article(&self, id: &ArticleId) -> LedgerResult<()> {
        let mut state = self.write()?;
        if state.articles.remove(id).is_none() {
            return Err(DomainError::not_found(format!("article {id}")).into());
        }
        state.movements.retain(|m| &m.article_id != id);
        Ok(())
    }

    async fn add_address(&self, name: &AddressName) -> LedgerResult<()> {
        let mut state = self.write()?;
        if !state.addresses.insert(name.clone()) {
            return Err(DomainError::conflict(format!("address {name} already exists")).into());
        }
        Ok(())
    }

    async fn list_addresses(&self) -> LedgerResult<Vec<AddressName>> {
        Ok(self.read()?.addresses.iter().cloned().collect())
    }

    async fn delete_address(&self, name: &AddressName) -> LedgerResult<()> {
        let mut state = self.write()?;
        if !state.addresses.contains(name) {
            return Err(DomainError::not_found(format!("address {name}")).into());
        }
        if state
            .movements
            .iter()
            .any(|m| m.address.as_ref() == Some(name))
        {
            return Err(
                DomainError::conflict(format!("address {name} is referenced by movements")).into(),
            );
        }
        state.addresses.remove(name);
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> LedgerResult<Option<String>> {
        Ok(self.read()?.settings.get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: &str) -> LedgerResult<()> {
        self.write()?
            .settings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn init_setting(&self, key: &str, value: &str) -> LedgerResult<String> {
        let mut state = self.write()?;
        Ok(state
            .settings
            .entry(key.to_string())
            .or_insert_with(|| value.to_string())
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use stockledger_core::{AggregateRoot, Quantity};
    use stockledger_inventory::{Direction, Location};

    fn id(s: &str) -> ArticleId {
        ArticleId::parse(s).unwrap()
    }

    fn request(
        article: &str,
        direction: Direction,
        location: Location,
        units: i64,
    ) -> MovementRequest {
        MovementRequest::new(
            id(article),
            direction,
            location,
            Quantity::new(units).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        )
    }

    async fn registered(store: &InMemoryLedgerStore, article: &str) {
        store
            .ensure_article(EnsureArticle {
                article_id: id(article),
                display_name: format!("Part {article}"),
                reorder_threshold: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rejected_movement_writes_nothing() {
        let store = InMemoryLedgerStore::new();
        registered(&store, "A").await;

        let err = store
            .apply_movement(request("A", Direction::Out, Location::Stock, 1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Domain(DomainError::InsufficientBalance { .. })
        ));
        assert!(store.list_movements(None, 10).await.unwrap().is_empty());
        assert_eq!(store.get_article(&id("A")).await.unwrap().unwrap().stock(), 0);
    }

    #[tokio::test]
    async fn unknown_address_is_rejected_before_mutation() {
        let store = InMemoryLedgerStore::new();
        registered(&store, "A").await;

        let req = request("A", Direction::In, Location::Stock, 2)
            .with_address(AddressName::parse("Nowhere").unwrap());
        let err = store.apply_movement(req).await.unwrap_err();
        assert!(matches!(err, LedgerError::Domain(DomainError::NotFound(_))));
        assert_eq!(store.get_article(&id("A")).await.unwrap().unwrap().stock(), 0);
    }

    #[tokio::test]
    async fn movement_ids_are_monotonic_and_listed_newest_first() {
        let store = InMemoryLedgerStore::new();
        registered(&store, "A").await;
        registered(&store, "B").await;

        store.apply_movement(request("A", Direction::In, Location::Stock, 1)).await.unwrap();
        store.apply_movement(request("B", Direction::In, Location::Stock, 1)).await.unwrap();
        store.apply_movement(request("A", Direction::In, Location::Stock, 1)).await.unwrap();

        let all: Vec<i64> = store
            .list_movements(None, 10)
            .await
            .unwrap()
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(all, vec![3, 2, 1]);

        let only_a = store.list_movements(Some(&id("A")), 1).await.unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].id, 3);
    }

    #[tokio::test]
    async fn rename_carries_history_and_refuses_collisions() {
        let store = InMemoryLedgerStore::new();
        registered(&store, "OLD").await;
        registered(&store, "TAKEN").await;
        store.apply_movement(request("OLD", Direction::In, Location::Stock, 4)).await.unwrap();

        let err = store.rename_article(&id("OLD"), &id("TAKEN")).await.unwrap_err();
        assert!(matches!(err, LedgerError::Domain(DomainError::Conflict(_))));

        let err = store.rename_article(&id("MISSING"), &id("NEW")).await.unwrap_err();
        assert!(matches!(err, LedgerError::Domain(DomainError::NotFound(_))));

        let renamed = store.rename_article(&id("OLD"), &id("NEW")).await.unwrap();
        assert_eq!(renamed.stock(), 4);
        assert!(store.get_article(&id("OLD")).await.unwrap().is_none());
        let history = store.list_movements(Some(&id("NEW")), 10).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn init_setting_keeps_existing_value() {
        let store = InMemoryLedgerStore::new();
        assert_eq!(store.init_setting("k", "1").await.unwrap(), "1");
        assert_eq!(store.init_setting("k", "2").await.unwrap(), "1");
        store.set_setting("k", "5").await.unwrap();
        assert_eq!(store.get_setting("k").await.unwrap().as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn articles_are_listed_in_byte_order_of_their_identifier() {
        let store = InMemoryLedgerStore::new();
        for code in ["b", "_x", "a", "B"] {
            registered(&store, code).await;
        }

        let ids: Vec<String> = store
            .list_articles()
            .await
            .unwrap()
            .iter()
            .map(|a| a.id().as_str().to_string())
            .collect();
        assert_eq!(ids, ["B", "_x", "a", "b"]);
    }
}
