use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use tokio::sync::RwLock;

use super::{Relation, RelationStore};
use crate::error::RelationError;
use crate::types::{RelationId, Slot};

#[derive(Debug, Default)]
struct RelationState {
    name: String,
    /// Applications attached to the relation, in join order.
    apps: Vec<String>,
    slots: HashMap<String, Slot>,
}

/// Shared relation data for every application in this process.
///
/// Cloning is cheap; all clones see the same data.  Writes are visible to
/// the next read from any application.
#[derive(Debug, Clone, Default)]
pub struct RelationBoard {
    state: Arc<RwLock<BTreeMap<RelationId, RelationState>>>,
}

impl RelationBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create relation `id` with `app` as its only member.
    pub async fn create_relation(&self, name: &str, id: RelationId, app: &str) {
        let mut map = self.state.write().await;
        let entry = map.entry(id).or_insert_with(|| RelationState {
            name: name.to_string(),
            ..Default::default()
        });
        if !entry.apps.iter().any(|a| a == app) {
            entry.apps.push(app.to_string());
        }
        info!("Relation {}:{} created by {}", name, id, app);
    }

    pub async fn join_relation(&self, id: RelationId, app: &str) -> Result<(), RelationError> {
        let mut map = self.state.write().await;
        let state = map
            .get_mut(&id)
            .ok_or(RelationError::UnknownRelation(id))?;
        if !state.apps.iter().any(|a| a == app) {
            state.apps.push(app.to_string());
            info!("Application {} joined relation {}:{}", app, state.name, id);
        }
        Ok(())
    }

    /// Detach `app`; its slot goes with it.
    pub async fn depart_relation(&self, id: RelationId, app: &str) {
        let mut map = self.state.write().await;
        if let Some(state) = map.get_mut(&id) {
            state.apps.retain(|a| a != app);
            state.slots.remove(app);
            info!("Application {} departed relation {}:{}", app, state.name, id);
        }
    }

    pub async fn remove_relation(&self, id: RelationId) {
        let mut map = self.state.write().await;
        if let Some(state) = map.remove(&id) {
            info!("Relation {}:{} removed", state.name, id);
        }
    }

    /// Host-side update of `app`'s slot.  An empty value removes the key.
    pub async fn set_slot_data(
        &self,
        id: RelationId,
        app: &str,
        data: Slot,
    ) -> Result<(), RelationError> {
        let mut map = self.state.write().await;
        let state = map
            .get_mut(&id)
            .ok_or(RelationError::UnknownRelation(id))?;
        let slot = state.slots.entry(app.to_string()).or_default();
        for (key, value) in data {
            if value.is_empty() {
                slot.remove(&key);
            } else {
                slot.insert(key, value);
            }
        }
        debug!("Slot {} on relation {}:{} is now {:?}", app, state.name, id, slot);
        Ok(())
    }

    /// A [`RelationStore`] bound to `app`.
    pub fn store_for(&self, app: &str) -> LocalRelationStore {
        LocalRelationStore {
            board: self.clone(),
            app: app.to_string(),
        }
    }
}

/// View of a [`RelationBoard`] from one application.
#[derive(Debug, Clone)]
pub struct LocalRelationStore {
    board: RelationBoard,
    app: String,
}

#[async_trait]
impl RelationStore for LocalRelationStore {
    fn local_app(&self) -> &str {
        &self.app
    }

    async fn get_relation(&self, name: &str, id: Option<RelationId>) -> Option<Relation> {
        let map = self.board.state.read().await;
        map.iter()
            .filter(|(rid, _)| id.map_or(true, |want| **rid == want))
            .find(|(_, state)| state.name == name && state.apps.contains(&self.app))
            .map(|(rid, state)| Relation {
                id: *rid,
                name: state.name.clone(),
                remote_app: state.apps.iter().find(|a| **a != self.app).cloned(),
            })
    }

    async fn read_slot(&self, relation: &Relation, app: &str) -> Option<Slot> {
        let map = self.board.state.read().await;
        map.get(&relation.id)
            .and_then(|state| state.slots.get(app))
            .cloned()
    }

    async fn write_slot(&self, relation: &Relation, data: Slot) -> Result<(), RelationError> {
        let mut map = self.board.state.write().await;
        let state = map
            .get_mut(&relation.id)
            .filter(|state| state.apps.contains(&self.app))
            .ok_or_else(|| RelationError::RelationNotFound {
                name: relation.name.clone(),
                id: Some(relation.id),
            })?;
        state.slots.entry(self.app.clone()).or_default().extend(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(pairs: &[(&str, &str)]) -> Slot {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn remote_app_appears_after_join() {
        let board = RelationBoard::new();
        board.create_relation("fiveg-f1", 1, "du").await;
        let store = board.store_for("du");

        let relation = store.get_relation("fiveg-f1", None).await.unwrap();
        assert_eq!(relation.remote_app, None);

        board.join_relation(1, "cu").await.unwrap();
        let relation = store.get_relation("fiveg-f1", Some(1)).await.unwrap();
        assert_eq!(relation.remote_app.as_deref(), Some("cu"));
    }

    #[tokio::test]
    async fn relation_lookup_respects_name_and_id() {
        let board = RelationBoard::new();
        board.create_relation("fiveg-f1", 4, "du").await;
        let store = board.store_for("du");

        assert!(store.get_relation("fiveg-f1", Some(5)).await.is_none());
        assert!(store.get_relation("other", Some(4)).await.is_none());
        assert!(board.store_for("cu").get_relation("fiveg-f1", None).await.is_none());
    }

    #[tokio::test]
    async fn empty_value_clears_key() {
        let board = RelationBoard::new();
        board.create_relation("fiveg-f1", 1, "du").await;
        board.join_relation(1, "cu").await.unwrap();
        board
            .set_slot_data(1, "cu", slot(&[("cu_address", "5.6.7.8"), ("cu_port", "1234")]))
            .await
            .unwrap();
        board
            .set_slot_data(1, "cu", slot(&[("cu_port", "")]))
            .await
            .unwrap();

        let store = board.store_for("du");
        let relation = store.get_relation("fiveg-f1", None).await.unwrap();
        let data = store.read_slot(&relation, "cu").await.unwrap();
        assert_eq!(data, slot(&[("cu_address", "5.6.7.8")]));
    }

    #[tokio::test]
    async fn write_to_removed_relation_fails() {
        let board = RelationBoard::new();
        board.create_relation("fiveg-f1", 1, "du").await;
        let store = board.store_for("du");
        let relation = store.get_relation("fiveg-f1", None).await.unwrap();

        board.remove_relation(1).await;
        let err = store
            .write_slot(&relation, slot(&[("du_port", "2153")]))
            .await
            .unwrap_err();
        assert!(matches!(err, RelationError::RelationNotFound { id: Some(1), .. }));
    }
}
