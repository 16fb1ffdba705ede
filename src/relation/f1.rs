//! Endpoint watch-and-publish over the F1 relation.

use std::sync::Arc;

use log::{info, warn};

use super::{EventBus, Relation, RelationStore};
use crate::error::RelationError;
use crate::types::{Endpoint, F1Event, RelationId, Role, Slot};

/// Pull the endpoint for `role` out of a slot, if both keys are set.
fn endpoint_from_slot(slot: &Slot, role: Role) -> Option<Endpoint> {
    let address = slot.get(role.address_key())?;
    let port = slot.get(role.port_key())?;
    Some(Endpoint::new(address.clone(), port.clone()))
}

/// Watches the peer's slot for a complete endpoint of `role`.
#[derive(Debug)]
pub struct EndpointWatcher<S> {
    store: Arc<S>,
    relation_name: String,
    role: Role,
    bus: EventBus,
}

impl<S: RelationStore> EndpointWatcher<S> {
    pub fn new(store: Arc<S>, relation_name: impl Into<String>, role: Role, bus: EventBus) -> Self {
        Self {
            store,
            relation_name: relation_name.into(),
            role,
            bus,
        }
    }

    pub fn relation_name(&self) -> &str {
        &self.relation_name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Handle a relation-data-changed notification.
    ///
    /// Emits [`F1Event::PeerEndpointAvailable`] every time both fields are
    /// present, including when the same values are delivered again.
    /// Returns whether an event was emitted.
    pub async fn on_relation_changed(&self, relation: &Relation) -> bool {
        let Some(remote_app) = relation.remote_app.as_deref() else {
            warn!("No remote application in relation: {}", self.relation_name);
            return false;
        };
        let slot = self
            .store
            .read_slot(relation, remote_app)
            .await
            .unwrap_or_default();
        let address = slot.get(self.role.address_key());
        let port = slot.get(self.role.port_key());
        let (Some(address), Some(port)) = (address, port) else {
            let missing = if address.is_none() {
                self.role.address_key()
            } else {
                self.role.port_key()
            };
            info!(
                "No {} in relation data - Not triggering {}_available event",
                missing,
                self.role.as_str()
            );
            return false;
        };
        let endpoint = Endpoint::new(address.clone(), port.clone());
        info!(
            "{} endpoint {} available on relation {}:{}",
            self.role.as_str(),
            endpoint,
            self.relation_name,
            relation.id
        );
        self.bus.emit(F1Event::PeerEndpointAvailable {
            relation_id: relation.id,
            role: self.role,
            address: endpoint.address,
            port: endpoint.port,
        });
        true
    }

    /// Current peer endpoint, read straight from the store.
    ///
    /// `None` when the relation is missing, the peer has not joined, or a
    /// field is unset.
    pub async fn endpoint(&self, relation_id: Option<RelationId>) -> Option<Endpoint> {
        let relation = self
            .store
            .get_relation(&self.relation_name, relation_id)
            .await?;
        let remote_app = relation.remote_app.as_deref()?;
        let slot = self.store.read_slot(&relation, remote_app).await?;
        endpoint_from_slot(&slot, self.role)
    }

    pub async fn endpoint_available(&self, relation_id: Option<RelationId>) -> bool {
        self.endpoint(relation_id).await.is_some()
    }
}

/// Writes the local application's endpoint of `role` into its own slot.
#[derive(Debug)]
pub struct EndpointPublisher<S> {
    store: Arc<S>,
    relation_name: String,
    role: Role,
}

impl<S: RelationStore> EndpointPublisher<S> {
    pub fn new(store: Arc<S>, relation_name: impl Into<String>, role: Role) -> Self {
        Self {
            store,
            relation_name: relation_name.into(),
            role,
        }
    }

    /// Fails with [`RelationError::RelationNotFound`] when `relation_id`
    /// does not resolve; callers must only publish once the relation
    /// exists.
    pub async fn publish(
        &self,
        relation_id: RelationId,
        address: &str,
        port: &str,
    ) -> Result<(), RelationError> {
        let relation = self
            .store
            .get_relation(&self.relation_name, Some(relation_id))
            .await
            .ok_or_else(|| RelationError::RelationNotFound {
                name: self.relation_name.clone(),
                id: Some(relation_id),
            })?;
        let data = Slot::from([
            (self.role.address_key().to_string(), address.to_string()),
            (self.role.port_key().to_string(), port.to_string()),
        ]);
        self.store.write_slot(&relation, data).await?;
        info!(
            "Published {} endpoint {}:{} on relation {}:{}",
            self.role.as_str(),
            address,
            port,
            self.relation_name,
            relation_id
        );
        Ok(())
    }
}

/// DU side of the F1 interface: watches the CU endpoint and publishes the
/// DU endpoint.
#[derive(Debug)]
pub struct F1Requires<S> {
    watcher: EndpointWatcher<S>,
    publisher: EndpointPublisher<S>,
}

impl<S: RelationStore> F1Requires<S> {
    pub fn new(store: Arc<S>, relation_name: &str, bus: EventBus) -> Self {
        Self {
            watcher: EndpointWatcher::new(Arc::clone(&store), relation_name, Role::Cu, bus),
            publisher: EndpointPublisher::new(store, relation_name, Role::Du),
        }
    }

    pub fn watcher(&self) -> &EndpointWatcher<S> {
        &self.watcher
    }

    pub async fn cu_endpoint(&self, relation_id: Option<RelationId>) -> Option<Endpoint> {
        self.watcher.endpoint(relation_id).await
    }

    pub async fn cu_endpoint_available(&self, relation_id: Option<RelationId>) -> bool {
        self.watcher.endpoint_available(relation_id).await
    }

    pub async fn set_du_information(
        &self,
        relation_id: RelationId,
        du_address: &str,
        du_port: &str,
    ) -> Result<(), RelationError> {
        self.publisher.publish(relation_id, du_address, du_port).await
    }
}

/// CU side of the F1 interface: watches the DU endpoint and publishes the
/// CU endpoint.
#[derive(Debug)]
pub struct F1Provides<S> {
    watcher: EndpointWatcher<S>,
    publisher: EndpointPublisher<S>,
}

impl<S: RelationStore> F1Provides<S> {
    pub fn new(store: Arc<S>, relation_name: &str, bus: EventBus) -> Self {
        Self {
            watcher: EndpointWatcher::new(Arc::clone(&store), relation_name, Role::Du, bus),
            publisher: EndpointPublisher::new(store, relation_name, Role::Cu),
        }
    }

    pub fn watcher(&self) -> &EndpointWatcher<S> {
        &self.watcher
    }

    pub async fn du_endpoint(&self, relation_id: Option<RelationId>) -> Option<Endpoint> {
        self.watcher.endpoint(relation_id).await
    }

    pub async fn du_endpoint_available(&self, relation_id: Option<RelationId>) -> bool {
        self.watcher.endpoint_available(relation_id).await
    }

    pub async fn set_cu_information(
        &self,
        relation_id: RelationId,
        cu_address: &str,
        cu_port: &str,
    ) -> Result<(), RelationError> {
        self.publisher.publish(relation_id, cu_address, cu_port).await
    }
}
