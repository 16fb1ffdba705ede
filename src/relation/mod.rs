//! The `fiveg_f1` relation library.
//!
//! Two operators connected over a relation each own one key-value slot
//! per relation instance.  The CU publishes `cu_address`/`cu_port`, the DU
//! publishes `du_address`/`du_port`, and each side watches the other's
//! slot for a complete endpoint.
//!
//! The host runtime owns the data; this module only consumes it through
//! the [`RelationStore`] trait.  [`memory::RelationBoard`] is an
//! in-process implementation used by the stdin host feed and the tests.

use async_trait::async_trait;

use crate::error::RelationError;
use crate::types::{RelationId, Slot};

pub mod events;
pub mod f1;
pub mod memory;

pub use events::EventBus;
pub use f1::{EndpointPublisher, EndpointWatcher, F1Provides, F1Requires};
pub use memory::{LocalRelationStore, RelationBoard};

/// Handle on one relation instance, as seen by the local application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub id: RelationId,
    pub name: String,
    /// `None` until the peer application has joined.
    pub remote_app: Option<String>,
}

#[async_trait]
pub trait RelationStore: Send + Sync {
    /// Name of the application this store writes on behalf of.
    fn local_app(&self) -> &str;

    /// Resolve a relation by name, optionally pinned to one instance id.
    /// Without an id the lowest-numbered instance is returned.
    async fn get_relation(&self, name: &str, id: Option<RelationId>) -> Option<Relation>;

    /// Read the slot `app` owns on `relation`.
    async fn read_slot(&self, relation: &Relation, app: &str) -> Option<Slot>;

    /// Merge `data` into the local application's slot.  Keys not present
    /// in `data` are left untouched.
    async fn write_slot(&self, relation: &Relation, data: Slot) -> Result<(), RelationError>;
}
