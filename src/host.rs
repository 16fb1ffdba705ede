//! Host feed: turns JSON lines describing host-side changes into relation
//! board updates and hook deliveries.
//!
//! Each line is one [`HostMessage`], for example
//!
//! ```text
//! {"kind":"relation_created","id":1,"remote_app":"cu"}
//! {"kind":"relation_data","id":1,"app":"cu","data":{"cu_address":"10.1.0.4","cu_port":"2152"}}
//! ```
//!
//! Malformed lines are logged and skipped.

use log::{debug, error, info};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

use crate::error::RelationError;
use crate::relation::RelationBoard;
use crate::types::{HookEvent, RelationId, Slot};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostMessage {
    Install,
    ConfigChanged,
    WorkloadReady,
    RelationCreated {
        id: RelationId,
        remote_app: String,
    },
    RelationData {
        id: RelationId,
        app: String,
        data: Slot,
    },
    RelationDeparted {
        id: RelationId,
        app: String,
    },
    RelationBroken {
        id: RelationId,
    },
}

/// Applies host messages for one local application and one relation name.
pub struct HostFeed {
    board: RelationBoard,
    local_app: String,
    relation_name: String,
}

impl HostFeed {
    pub fn new(board: RelationBoard, local_app: String, relation_name: String) -> Self {
        Self {
            board,
            local_app,
            relation_name,
        }
    }

    /// Update the board and return the hooks the host would deliver, in
    /// order.
    pub async fn apply(&self, message: HostMessage) -> Result<Vec<HookEvent>, RelationError> {
        let relation_name = self.relation_name.clone();
        let hooks = match message {
            HostMessage::Install => vec![HookEvent::Install],
            HostMessage::ConfigChanged => vec![HookEvent::ConfigChanged],
            HostMessage::WorkloadReady => vec![HookEvent::WorkloadReady],
            HostMessage::RelationCreated { id, remote_app } => {
                self.board
                    .create_relation(&self.relation_name, id, &self.local_app)
                    .await;
                self.board.join_relation(id, &remote_app).await?;
                vec![
                    HookEvent::RelationJoined {
                        relation_name: relation_name.clone(),
                        id,
                    },
                    HookEvent::RelationChanged { relation_name, id },
                ]
            }
            HostMessage::RelationData { id, app, data } => {
                self.board.set_slot_data(id, &app, data).await?;
                if app == self.local_app {
                    // The host does not notify an application of its own writes.
                    Vec::new()
                } else {
                    vec![HookEvent::RelationChanged { relation_name, id }]
                }
            }
            HostMessage::RelationDeparted { id, app } => {
                self.board.depart_relation(id, &app).await;
                vec![HookEvent::RelationChanged { relation_name, id }]
            }
            HostMessage::RelationBroken { id } => {
                self.board.remove_relation(id).await;
                vec![HookEvent::RelationBroken { relation_name, id }]
            }
        };
        Ok(hooks)
    }

    /// Read messages from `reader` until EOF, forwarding hooks to `hook_tx`.
    pub async fn run<R>(self, reader: R, hook_tx: mpsc::Sender<HookEvent>) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let message = match serde_json::from_str::<HostMessage>(line) {
                Ok(m) => m,
                Err(e) => {
                    error!("Failed to deserialize host message: {}", e);
                    continue;
                }
            };
            debug!("Host message: {:?}", message);
            let hooks = match self.apply(message).await {
                Ok(h) => h,
                Err(e) => {
                    error!("Failed to apply host message: {}", e);
                    continue;
                }
            };
            for hook in hooks {
                if hook_tx.send(hook).await.is_err() {
                    return Err(anyhow::anyhow!("Hook channel closed"));
                }
            }
        }
        info!("Host feed reached end of input");
        Ok(())
    }
}
