//! The DU operator: reacts to host hooks and F1 events, renders the
//! softmodem config and restarts the workload.
//!
//! Hooks are handled strictly one at a time.  A hook that cannot make
//! progress because the workload container is unreachable is deferred and
//! re-run before the next hook, the same way the host would redeliver it.
//! A deferred hook that fails again stays queued.  Every reconcile within
//! one dispatch sees the same relation data, so the workload is reconciled
//! at most once per dispatch.

use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::error::{OperatorError, RelationError};
use crate::relation::{EventBus, F1Requires, RelationStore};
use crate::render::{config_file_path, softmodem_command, GnbConfig};
use crate::types::{Endpoint, EventKind, F1Event, HookEvent, RelationId, UnitStatus};
use crate::workload::{Layer, Workload};

const SERVICE_NAME: &str = "du";

pub struct DuOperator<S, W> {
    config: Config,
    store: Arc<S>,
    f1: F1Requires<S>,
    workload: W,
    events: mpsc::UnboundedReceiver<F1Event>,
    deferred: VecDeque<HookEvent>,
    /// Set once the current dispatch has reached the workload.
    reconciled: bool,
    status: UnitStatus,
}

impl<S: RelationStore, W: Workload> DuOperator<S, W> {
    pub fn new(config: Config, store: Arc<S>, workload: W) -> Self {
        let bus = EventBus::new();
        let (tx, events) = mpsc::unbounded_channel();
        bus.forward_to(EventKind::PeerEndpointAvailable, tx);
        let f1 = F1Requires::new(Arc::clone(&store), &config.relation_name, bus);
        Self {
            config,
            store,
            f1,
            workload,
            events,
            deferred: VecDeque::new(),
            reconciled: false,
            status: UnitStatus::Unknown,
        }
    }

    pub fn status(&self) -> &UnitStatus {
        &self.status
    }

    pub fn deferred(&self) -> usize {
        self.deferred.len()
    }

    /// Consume hooks until the channel closes.
    ///
    /// Workload failures are logged and the loop carries on; relation
    /// sequencing errors stop it.
    pub async fn run(mut self, mut hooks: mpsc::Receiver<HookEvent>) -> Result<(), OperatorError> {
        while let Some(hook) = hooks.recv().await {
            match self.dispatch(hook.clone()).await {
                Ok(()) => {}
                Err(OperatorError::Workload(e)) => {
                    error!("Hook {:?} failed: {}", hook, e);
                    self.set_status(UnitStatus::Blocked(format!("Workload error: {}", e)));
                }
                Err(e) => return Err(e),
            }
        }
        info!("Hook channel closed, shutting down");
        Ok(())
    }

    /// Re-run deferred hooks, then handle `hook`.
    ///
    /// `hook` is handled even when a deferred hook fails.  Failed hooks are
    /// queued again, except for relation errors on `hook` itself, and the
    /// first failure is returned once everything has run.
    pub async fn dispatch(&mut self, hook: HookEvent) -> Result<(), OperatorError> {
        self.reconciled = false;
        let mut first_error = None;

        let pending = std::mem::take(&mut self.deferred);
        for deferred in pending {
            info!("Re-running deferred hook {:?}", deferred);
            if let Err(e) = self.run_hook(deferred.clone()).await {
                warn!("Deferred hook {:?} failed again: {}", deferred, e);
                self.defer(deferred);
                first_error.get_or_insert(e);
            }
        }

        if let Err(e) = self.run_hook(hook.clone()).await {
            if matches!(e, OperatorError::Workload(_)) {
                self.defer(hook);
            }
            first_error.get_or_insert(e);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn defer(&mut self, hook: HookEvent) {
        if !self.deferred.contains(&hook) {
            self.deferred.push_back(hook);
        }
    }

    async fn run_hook(&mut self, hook: HookEvent) -> Result<(), OperatorError> {
        self.handle(hook).await?;
        while let Ok(event) = self.events.try_recv() {
            self.on_f1_event(event).await?;
        }
        Ok(())
    }

    async fn handle(&mut self, hook: HookEvent) -> Result<(), OperatorError> {
        match &hook {
            HookEvent::Install => {
                self.set_status(UnitStatus::Maintenance("Installing".into()));
                Ok(())
            }
            HookEvent::ConfigChanged | HookEvent::WorkloadReady => self.reconcile(hook.clone()).await,
            HookEvent::RelationJoined { relation_name, id } => {
                self.check_relation(relation_name)?;
                self.on_relation_joined(*id).await
            }
            HookEvent::RelationChanged { relation_name, id } => {
                self.check_relation(relation_name)?;
                let Some(relation) = self
                    .store
                    .get_relation(relation_name, Some(*id))
                    .await
                else {
                    warn!("Relation {}:{} is gone", relation_name, id);
                    return Ok(());
                };
                // An emitted event reconciles when the queue is drained.
                if self.f1.watcher().on_relation_changed(&relation).await {
                    Ok(())
                } else {
                    self.reconcile(hook.clone()).await
                }
            }
            HookEvent::RelationBroken { relation_name, id } => {
                self.check_relation(relation_name)?;
                info!("Relation {}:{} broken", relation_name, id);
                self.set_status(UnitStatus::Blocked(
                    "Waiting for relation to CU to be created".into(),
                ));
                Ok(())
            }
        }
    }

    fn check_relation(&self, relation_name: &str) -> Result<(), RelationError> {
        if relation_name != self.f1.watcher().relation_name() {
            return Err(RelationError::UnregisteredRelation(relation_name.to_string()));
        }
        Ok(())
    }

    async fn on_relation_joined(&mut self, id: RelationId) -> Result<(), OperatorError> {
        if !self.config.leader {
            return Ok(());
        }
        let Some(du_address) = self.config.du_address.clone() else {
            warn!("No DU address configured, not publishing F1 information");
            return Ok(());
        };
        self.f1
            .set_du_information(id, &du_address, &self.config.f1_du_port)
            .await?;
        Ok(())
    }

    async fn on_f1_event(&mut self, event: F1Event) -> Result<(), OperatorError> {
        match event {
            F1Event::PeerEndpointAvailable { relation_id, .. } => {
                let trigger = HookEvent::RelationChanged {
                    relation_name: self.config.relation_name.clone(),
                    id: relation_id,
                };
                self.reconcile(trigger).await
            }
        }
    }

    /// Bring the workload in line with the relation selected by `trigger`.
    /// Hooks that name no relation use the first instance.
    async fn reconcile(&mut self, trigger: HookEvent) -> Result<(), OperatorError> {
        if self.reconciled {
            debug!("Workload already reconciled, skipping {:?}", trigger);
            return Ok(());
        }
        if !self.workload.can_connect().await {
            self.set_status(UnitStatus::Waiting(
                "Waiting for workload container".into(),
            ));
            self.defer(trigger);
            return Ok(());
        }
        self.reconciled = true;

        let relation_id = trigger.relation_id();
        if self
            .store
            .get_relation(&self.config.relation_name, relation_id)
            .await
            .is_none()
        {
            self.set_status(UnitStatus::Blocked(
                "Waiting for relation to CU to be created".into(),
            ));
            return Ok(());
        }
        let Some(cu) = self.f1.cu_endpoint(relation_id).await else {
            self.set_status(UnitStatus::Waiting(
                "Waiting for CU F1 address to be available in relation data".into(),
            ));
            return Ok(());
        };
        let Some(du_address) = self.config.du_address.clone() else {
            self.set_status(UnitStatus::Blocked("DU F1 address is not configured".into()));
            return Ok(());
        };

        let content = GnbConfig {
            mcc: self.config.mcc.clone(),
            mnc: self.config.mnc.clone(),
            mnc_length: self.config.mnc_length,
            nssai_sst: self.config.nssai_sst,
            nssai_sd: self.config.nssai_sd.clone(),
            du: Endpoint::new(du_address, self.config.f1_du_port.clone()),
            cu,
        }
        .render();
        self.workload.push(&config_file_path(), &content).await?;
        info!("Wrote config file for CU at {}", config_file_path());

        self.workload
            .replan(&Layer::single(SERVICE_NAME, softmodem_command()))
            .await?;
        self.set_status(UnitStatus::Active);
        Ok(())
    }

    fn set_status(&mut self, status: UnitStatus) {
        if self.status != status {
            info!("Unit status: {}", status);
            self.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::{LocalRelationStore, RelationBoard};
    use crate::types::Slot;
    use crate::workload::{MemoryWorkload, Startup};
    use pretty_assertions::assert_eq;

    const RELATION: &str = "fiveg-f1";

    fn config() -> Config {
        Config {
            du_address: Some("1.2.3.4".into()),
            ..Config::default()
        }
    }

    fn operator(
        board: &RelationBoard,
        workload: &MemoryWorkload,
        config: Config,
    ) -> DuOperator<LocalRelationStore, MemoryWorkload> {
        DuOperator::new(config, Arc::new(board.store_for("du")), workload.clone())
    }

    fn changed(id: RelationId) -> HookEvent {
        HookEvent::RelationChanged {
            relation_name: RELATION.into(),
            id,
        }
    }

    fn cu_slot() -> Slot {
        Slot::from([
            ("cu_address".to_string(), "5.6.7.8".to_string()),
            ("cu_port".to_string(), "1234".to_string()),
        ])
    }

    async fn related_board() -> RelationBoard {
        let board = RelationBoard::new();
        board.create_relation(RELATION, 1, "du").await;
        board.join_relation(1, "cu").await.unwrap();
        board
    }

    #[tokio::test]
    async fn blocked_without_relation() {
        let board = RelationBoard::new();
        let workload = MemoryWorkload::new(true);
        let mut op = operator(&board, &workload, config());

        op.dispatch(HookEvent::ConfigChanged).await.unwrap();
        assert_eq!(
            op.status(),
            &UnitStatus::Blocked("Waiting for relation to CU to be created".into())
        );
    }

    #[tokio::test]
    async fn waiting_until_cu_endpoint_is_complete() {
        let board = related_board().await;
        board
            .set_slot_data(
                1,
                "cu",
                Slot::from([("cu_address".to_string(), "5.6.7.8".to_string())]),
            )
            .await
            .unwrap();
        let workload = MemoryWorkload::new(true);
        let mut op = operator(&board, &workload, config());

        op.dispatch(changed(1)).await.unwrap();
        assert_eq!(
            op.status(),
            &UnitStatus::Waiting(
                "Waiting for CU F1 address to be available in relation data".into()
            )
        );
        assert_eq!(workload.replans().await, 0);
    }

    #[tokio::test]
    async fn cu_endpoint_pushes_config_and_replans() {
        let board = related_board().await;
        board.set_slot_data(1, "cu", cu_slot()).await.unwrap();
        let workload = MemoryWorkload::new(true);
        let mut op = operator(&board, &workload, config());

        op.dispatch(changed(1)).await.unwrap();

        assert_eq!(op.status(), &UnitStatus::Active);
        let pushed = workload.file("/opt/oai-gnb/etc/gnb.conf").await.unwrap();
        assert!(pushed.contains("    remote_n_address = \"5.6.7.8\";\n"));
        assert!(pushed.contains("    remote_n_portd  = 1234;\n"));
        assert!(pushed.contains("    local_n_address = \"1.2.3.4\";\n"));

        let plan = workload.plan().await.unwrap();
        let service = &plan.services["du"];
        assert_eq!(service.command, softmodem_command());
        assert_eq!(service.startup, Startup::Enabled);
        assert_eq!(workload.replans().await, 1);
    }

    #[tokio::test]
    async fn unreachable_workload_defers_until_ready() {
        let board = related_board().await;
        board.set_slot_data(1, "cu", cu_slot()).await.unwrap();
        let workload = MemoryWorkload::new(false);
        let mut op = operator(&board, &workload, config());

        op.dispatch(changed(1)).await.unwrap();
        assert_eq!(
            op.status(),
            &UnitStatus::Waiting("Waiting for workload container".into())
        );
        assert_eq!(op.deferred(), 1);

        workload.set_reachable(true).await;
        op.dispatch(HookEvent::WorkloadReady).await.unwrap();
        assert_eq!(op.status(), &UnitStatus::Active);
        assert_eq!(op.deferred(), 0);
        assert_eq!(workload.replans().await, 1);
    }

    #[tokio::test]
    async fn failed_deferred_hook_stays_queued() {
        let board = related_board().await;
        board.set_slot_data(1, "cu", cu_slot()).await.unwrap();
        let workload = MemoryWorkload::new(false);
        let mut op = operator(&board, &workload, config());

        op.dispatch(HookEvent::ConfigChanged).await.unwrap();
        assert_eq!(op.deferred(), 1);

        workload.set_reachable(true).await;
        workload.set_fail_pushes(true).await;
        let err = op
            .dispatch(HookEvent::RelationJoined {
                relation_name: RELATION.into(),
                id: 1,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OperatorError::Workload(_)));
        assert_eq!(op.deferred(), 1);

        // The incoming hook still ran.
        let cu = board.store_for("cu");
        let relation = cu.get_relation(RELATION, Some(1)).await.unwrap();
        let data = cu.read_slot(&relation, "du").await.unwrap();
        assert_eq!(data["du_address"], "1.2.3.4");

        workload.set_fail_pushes(false).await;
        op.dispatch(HookEvent::Install).await.unwrap();
        assert_eq!(op.deferred(), 0);
        assert_eq!(workload.replans().await, 1);
    }

    #[tokio::test]
    async fn reconciles_the_relation_that_changed() {
        let board = related_board().await;
        board.create_relation(RELATION, 2, "du").await;
        board.join_relation(2, "cu-b").await.unwrap();
        board.set_slot_data(2, "cu-b", cu_slot()).await.unwrap();
        let workload = MemoryWorkload::new(true);
        let mut op = operator(&board, &workload, config());

        op.dispatch(changed(2)).await.unwrap();

        assert_eq!(op.status(), &UnitStatus::Active);
        let pushed = workload.file("/opt/oai-gnb/etc/gnb.conf").await.unwrap();
        assert!(pushed.contains("    remote_n_address = \"5.6.7.8\";\n"));
    }

    #[tokio::test]
    async fn leader_publishes_du_endpoint_on_join() {
        let board = related_board().await;
        let workload = MemoryWorkload::new(true);
        let mut op = operator(&board, &workload, config());

        op.dispatch(HookEvent::RelationJoined {
            relation_name: RELATION.into(),
            id: 1,
        })
        .await
        .unwrap();

        let cu = board.store_for("cu");
        let relation = cu.get_relation(RELATION, Some(1)).await.unwrap();
        let data = cu.read_slot(&relation, "du").await.unwrap();
        assert_eq!(data["du_address"], "1.2.3.4");
        assert_eq!(data["du_port"], "2153");
    }

    #[tokio::test]
    async fn non_leader_does_not_publish() {
        let board = related_board().await;
        let workload = MemoryWorkload::new(true);
        let mut op = operator(
            &board,
            &workload,
            Config {
                leader: false,
                ..config()
            },
        );

        op.dispatch(HookEvent::RelationJoined {
            relation_name: RELATION.into(),
            id: 1,
        })
        .await
        .unwrap();

        let cu = board.store_for("cu");
        let relation = cu.get_relation(RELATION, Some(1)).await.unwrap();
        assert!(cu.read_slot(&relation, "du").await.is_none());
    }

    #[tokio::test]
    async fn unknown_relation_is_fatal() {
        let board = related_board().await;
        let workload = MemoryWorkload::new(true);
        let mut op = operator(&board, &workload, config());

        let err = op
            .dispatch(HookEvent::RelationChanged {
                relation_name: "fiveg-n2".into(),
                id: 1,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OperatorError::Relation(RelationError::UnregisteredRelation(name)) if name == "fiveg-n2"
        ));
    }

    #[tokio::test]
    async fn run_stops_when_channel_closes() {
        let board = related_board().await;
        board.set_slot_data(1, "cu", cu_slot()).await.unwrap();
        let workload = MemoryWorkload::new(true);
        let op = operator(&board, &workload, config());
        let (tx, rx) = mpsc::channel(8);

        tx.send(HookEvent::Install).await.unwrap();
        tx.send(changed(1)).await.unwrap();
        drop(tx);
        op.run(rx).await.unwrap();

        assert_eq!(workload.replans().await, 1);
    }
}
