//! Startup wiring: one log, one command bus with its validated registry, the
//! deferred path and the checked-in users read model.

use std::sync::Arc;

use tracing::info;

use checkin_building::{
    BuildingId, CheckUserIntoBuilding, CheckUserOutOfBuilding,
    NotifyAdministratorOfMultipleCheckInAnomaly, NotifyAdministratorWhenUserCheckedInMultipleTimes,
    RegisterNewBuilding,
};
use checkin_events::{InMemoryCommandQueue, ProcessManagerListener};
use checkin_infra::handlers::{
    CheckUserIntoBuildingHandler, CheckUserOutOfBuildingHandler, NotifyAdministratorHandler,
    RegisterNewBuildingHandler,
};
use checkin_infra::projections::{CheckedInUsers, CheckedInUsersProjector, RebuildError};
use checkin_infra::read_model::InMemoryReadModelStore;
use checkin_infra::workers::{CommandConsumer, ConsumerConfig, ConsumerHandle};
use checkin_infra::{AnomalyNotifier, CommandBus, DeferredCommandBus, InMemoryEventLog, RegistryError};

use crate::config::AppConfig;

pub type CheckedInUsersView = CheckedInUsersProjector<InMemoryReadModelStore<BuildingId, CheckedInUsers>>;

pub struct CheckinServices {
    pub log: Arc<InMemoryEventLog>,
    pub bus: Arc<CommandBus>,
    pub queue: Arc<InMemoryCommandQueue>,
    pub deferred: DeferredCommandBus<Arc<InMemoryCommandQueue>>,
    pub checked_in_users: Arc<CheckedInUsersView>,
    consumer_config: ConsumerConfig,
}

/// In-memory wiring (dev/test).
///
/// Fails if the handler registry is inconsistent, before any command runs.
pub fn build_services(
    config: &AppConfig,
    notifier: Arc<dyn AnomalyNotifier>,
) -> Result<CheckinServices, RegistryError> {
    let log = Arc::new(InMemoryEventLog::new());
    let checked_in_users: Arc<CheckedInUsersView> =
        Arc::new(CheckedInUsersProjector::new(InMemoryReadModelStore::new()));

    let bus = CommandBus::builder(log.clone())
        .handler::<RegisterNewBuilding, _>(RegisterNewBuildingHandler)
        .handler::<CheckUserIntoBuilding, _>(CheckUserIntoBuildingHandler::new(Arc::new(
            config.allow_list(),
        )))
        .handler::<CheckUserOutOfBuilding, _>(CheckUserOutOfBuildingHandler)
        .handler::<NotifyAdministratorOfMultipleCheckInAnomaly, _>(NotifyAdministratorHandler::new(
            notifier,
        ))
        .projector(checked_in_users.clone())
        .listener(Arc::new(ProcessManagerListener::new(
            NotifyAdministratorWhenUserCheckedInMultipleTimes,
        )))
        .max_reentrancy_depth(config.max_reentrancy_depth)
        .build()?;

    let queue = Arc::new(InMemoryCommandQueue::new());
    let deferred = DeferredCommandBus::new(queue.clone());

    info!(
        authorized_users = config.authorized_users.len(),
        max_reentrancy_depth = config.max_reentrancy_depth,
        "check-in services ready"
    );

    Ok(CheckinServices {
        log,
        bus: Arc::new(bus),
        queue,
        deferred,
        checked_in_users,
        consumer_config: ConsumerConfig::default()
            .with_poll_interval(config.consumer_poll_interval)
            .with_max_delivery_attempts(config.max_delivery_attempts),
    })
}

impl CheckinServices {
    /// Consumer for the deferred queue, to drive step by step.
    pub fn consumer(&self) -> CommandConsumer<Arc<InMemoryCommandQueue>> {
        CommandConsumer::new(self.bus.clone(), self.queue.clone(), self.consumer_config.clone())
    }

    /// Start a consumer thread for the deferred queue.
    pub fn spawn_consumer(&self) -> std::io::Result<ConsumerHandle> {
        self.consumer().spawn()
    }

    /// Rebuild the checked-in users view from the full log.
    pub fn rebuild_read_model(&self) -> Result<usize, RebuildError> {
        self.checked_in_users.rebuild_from_log(self.log.as_ref())
    }
}
