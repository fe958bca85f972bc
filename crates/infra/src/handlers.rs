//! Command handlers for the building domain.

use std::sync::Arc;

use tracing::debug;

use checkin_building::{
    AuthorizedUsers, Building, CheckUserIntoBuilding, CheckUserOutOfBuilding,
    NotifyAdministratorOfMultipleCheckInAnomaly, RegisterNewBuilding,
};

use crate::command_bus::{CommandHandler, DispatchError};
use crate::notify::AnomalyNotifier;
use crate::repository::UnitOfWork;

#[derive(Debug, Default, Clone, Copy)]
pub struct RegisterNewBuildingHandler;

impl CommandHandler<RegisterNewBuilding> for RegisterNewBuildingHandler {
    fn handle(&self, command: RegisterNewBuilding, uow: &mut UnitOfWork<'_>) -> Result<(), DispatchError> {
        let mut building = Building::register(command.building_id, &command.name)?;
        uow.add(&mut building)?;
        Ok(())
    }
}

/// Checks users in after consulting the authorization predicate.
#[derive(Clone)]
pub struct CheckUserIntoBuildingHandler {
    authorized_users: Arc<dyn AuthorizedUsers>,
}

impl CheckUserIntoBuildingHandler {
    pub fn new(authorized_users: Arc<dyn AuthorizedUsers>) -> Self {
        Self { authorized_users }
    }
}

impl CommandHandler<CheckUserIntoBuilding> for CheckUserIntoBuildingHandler {
    fn handle(&self, command: CheckUserIntoBuilding, uow: &mut UnitOfWork<'_>) -> Result<(), DispatchError> {
        let mut building: Building = uow.get(command.building_id)?;
        building.check_in_user(self.authorized_users.as_ref(), &command.username)?;
        uow.add(&mut building)?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CheckUserOutOfBuildingHandler;

impl CommandHandler<CheckUserOutOfBuilding> for CheckUserOutOfBuildingHandler {
    fn handle(&self, command: CheckUserOutOfBuilding, uow: &mut UnitOfWork<'_>) -> Result<(), DispatchError> {
        let mut building: Building = uow.get(command.building_id)?;
        building.check_out_user(&command.username)?;
        uow.add(&mut building)?;
        Ok(())
    }
}

/// Forwards anomaly notifications to the configured sink. Appends nothing.
#[derive(Clone)]
pub struct NotifyAdministratorHandler {
    notifier: Arc<dyn AnomalyNotifier>,
}

impl NotifyAdministratorHandler {
    pub fn new(notifier: Arc<dyn AnomalyNotifier>) -> Self {
        Self { notifier }
    }
}

impl CommandHandler<NotifyAdministratorOfMultipleCheckInAnomaly> for NotifyAdministratorHandler {
    fn handle(
        &self,
        command: NotifyAdministratorOfMultipleCheckInAnomaly,
        _uow: &mut UnitOfWork<'_>,
    ) -> Result<(), DispatchError> {
        debug!(building_id = %command.building_id, username = %command.username, "notifying administrator");
        self.notifier.notify(&command.username, command.building_id)?;
        Ok(())
    }
}
