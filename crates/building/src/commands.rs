use serde::{Deserialize, Serialize};

use checkin_events::Command;

use crate::building::BuildingId;

/// Register a new building under a caller-chosen id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterNewBuilding {
    pub building_id: BuildingId,
    pub name: String,
}

impl Command for RegisterNewBuilding {
    const COMMAND_TYPE: &'static str = "building.register_new_building";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckUserIntoBuilding {
    pub building_id: BuildingId,
    pub username: String,
}

impl Command for CheckUserIntoBuilding {
    const COMMAND_TYPE: &'static str = "building.check_user_in";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckUserOutOfBuilding {
    pub building_id: BuildingId,
    pub username: String,
}

impl Command for CheckUserOutOfBuilding {
    const COMMAND_TYPE: &'static str = "building.check_user_out";
}

/// Ask for the administrator to be told that `username` checked into
/// `building_id` while already inside.
///
/// Writes nothing to the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyAdministratorOfMultipleCheckInAnomaly {
    pub building_id: BuildingId,
    pub username: String,
}

impl Command for NotifyAdministratorOfMultipleCheckInAnomaly {
    const COMMAND_TYPE: &'static str = "building.notify_administrator_of_multiple_check_in_anomaly";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_round_trip_through_transport_form() {
        let cmd = CheckUserIntoBuilding {
            building_id: BuildingId::generate(),
            username: "fritz".to_string(),
        };
        let serialized = cmd.to_serialized().unwrap();

        assert_eq!(serialized.command_type(), "building.check_user_in");
        assert_eq!(serialized.payload["username"], "fritz");
        assert_eq!(serialized.decode::<CheckUserIntoBuilding>().unwrap(), cmd);
    }
}
