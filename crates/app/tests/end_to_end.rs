use std::collections::BTreeSet;
use std::sync::Arc;

use checkin_app::{build_services, AppConfig, CheckinServices};
use checkin_building::{
    event_types, BuildingId, CheckUserIntoBuilding, CheckUserOutOfBuilding,
    NotifyAdministratorWhenUserCheckedInMultipleTimes, RegisterNewBuilding,
};
use checkin_core::DomainError;
use checkin_events::ProcessManagerListener;
use checkin_infra::handlers::RegisterNewBuildingHandler;
use checkin_infra::workers::Delivery;
use checkin_infra::{
    CommandBus, DispatchError, EventLog, InMemoryEventLog, RecordingAnomalyNotifier, RegistryError,
    RepositoryError,
};

fn services() -> (CheckinServices, Arc<RecordingAnomalyNotifier>) {
    let notifier = Arc::new(RecordingAnomalyNotifier::new());
    let services = build_services(&AppConfig::default(), notifier.clone()).unwrap();
    (services, notifier)
}

fn users(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn event_types_in_log(services: &CheckinServices) -> Vec<String> {
    services
        .log
        .read_all()
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect()
}

fn register(services: &CheckinServices, name: &str) -> BuildingId {
    let building_id = BuildingId::generate();
    services
        .bus
        .dispatch(&RegisterNewBuilding {
            building_id,
            name: name.to_string(),
        })
        .unwrap();
    building_id
}

#[test]
fn double_check_in_is_flagged_and_reported_once() {
    let (services, notifier) = services();
    let building_id = register(&services, "B1");
    let check_in = CheckUserIntoBuilding {
        building_id,
        username: "fritz".to_string(),
    };

    services.bus.dispatch(&check_in).unwrap();
    assert_eq!(services.checked_in_users.checked_in(building_id).unwrap(), users(&["fritz"]));
    assert!(notifier.sent().is_empty());

    let events = services.bus.dispatch(&check_in).unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type()).collect();
    assert_eq!(
        types,
        vec![event_types::USER_CHECKED_IN, event_types::CHECK_IN_ANOMALY_DETECTED]
    );
    assert_eq!(services.checked_in_users.checked_in(building_id).unwrap(), users(&["fritz"]));
    assert_eq!(notifier.sent(), vec![("fritz".to_string(), building_id)]);

    services
        .bus
        .dispatch(&CheckUserOutOfBuilding {
            building_id,
            username: "fritz".to_string(),
        })
        .unwrap();
    assert!(services.checked_in_users.checked_in(building_id).unwrap().is_empty());
    assert_eq!(notifier.sent().len(), 1);

    assert_eq!(
        event_types_in_log(&services),
        vec![
            event_types::BUILDING_REGISTERED,
            event_types::USER_CHECKED_IN,
            event_types::USER_CHECKED_IN,
            event_types::CHECK_IN_ANOMALY_DETECTED,
            event_types::USER_CHECKED_OUT,
        ]
    );
    assert_eq!(services.log.stream_version(building_id.0).unwrap(), Some(4));
}

#[test]
fn unauthorized_check_in_leaves_no_trace() {
    let (services, notifier) = services();
    let building_id = register(&services, "B1");

    let err = services
        .bus
        .dispatch(&CheckUserIntoBuilding {
            building_id,
            username: "mallory".to_string(),
        })
        .unwrap_err();

    assert!(matches!(
        err,
        DispatchError::Domain(DomainError::Unauthorized { ref username }) if username == "mallory"
    ));
    assert_eq!(event_types_in_log(&services), vec![event_types::BUILDING_REGISTERED]);
    assert!(services.checked_in_users.checked_in(building_id).unwrap().is_empty());
    assert!(notifier.sent().is_empty());
}

#[test]
fn commands_against_unknown_buildings_fail() {
    let (services, _) = services();

    let err = services
        .bus
        .dispatch(&CheckUserIntoBuilding {
            building_id: BuildingId::generate(),
            username: "fritz".to_string(),
        })
        .unwrap_err();

    assert!(matches!(
        err,
        DispatchError::Repository(RepositoryError::AggregateNotFound { .. })
    ));
    assert!(services.log.is_empty());
}

#[test]
fn check_out_of_absent_user_is_rejected() {
    let (services, _) = services();
    let building_id = register(&services, "B1");

    let err = services
        .bus
        .dispatch(&CheckUserOutOfBuilding {
            building_id,
            username: "otto".to_string(),
        })
        .unwrap_err();

    assert!(matches!(err, DispatchError::Domain(DomainError::NotCheckedIn { .. })));
    assert_eq!(services.log.len(), 1);
}

#[test]
fn deferred_commands_reach_the_read_model_through_the_consumer() {
    let (services, notifier) = services();
    let building_id = register(&services, "B1");

    for username in ["fritz", "otto", "fritz"] {
        services
            .deferred
            .dispatch(&CheckUserIntoBuilding {
                building_id,
                username: username.to_string(),
            })
            .unwrap();
    }

    // Nothing runs until the consumer picks the commands up.
    assert_eq!(services.log.len(), 1);
    assert!(services.checked_in_users.checked_in(building_id).unwrap().is_empty());

    let consumer = services.consumer();
    assert_eq!(consumer.run_until_idle().unwrap(), 3);

    assert_eq!(
        services.checked_in_users.checked_in(building_id).unwrap(),
        users(&["fritz", "otto"])
    );
    assert_eq!(notifier.sent(), vec![("fritz".to_string(), building_id)]);
    assert_eq!(consumer.stats().commands_succeeded, 3);
    assert!(consumer.dead_letters().is_empty());
    assert_eq!(services.queue.in_flight(), 0);
}

#[test]
fn rejected_deferred_command_is_dead_lettered() {
    let (services, _) = services();
    let building_id = register(&services, "B1");

    services
        .deferred
        .dispatch(&CheckUserIntoBuilding {
            building_id,
            username: "mallory".to_string(),
        })
        .unwrap();

    let consumer = services.consumer();
    assert_eq!(
        consumer.run_once(std::time::Duration::ZERO).unwrap(),
        Delivery::DeadLettered
    );
    let dead = consumer.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].command.command_type(), "building.check_user_in");
}

#[test]
fn rebuilt_read_model_matches_live_view() {
    let (services, _) = services();
    let b1 = register(&services, "B1");
    let b2 = register(&services, "B2");

    for (building_id, username) in [(b1, "fritz"), (b1, "franz"), (b2, "otto"), (b1, "fritz")] {
        services
            .bus
            .dispatch(&CheckUserIntoBuilding {
                building_id,
                username: username.to_string(),
            })
            .unwrap();
    }
    services
        .bus
        .dispatch(&CheckUserOutOfBuilding {
            building_id: b1,
            username: "franz".to_string(),
        })
        .unwrap();

    let live_b1 = services.checked_in_users.checked_in(b1).unwrap();
    let live_b2 = services.checked_in_users.checked_in(b2).unwrap();
    assert_eq!(live_b1, users(&["fritz"]));
    assert_eq!(live_b2, users(&["otto"]));

    let replayed = services.rebuild_read_model().unwrap();
    assert_eq!(replayed, services.log.len());
    let mut expected = vec![b1, b2];
    expected.sort();
    assert_eq!(services.checked_in_users.buildings().unwrap(), expected);
    assert_eq!(services.checked_in_users.checked_in(b1).unwrap(), live_b1);
    assert_eq!(services.checked_in_users.checked_in(b2).unwrap(), live_b2);
}

#[test]
fn listener_without_handler_for_its_command_is_rejected_at_build() {
    let err = CommandBus::builder(Arc::new(InMemoryEventLog::new()))
        .handler::<RegisterNewBuilding, _>(RegisterNewBuildingHandler)
        .listener(Arc::new(ProcessManagerListener::new(
            NotifyAdministratorWhenUserCheckedInMultipleTimes,
        )))
        .build()
        .unwrap_err();

    assert!(matches!(
        err,
        RegistryError::MissingHandler {
            command_type: "building.notify_administrator_of_multiple_check_in_anomaly",
            ..
        }
    ));
}

#[test]
fn reentrancy_limit_of_zero_blocks_listener_dispatch() {
    let notifier = Arc::new(RecordingAnomalyNotifier::new());
    let config = AppConfig {
        max_reentrancy_depth: 0,
        ..AppConfig::default()
    };
    let services = build_services(&config, notifier.clone()).unwrap();
    let building_id = register(&services, "B1");
    let check_in = CheckUserIntoBuilding {
        building_id,
        username: "fritz".to_string(),
    };
    services.bus.dispatch(&check_in).unwrap();

    let err = services.bus.dispatch(&check_in).unwrap_err();

    assert!(err.is_after_commit());
    assert!(matches!(err.root(), DispatchError::ReentrancyLimit { max_depth: 0, .. }));
    // The outer transaction is already committed.
    assert_eq!(services.log.len(), 4);
    assert!(notifier.sent().is_empty());
}
