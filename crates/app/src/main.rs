use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use checkin_app::{build_services, AppConfig};
use checkin_building::{BuildingId, CheckUserIntoBuilding, CheckUserOutOfBuilding, RegisterNewBuilding};
use checkin_infra::TracingAnomalyNotifier;

fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    checkin_observability::init(config.log_format);

    let services = build_services(&config, Arc::new(TracingAnomalyNotifier))
        .context("command registry is inconsistent")?;

    let building_id = BuildingId::generate();
    services.bus.dispatch(&RegisterNewBuilding {
        building_id,
        name: "B1".to_string(),
    })?;

    let check_in_fritz = CheckUserIntoBuilding {
        building_id,
        username: "fritz".to_string(),
    };
    services.bus.dispatch(&check_in_fritz)?;
    // Second check-in: recorded, flagged, administrator notified.
    services.bus.dispatch(&check_in_fritz)?;

    // Deferred path: queued now, executed by the consumer thread.
    let consumer = services.spawn_consumer().context("failed to start command consumer")?;
    services.deferred.dispatch(&CheckUserIntoBuilding {
        building_id,
        username: "otto".to_string(),
    })?;
    services.deferred.dispatch(&CheckUserOutOfBuilding {
        building_id,
        username: "fritz".to_string(),
    })?;

    services.queue.close();
    let stats = consumer.wait();
    info!(?stats, "deferred commands drained");

    let users = services.checked_in_users.checked_in(building_id)?;
    info!(%building_id, ?users, "checked-in users");

    let replayed = services.rebuild_read_model()?;
    let rebuilt = services.checked_in_users.checked_in(building_id)?;
    info!(%building_id, replayed, users = ?rebuilt, "read model rebuilt from log");

    Ok(())
}
