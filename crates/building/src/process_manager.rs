//! Reaction to check-in anomalies.

use checkin_core::AggregateId;
use checkin_events::ProcessManager;

use crate::building::{event_types, BuildingEvent};
use crate::commands::NotifyAdministratorOfMultipleCheckInAnomaly;

/// Turns every `CheckInAnomalyDetected` into exactly one notification command.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifyAdministratorWhenUserCheckedInMultipleTimes;

const TRIGGERS: [&str; 1] = [event_types::CHECK_IN_ANOMALY_DETECTED];

impl ProcessManager for NotifyAdministratorWhenUserCheckedInMultipleTimes {
    type Event = BuildingEvent;
    type Command = NotifyAdministratorOfMultipleCheckInAnomaly;

    fn name(&self) -> &'static str {
        "notify_administrator_when_user_checked_in_multiple_times"
    }

    fn triggers(&self) -> &[&'static str] {
        &TRIGGERS
    }

    fn react(&self, _stream_id: AggregateId, event: BuildingEvent) -> Vec<Self::Command> {
        match event {
            BuildingEvent::CheckInAnomalyDetected(anomaly) => {
                vec![NotifyAdministratorOfMultipleCheckInAnomaly {
                    building_id: anomaly.building_id,
                    username: anomaly.username.as_str().to_string(),
                }]
            }
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use checkin_core::Aggregate;
    use checkin_events::{Command, EventEnvelope, Listener, ProcessManagerListener};

    use super::*;
    use crate::building::{Building, BuildingId, CheckInAnomalyDetected, UserCheckedIn, Username};
    use checkin_events::Event;

    fn envelope(event: &BuildingEvent, sequence: u64) -> EventEnvelope<serde_json::Value> {
        let stream_id = match event {
            BuildingEvent::CheckInAnomalyDetected(e) => e.building_id.0,
            BuildingEvent::UserCheckedIn(e) => e.building_id.0,
            _ => AggregateId::new(),
        };
        EventEnvelope::new(
            Uuid::now_v7(),
            stream_id,
            Building::AGGREGATE_TYPE,
            sequence,
            event.event_type(),
            Utc::now(),
            serde_json::to_value(event).unwrap(),
        )
    }

    #[test]
    fn anomaly_emits_one_notification() {
        let building_id = BuildingId::generate();
        let anomaly = BuildingEvent::CheckInAnomalyDetected(CheckInAnomalyDetected {
            building_id,
            username: Username::new("fritz"),
        });

        let listener = ProcessManagerListener::new(NotifyAdministratorWhenUserCheckedInMultipleTimes);
        let commands = listener.handle(&envelope(&anomaly, 3)).unwrap();

        assert_eq!(commands.len(), 1);
        let notify = commands[0]
            .decode::<NotifyAdministratorOfMultipleCheckInAnomaly>()
            .unwrap();
        assert_eq!(notify.building_id, building_id);
        assert_eq!(notify.username, "fritz");
    }

    #[test]
    fn declares_what_it_listens_to_and_emits() {
        let listener = ProcessManagerListener::new(NotifyAdministratorWhenUserCheckedInMultipleTimes);
        assert_eq!(listener.event_types(), &[event_types::CHECK_IN_ANOMALY_DETECTED]);
        assert_eq!(
            listener.emits(),
            &[NotifyAdministratorOfMultipleCheckInAnomaly::COMMAND_TYPE]
        );
    }

    #[test]
    fn other_events_emit_nothing() {
        let checked_in = BuildingEvent::UserCheckedIn(UserCheckedIn {
            building_id: BuildingId::generate(),
            username: Username::new("otto"),
        });
        let listener = ProcessManagerListener::new(NotifyAdministratorWhenUserCheckedInMultipleTimes);
        assert!(listener.handle(&envelope(&checked_in, 1)).unwrap().is_empty());
    }
}
