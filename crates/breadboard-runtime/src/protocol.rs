//! Messages exchanged between the host and a background worker.
//!
//! In-process workers pass these values over channels directly. The JSON
//! codec produces the `{"type": ..., "payload": ...}` shape for workers on
//! the far side of a serialized boundary.

use breadboard_core::command_queue::ScheduledCommand;
use breadboard_core::event::{EventKind, SimEvent};
use breadboard_core::sim::SimState;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Host to worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum HostMessage {
    /// Hand the worker its own copy of the state. Sent once per worker.
    Init {
        state: SimState,
        seed: u64,
        enable_profiler: bool,
    },
    Play,
    /// Stop ticking and flush a STATE message.
    Pause,
    /// Renderer edits and stimuli, applied on their scheduled tick.
    Command { commands: Vec<ScheduledCommand> },
    /// Exit the worker loop.
    Stop,
}

/// Worker to host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum WorkerMessage {
    State { state: SimState },
    /// A short circuit or generic warning raised inside the worker.
    Warning(SimEvent),
    Error { message: String },
    /// Every other event, batched per tick.
    Events { events: Vec<SimEvent> },
}

/// Whether `event` travels in its own WARNING message rather than in an
/// EVENTS batch.
pub fn is_warning(event: &SimEvent) -> bool {
    matches!(event.kind(), EventKind::ShortCircuit | EventKind::Warning)
}

impl WorkerMessage {
    pub fn type_name(&self) -> &'static str {
        match self {
            WorkerMessage::State { .. } => "STATE",
            WorkerMessage::Warning(_) => "WARNING",
            WorkerMessage::Error { .. } => "ERROR",
            WorkerMessage::Events { .. } => "EVENTS",
        }
    }
}

pub fn encode<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

pub fn decode<T: DeserializeOwned>(json: &str) -> Result<T, ProtocolError> {
    Ok(serde_json::from_str(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use breadboard_core::command_queue::Command;
    use breadboard_core::test_utils::*;
    use serde_json::{Value, json};

    fn to_value<T: Serialize>(m: &T) -> Value {
        serde_json::from_str(&encode(m).unwrap()).unwrap()
    }

    #[test]
    fn init_has_camel_case_payload() {
        let state = led_circuit().into_state(9);
        let v = to_value(&HostMessage::Init {
            state: state.clone(),
            seed: 9,
            enable_profiler: true,
        });
        assert_eq!(v["type"], "INIT");
        assert_eq!(v["payload"]["seed"], 9);
        assert_eq!(v["payload"]["enableProfiler"], true);
        assert!(v["payload"]["state"]["components"].is_array());
    }

    #[test]
    fn control_messages_have_no_payload() {
        assert_eq!(to_value(&HostMessage::Play), json!({"type": "PLAY"}));
        assert_eq!(to_value(&HostMessage::Pause), json!({"type": "PAUSE"}));
        assert_eq!(decode::<HostMessage>(r#"{"type":"PLAY"}"#).unwrap(), HostMessage::Play);
    }

    #[test]
    fn worker_messages_decode_back() {
        let state = led_circuit().into_state(1);
        let messages = vec![
            WorkerMessage::State { state },
            WorkerMessage::Warning(SimEvent::warning("careful", 4)),
            WorkerMessage::Error {
                message: "boom".into(),
            },
        ];
        for m in messages {
            let json = encode(&m).unwrap();
            assert_eq!(decode::<WorkerMessage>(&json).unwrap(), m, "{}", m.type_name());
        }
    }

    #[test]
    fn warning_payload_is_the_event() {
        let v = to_value(&WorkerMessage::Warning(SimEvent::warning("careful", 4)));
        assert_eq!(v["type"], "WARNING");
        assert_eq!(v["payload"]["kind"], "warning");
        assert_eq!(v["payload"]["message"], "careful");
    }

    #[test]
    fn commands_cross_the_boundary() {
        let m = HostMessage::Command {
            commands: vec![ScheduledCommand::at(3, Command::SetRunning { running: false })],
        };
        let json = encode(&m).unwrap();
        assert_eq!(decode::<HostMessage>(&json).unwrap(), m);
    }

    #[test]
    fn warnings_and_shorts_travel_as_warnings() {
        assert!(is_warning(&SimEvent::warning("x", 0)));
        assert!(!is_warning(&SimEvent::ServoAngleSet {
            component: "servo-1".into(),
            angle: fixed(10.0),
            tick: 0,
        }));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode::<HostMessage>(r#"{"type":"DANCE"}"#).is_err());
        assert!(decode::<HostMessage>("not json").is_err());
    }
}
