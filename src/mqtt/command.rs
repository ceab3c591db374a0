//! Actuator commands and their wire encoding
//!
//! Every command lands on `hydrobox/actuators/{device_id}/set` with a JSON body
//! holding exactly one key. Encoding is pure: the same command always yields the
//! same bytes, and out-of-contract values are rejected here, before anything
//! touches the network.

use serde::Serialize;
use std::fmt;

use super::error::CommandError;

pub const TOPIC_ROOT: &str = "hydrobox/actuators";

/// An intent to act on one actuator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetSwitch { device_id: String, on: bool },
    SetDose { device_id: String, milliliters: i64 },
}

impl Command {
    pub fn switch(device_id: impl Into<String>, on: bool) -> Self {
        Command::SetSwitch {
            device_id: device_id.into(),
            on,
        }
    }

    pub fn dose(device_id: impl Into<String>, milliliters: i64) -> Self {
        Command::SetDose {
            device_id: device_id.into(),
            milliliters,
        }
    }

    pub fn device_id(&self) -> &str {
        match self {
            Command::SetSwitch { device_id, .. } | Command::SetDose { device_id, .. } => device_id,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Command::SetSwitch { device_id, on } => {
                write!(f, "{} -> {}", device_id, if *on { "ON" } else { "OFF" })
            }
            Command::SetDose {
                device_id,
                milliliters,
            } => write!(f, "{} -> dose {} ml", device_id, milliliters),
        }
    }
}

/// Topic and payload ready to hand to the publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCommand {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl EncodedCommand {
    pub fn payload_str(&self) -> &str {
        std::str::from_utf8(&self.payload).unwrap_or("<binary>")
    }
}

#[derive(Serialize)]
struct SwitchPayload {
    on: bool,
}

#[derive(Serialize)]
struct DosePayload {
    dose_ml: i64,
}

pub fn actuator_topic(device_id: &str) -> String {
    format!("{}/{}/set", TOPIC_ROOT, device_id)
}

/// Translates a command into its topic and JSON payload.
pub fn encode(command: &Command) -> Result<EncodedCommand, CommandError> {
    let device_id = command.device_id();
    validate_device_id(device_id)?;

    let payload = match command {
        Command::SetSwitch { on, .. } => serde_json::to_vec(&SwitchPayload { on: *on }),
        Command::SetDose { milliliters, .. } => {
            if *milliliters <= 0 {
                return Err(CommandError::InvalidCommand(format!(
                    "dose for '{}' must be a positive number of milliliters, got {}",
                    device_id, milliliters
                )));
            }
            serde_json::to_vec(&DosePayload {
                dose_ml: *milliliters,
            })
        }
    }
    .map_err(|e| CommandError::InvalidCommand(format!("payload encoding failed: {}", e)))?;

    Ok(EncodedCommand {
        topic: actuator_topic(device_id),
        payload,
    })
}

// A device id is a single topic level: no separators, no wildcards
fn validate_device_id(device_id: &str) -> Result<(), CommandError> {
    if device_id.is_empty() {
        return Err(CommandError::InvalidCommand("empty device id".to_string()));
    }
    if device_id.contains(|c| matches!(c, '/' | '+' | '#')) {
        return Err(CommandError::InvalidCommand(format!(
            "device id '{}' is not a single topic level",
            device_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_encodes_to_on_key_only() {
        let encoded = encode(&Command::switch("pump", true)).unwrap();
        assert_eq!(encoded.topic, "hydrobox/actuators/pump/set");
        assert_eq!(encoded.payload, br#"{"on":true}"#.to_vec());

        let encoded = encode(&Command::switch("fan", false)).unwrap();
        assert_eq!(encoded.topic, "hydrobox/actuators/fan/set");
        assert_eq!(encoded.payload_str(), r#"{"on":false}"#);
    }

    #[test]
    fn dose_encodes_to_dose_ml_key_only() {
        let encoded = encode(&Command::dose("doser_b", 12)).unwrap();
        assert_eq!(encoded.topic, "hydrobox/actuators/doser_b/set");
        assert_eq!(encoded.payload_str(), r#"{"dose_ml":12}"#);
    }

    #[test]
    fn encoding_is_deterministic() {
        let commands = [Command::switch("light", true), Command::dose("doser_a", 5)];
        for command in &commands {
            assert_eq!(encode(command).unwrap(), encode(command).unwrap());
        }
    }

    #[test]
    fn non_positive_doses_are_rejected() {
        for ml in [0, -5] {
            let err = encode(&Command::dose("doser_a", ml)).unwrap_err();
            assert!(matches!(err, CommandError::InvalidCommand(_)), "{ml} ml");
        }
    }

    #[test]
    fn device_ids_must_be_one_topic_level() {
        for id in ["", "pump/extra", "+", "#"] {
            assert!(encode(&Command::switch(id, true)).is_err(), "id {id:?}");
        }
    }
}
