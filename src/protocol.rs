//! Wire payload types for the control and event channels.
//!
//! Both channels carry UTF-8 JSON, one object per message. Outbound traffic
//! is the tagged [`Command`] set; inbound traffic is classified once by
//! [`Inbound::decode`] into a status reply, a plain acknowledgement, a frame
//! event, or an explicitly unrecognized payload. Nothing downstream touches
//! raw JSON maps.

use bytes::Bytes;
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{LinkError, Result};

/// Request sent on the control channel.
///
/// Serializes to the device's `{"command": ...}` shape. At most one command
/// is in flight at a time; the protocol has no correlation IDs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Status,
    Configure { params: ConfigureParams },
    Reset,
    ClearError,
    Singleshot,
    Shutdown,
}

impl Command {
    /// Command name as it appears on the wire, for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Status => "status",
            Command::Configure { .. } => "configure",
            Command::Reset => "reset",
            Command::ClearError => "clear_error",
            Command::Singleshot => "singleshot",
            Command::Shutdown => "shutdown",
        }
    }

    /// Serialize the command to its wire payload.
    pub fn encode(&self) -> Result<Bytes> {
        let payload = serde_json::to_vec(self)
            .map_err(|e| LinkError::protocol("command encode", e.to_string()))?;
        Ok(Bytes::from(payload))
    }
}

/// Parameters of a `configure` command.
///
/// Every field is optional; unset fields are omitted from the JSON so a
/// configure request only mentions what it changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfigureParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub attenuation: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub shutter_closed_position: Option<f64>,

    /// Histogram pixel-count thresholds keyed `high1`..`high3`, `low1`,
    /// `low2`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pixel_count_thresholds: Option<BTreeMap<String, u64>>,

    /// In-beam positions keyed `filter1`..`filterN`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_positions: Option<BTreeMap<String, f64>>,

    /// Out-of-beam positions keyed `filter1`..`filterN`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_positions: Option<BTreeMap<String, f64>>,
}

impl ConfigureParams {
    /// Parameters selecting an operating mode.
    pub fn mode(mode: u8) -> Self {
        Self { mode: Some(mode), ..Self::default() }
    }

    /// Parameters setting a manual attenuation level.
    pub fn attenuation(level: i32) -> Self {
        Self { attenuation: Some(level), ..Self::default() }
    }

    /// Parameters setting the device-side frame timeout.
    pub fn timeout(secs: f64) -> Self {
        Self { timeout: Some(secs), ..Self::default() }
    }
}

/// Decoded status reply from the control channel.
///
/// Transient; a fresh record is built from every reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Device state code. Negative values are fault states.
    pub state: i32,
    #[serde(default)]
    pub version: String,
    pub process_duration: f64,
    pub process_period: f64,
    pub last_received_frame: i64,
    pub last_processed_frame: i64,
    pub time_since_last_message: f64,
    pub current_attenuation: i32,
}

/// Plain acknowledgement reply to a non-status command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckRecord {
    pub success: bool,
}

/// Decoded per-frame event from the event channel.
///
/// Values are recorded verbatim; this layer performs no range validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub frame_number: u64,
    pub adjustment: i64,
    pub attenuation: i64,
    pub uid: i64,
    #[serde(deserialize_with = "bool_from_int", serialize_with = "int_from_bool")]
    pub filters_moving: bool,
}

/// Classified inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// `{"success": ..., "status": {...}}` reply to a status probe.
    Status { success: bool, status: StatusRecord },
    /// `{"success": ...}` reply to any other command.
    Ack(AckRecord),
    /// Per-frame event message.
    Frame(FrameRecord),
    /// Well-formed JSON of a shape this protocol does not know.
    Unrecognized(serde_json::Value),
}

impl Inbound {
    /// Classify one wire message.
    ///
    /// The shape is picked from the discriminating key (`status`,
    /// `frame_number`, `success`), then decoded strictly; a payload that
    /// names a known shape but fails to decode as it is an error, not an
    /// `Unrecognized`.
    pub fn decode(payload: &[u8]) -> Result<Inbound> {
        let value: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| LinkError::protocol("payload decode", e.to_string()))?;

        if value.get("status").is_some() {
            let reply: StatusReply = serde_json::from_value(value)
                .map_err(|e| LinkError::protocol("status reply", e.to_string()))?;
            return Ok(Inbound::Status { success: reply.success, status: reply.status });
        }

        if value.get("frame_number").is_some() {
            let frame: FrameRecord = serde_json::from_value(value)
                .map_err(|e| LinkError::protocol("frame event", e.to_string()))?;
            return Ok(Inbound::Frame(frame));
        }

        if value.get("success").is_some() {
            let ack: AckRecord = serde_json::from_value(value)
                .map_err(|e| LinkError::protocol("acknowledgement", e.to_string()))?;
            return Ok(Inbound::Ack(ack));
        }

        Ok(Inbound::Unrecognized(value))
    }
}

#[derive(Deserialize)]
struct StatusReply {
    #[serde(default = "default_true")]
    success: bool,
    status: StatusRecord,
}

fn default_true() -> bool {
    true
}

/// The device publishes `filters_moving` as `0|1`; some firmware revisions
/// send a real boolean.
fn bool_from_int<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrBool {
        Int(i64),
        Bool(bool),
    }
    match IntOrBool::deserialize(deserializer)? {
        IntOrBool::Int(value) => Ok(value != 0),
        IntOrBool::Bool(value) => Ok(value),
    }
}

fn int_from_bool<S: Serializer>(value: &bool, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*value))
}
