// Inbound commands: typed verbs plus parsing from the string transport

use crate::{BridgeError, PeerId, PermissionSnapshot, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Primitive argument value carried by the command transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl ArgValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ArgValue::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::Str(value.to_string())
    }
}

impl From<Vec<u8>> for ArgValue {
    fn from(value: Vec<u8>) -> Self {
        ArgValue::Bytes(value)
    }
}

pub type Arguments = HashMap<String, ArgValue>;

/// Optional arguments of the start verbs; `None` means "use the default"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartOptions {
    pub display_name: Option<String>,
    pub service_type: Option<String>,
}

impl StartOptions {
    pub fn new(display_name: impl Into<String>, service_type: impl Into<String>) -> Self {
        Self {
            display_name: Some(display_name.into()),
            service_type: Some(service_type.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartAdvertising(StartOptions),
    StartBrowsing(StartOptions),
    Stop,
    SendData { bytes: Vec<u8> },
    InvitePeer { peer_id: PeerId },
    RequestRadioPermission,
    RequestLocationPermission,
    TriggerTransientAdvertise,
    GetPermissionSnapshot,
}

impl Command {
    /// Parse a `{verb, arguments}` request into a typed command.
    ///
    /// Required arguments that are missing or mistyped yield
    /// `InvalidArgument`; unknown verbs yield `UnsupportedOperation`.
    /// Optional arguments of the wrong type are treated as absent.
    pub fn parse(verb: &str, args: &Arguments) -> Result<Self> {
        match verb {
            "startAdvertising" => Ok(Command::StartAdvertising(start_options(args))),
            "startBrowsing" => Ok(Command::StartBrowsing(start_options(args))),
            "stop" => Ok(Command::Stop),
            "sendData" => args
                .get("data")
                .and_then(ArgValue::as_bytes)
                .map(|bytes| Command::SendData {
                    bytes: bytes.to_vec(),
                })
                .ok_or_else(|| BridgeError::InvalidArgument("No data".to_string())),
            "invitePeer" => args
                .get("peerId")
                .and_then(ArgValue::as_str)
                .map(|peer| Command::InvitePeer {
                    peer_id: peer.to_string(),
                })
                .ok_or_else(|| BridgeError::InvalidArgument("peerId required".to_string())),
            "requestRadioPermission" => Ok(Command::RequestRadioPermission),
            "requestLocationPermission" => Ok(Command::RequestLocationPermission),
            "triggerTransientAdvertise" => Ok(Command::TriggerTransientAdvertise),
            "getPermissionSnapshot" => Ok(Command::GetPermissionSnapshot),
            other => Err(BridgeError::UnsupportedOperation(other.to_string())),
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Command::StartAdvertising(_) => "startAdvertising",
            Command::StartBrowsing(_) => "startBrowsing",
            Command::Stop => "stop",
            Command::SendData { .. } => "sendData",
            Command::InvitePeer { .. } => "invitePeer",
            Command::RequestRadioPermission => "requestRadioPermission",
            Command::RequestLocationPermission => "requestLocationPermission",
            Command::TriggerTransientAdvertise => "triggerTransientAdvertise",
            Command::GetPermissionSnapshot => "getPermissionSnapshot",
        }
    }
}

fn start_options(args: &Arguments) -> StartOptions {
    let text = |key: &str| {
        args.get(key)
            .and_then(ArgValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    StartOptions {
        display_name: text("displayName"),
        service_type: text("serviceType"),
    }
}

/// Successful command acknowledgement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Ack {
    /// Serialises as `null`
    Done,
    Snapshot(PermissionSnapshot),
}
