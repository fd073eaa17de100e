//! The frames exchanged on the two TCP ports.
//!
//! Requests and responses travel on the request-response port,
//! notifications on the notify port. Everything is a single-line JSON
//! object; see [`crate::framing`] for the framing itself.

use std::fmt::Display;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    device::{Address64, NodeInfo},
    error::Error,
};

/// The `type` field carried by every frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    /// A client-to-server request.
    Request,

    /// A server-to-client answer to one request.
    Response,

    /// An unsolicited server-to-subscriber message.
    Notify,
}

/// Bytes which travel base64-encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct B64Bytes(
    /// The decoded bytes.
    pub Vec<u8>,
);

impl From<Vec<u8>> for B64Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for B64Bytes {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl Serialize for B64Bytes {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for B64Bytes {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;

        BASE64
            .decode(s.as_bytes())
            .map(Self)
            .map_err(|e| serde::de::Error::custom(format!("invalid base64: {e}")))
    }
}

/// A request frame as it appears on the wire.
///
/// The `name`/`data` pair is kept raw here so that a request naming an
/// unknown command can still be answered with an error response echoing
/// that name; [`Operation::from_request`] does the typed parse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    /// Always [`FrameKind::Request`].
    #[serde(rename = "type")]
    pub frame: FrameKind,

    /// The command name.
    pub name: String,

    /// The command arguments, if the command takes any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Request {
    /// A request with no data.
    pub fn new(name: &str) -> Self {
        Self {
            frame: FrameKind::Request,
            name: name.into(),
            data: None,
        }
    }

    /// A request with data.
    pub fn with_data(name: &str, data: impl Serialize) -> Self {
        Self {
            frame: FrameKind::Request,
            name: name.into(),
            data: Some(serde_json::to_value(data).expect("Data should serialize")),
        }
    }

    /// Turn a request into serialized json.
    pub fn serialize(&self) -> String {
        serde_json::to_string(self).expect("Should serialize well")
    }

    /// An example discovery request.
    pub fn example_discover() -> Self {
        Self::new("discover")
    }

    /// An example send request.
    pub fn example_send() -> Self {
        Self::with_data(
            "send",
            SendArgs {
                address64: "0013A200418D05FC".into(),
                message: b"ping".as_slice().into(),
            },
        )
    }
}

impl Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Arguments of a `send` request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendArgs {
    /// The destination node, 16 hex digits.
    ///
    /// Kept as a string: parsing happens on the device worker so that a
    /// malformed address is reported as a device failure, like any
    /// other problem with reaching the node.
    pub address64: String,

    /// The payload, base64 on the wire.
    pub message: B64Bytes,
}

/// Arguments shared by the three AT parameter commands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AtArgs {
    /// The target node, 16 hex digits. See [`SendArgs::address64`].
    pub address64: String,

    /// The two-letter AT command, e.g. `NI` or `D0`.
    pub at_command: String,

    /// The parameter value, if the command takes one.
    #[serde(default)]
    pub value: Option<B64Bytes>,

    /// Whether the node should apply the change immediately.
    pub apply_changes: bool,
}

/// Arguments of a `wait` request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WaitArgs {
    /// How long to stall the device worker, in seconds.
    pub time: f64,
}

/// Every command the device worker executes.
///
/// This set is closed: a request whose name falls outside it never
/// reaches the worker and is answered with an
/// [`Error::UnrecognizedCommand`] response instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "name", content = "data", rename_all = "snake_case")]
pub enum Operation {
    /// Enumerate every reachable node.
    Discover,

    /// Transmit a payload to one node.
    Send(SendArgs),

    /// Read an AT parameter.
    GetParameter(AtArgs),

    /// Write an AT parameter.
    SetParameter(AtArgs),

    /// Execute an AT command.
    ExecuteCommand(AtArgs),

    /// Stall the worker for a caller-chosen duration.
    ///
    /// Everything queued behind it waits too; that head-of-line
    /// blocking is the documented cost of strict FIFO serialization.
    Wait(WaitArgs),

    /// Terminate the device worker loop.
    Stop,
}

impl Operation {
    /// The wire names of every recognized command.
    pub const NAMES: [&'static str; 7] = [
        "discover",
        "send",
        "get_parameter",
        "set_parameter",
        "execute_command",
        "wait",
        "stop",
    ];

    /// The wire name of this command.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Operation::Discover => "discover",
            Operation::Send(_) => "send",
            Operation::GetParameter(_) => "get_parameter",
            Operation::SetParameter(_) => "set_parameter",
            Operation::ExecuteCommand(_) => "execute_command",
            Operation::Wait(_) => "wait",
            Operation::Stop => "stop",
        }
    }

    /// The typed command named by a [`Request`].
    pub fn from_request(request: &Request) -> Result<Self, Error> {
        if !Self::NAMES.contains(&request.name.as_str()) {
            return Err(Error::UnrecognizedCommand(request.name.clone()));
        }

        let mut tagged = serde_json::Map::new();
        tagged.insert("name".into(), Value::String(request.name.clone()));
        if let Some(data) = &request.data {
            tagged.insert("data".into(), data.clone());
        }

        serde_json::from_value(Value::Object(tagged)).map_err(|e| Error::BadRequest {
            request: request.serialize(),
            problem: e.to_string(),
        })
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

/// The `status` field of a response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The command succeeded.
    Ok,

    /// The command failed; `message` says why.
    Error,
}

/// A response frame as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    /// Always [`FrameKind::Response`].
    #[serde(rename = "type")]
    pub frame: FrameKind,

    /// Whether the command succeeded.
    pub status: Status,

    /// The name of the originating command, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// The result payload. Present exactly on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// A human-readable failure description. Present exactly on error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Response {
    /// A success response for the named command.
    pub fn ok(name: &str, data: impl Serialize) -> Self {
        Self {
            frame: FrameKind::Response,
            status: Status::Ok,
            name: Some(name.into()),
            data: Some(serde_json::to_value(data).expect("Result data should serialize")),
            message: None,
        }
    }

    /// An error response; `name` is echoed when the request carried one.
    pub fn error(name: Option<&str>, message: impl Display) -> Self {
        Self {
            frame: FrameKind::Response,
            status: Status::Error,
            name: name.map(Into::into),
            data: None,
            message: Some(message.to_string()),
        }
    }

    /// The error response synthesized when no answer arrived within the
    /// queue timeout.
    pub fn timed_out(name: Option<&str>) -> Self {
        Self::error(name, Error::QueueTimeout)
    }

    /// Whether this is a success response.
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// The success payload, deserialized.
    pub fn data_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, Error> {
        let data = self.data.clone().unwrap_or(Value::Null);

        serde_json::from_value(data).map_err(|e| Error::MessageParse(e.to_string()))
    }

    /// An example response to a successful discovery.
    pub fn example_discover_ok() -> Self {
        use crate::device::{Address16, Role};

        Self::ok(
            "discover",
            DiscoverData {
                devices: vec![NodeInfo {
                    address64: Address64(0x0013_A200_418D_05FC),
                    address16: Address16(0xD9A1),
                    id: "SENSOR-1".into(),
                    role: Role::Router,
                }],
            },
        )
    }
}

impl Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self.name.as_deref().unwrap_or("<unnamed>");
        match self.status {
            Status::Ok => write!(f, "{name}: ok"),
            Status::Error => write!(
                f,
                "{name}: error: {}",
                self.message.as_deref().unwrap_or("<no message>")
            ),
        }
    }
}

/// Success payload of `discover`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoverData {
    /// Every node the discovery found.
    pub devices: Vec<NodeInfo>,
}

/// Success payload of the three AT parameter commands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AtResultData {
    /// The returned parameter value; `null` when the command returns
    /// nothing (e.g. a plain `set_parameter`).
    pub result: Option<B64Bytes>,
}

/// Success payload of `wait`, echoing the requested duration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WaitData {
    /// The stalled duration, in seconds.
    pub time: f64,
}

/// The `name` field of a notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationName {
    /// A node sent us data.
    Receive,
}

/// Payload of a `receive` notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReceiveData {
    /// The sending node.
    pub address64: Address64,

    /// The received bytes, base64 on the wire.
    pub message: B64Bytes,
}

/// A notification frame as it appears on the wire.
///
/// Produced only by the device worker's inbound-message callback,
/// never in response to any request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    /// Always [`FrameKind::Notify`].
    #[serde(rename = "type")]
    pub frame: FrameKind,

    /// What kind of notification this is.
    pub name: NotificationName,

    /// The notification payload.
    pub data: ReceiveData,
}

impl Notification {
    /// The notification for a message received from `from`.
    pub fn receive(from: Address64, payload: Vec<u8>) -> Self {
        Self {
            frame: FrameKind::Notify,
            name: NotificationName::Receive,
            data: ReceiveData {
                address64: from,
                message: payload.into(),
            },
        }
    }

    /// An example notification.
    pub fn example() -> Self {
        Self::receive(Address64(0x0013_A200_418D_05FC), b"ping".to_vec())
    }
}
