//! The contract the coordinator driver must satisfy, plus the address
//! and node types shared between the driver and the wire protocol.
//!
//! The real driver wraps a blocking serial library, so the whole
//! contract is blocking; the device worker gives it a dedicated thread.

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The 64-bit address of a node, written as 16 hex digits on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address64(
    /// The raw address value.
    pub u64,
);

impl Display for Address64 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

impl FromStr for Address64 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 16 {
            return Err(Error::device(format!(
                "`{s}` is not a valid 64-bit address: expected 16 hex digits"
            )));
        }

        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| Error::device(format!("`{s}` is not a valid 64-bit address")))
    }
}

impl Serialize for Address64 {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address64 {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The 16-bit network address of a node, written as 4 hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address16(
    /// The raw address value.
    pub u16,
);

impl Display for Address16 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

impl Serialize for Address16 {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address16 {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;

        if s.len() != 4 {
            return Err(serde::de::Error::custom(format!(
                "`{s}` is not a valid 16-bit address: expected 4 hex digits"
            )));
        }

        u16::from_str_radix(&s, 16)
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

/// The role a node plays in the network.
///
/// On the wire this is the driver's description string, e.g.
/// `"End device"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The network coordinator. There is exactly one per network.
    Coordinator,

    /// A routing node.
    Router,

    /// A leaf node.
    EndDevice,

    /// The role could not be determined.
    Unknown,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Coordinator => write!(f, "Coordinator"),
            Role::Router => write!(f, "Router"),
            Role::EndDevice => write!(f, "End device"),
            Role::Unknown => write!(f, "Unknown"),
        }
    }
}

impl Serialize for Role {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;

        // Drivers may describe roles we do not know about.
        Ok(match s.as_str() {
            "Coordinator" => Role::Coordinator,
            "Router" => Role::Router,
            "End device" => Role::EndDevice,
            _ => Role::Unknown,
        })
    }
}

/// A node found during network discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// The node's unique 64-bit address.
    pub address64: Address64,

    /// The node's current 16-bit network address.
    pub address16: Address16,

    /// The node identifier string (the `NI` parameter).
    pub id: String,

    /// The node's [`Role`].
    pub role: Role,
}

/// A callback fired whenever the coordinator receives data from a node.
///
/// May be called from the driver's own reader thread at any time,
/// concurrently with command execution.
pub type InboundCallback = Box<dyn Fn(Address64, Vec<u8>) + Send + 'static>;

/// The operations the device worker needs from a coordinator driver.
///
/// Implementations are expected to block; the worker drives the link
/// from its own thread, one call at a time. [`MockLink`] implements
/// this for tests and hardware-free runs.
///
/// [`MockLink`]: crate::mock::MockLink
pub trait DeviceLink: Send {
    /// Open the connection to the coordinator.
    fn open(&mut self) -> Result<(), Error>;

    /// Close the connection. Called once when the worker shuts down.
    fn close(&mut self);

    /// Register the callback for asynchronously received messages.
    fn on_receive(&mut self, callback: InboundCallback);

    /// Run a network discovery and return every reachable node.
    fn discover(&mut self) -> Result<Vec<NodeInfo>, Error>;

    /// Transmit `payload` to the node with the given address.
    fn send(&mut self, destination: Address64, payload: &[u8]) -> Result<(), Error>;

    /// Read an AT parameter from the node with the given address.
    fn get_parameter(
        &mut self,
        target: Address64,
        at_command: &str,
        value: Option<&[u8]>,
        apply_changes: bool,
    ) -> Result<Option<Vec<u8>>, Error>;

    /// Write an AT parameter on the node with the given address.
    fn set_parameter(
        &mut self,
        target: Address64,
        at_command: &str,
        value: Option<&[u8]>,
        apply_changes: bool,
    ) -> Result<Option<Vec<u8>>, Error>;

    /// Execute an AT command on the node with the given address.
    fn execute_command(
        &mut self,
        target: Address64,
        at_command: &str,
        value: Option<&[u8]>,
        apply_changes: bool,
    ) -> Result<Option<Vec<u8>>, Error>;
}
