//! Configuration files for the bridge, in RON.

use std::{path::Path, time::Duration};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    device::{Address16, Address64, NodeInfo, Role},
    error::Error,
    server,
};

/// The configuration used for running the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The address both listeners bind on.
    pub address: String,

    /// The port of the request-response server.
    pub request_port: u16,

    /// The port of the notify server.
    pub notify_port: u16,

    /// How long a client waits for a queued command's response before
    /// it gets an `Operation timed out` error, in seconds.
    pub queue_timeout: f64,

    /// The node roster of the built-in mock link, used when the bridge
    /// runs without real hardware.
    pub mock_nodes: Vec<NodeInfo>,

    /// Whether the mock link reflects sent payloads back as received
    /// messages.
    pub mock_echo: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".into(),
            request_port: server::DEFAULT_REQUEST_PORT,
            notify_port: server::DEFAULT_NOTIFY_PORT,
            queue_timeout: 25.0,
            mock_nodes: vec![],
            mock_echo: false,
        }
    }
}

impl Config {
    fn ron() -> ron::Options {
        ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .with_default_extension(ron::extensions::Extensions::UNWRAP_NEWTYPES)
    }

    /// Deserialize a .ron file's contents.
    /// Panics if the input is not valid .ron.
    pub fn deserialize(input: &str) -> Self {
        Self::ron().from_str::<Config>(input).unwrap()
    }

    /// An example configuration with some fields filled in.
    pub fn example() -> Self {
        Self {
            mock_nodes: vec![
                NodeInfo {
                    address64: Address64(0x0013_A200_418D_05FC),
                    address16: Address16(0xD9A1),
                    id: "SENSOR-1".into(),
                    role: Role::Router,
                },
                NodeInfo {
                    address64: Address64(0x0013_A200_418D_1234),
                    address16: Address16(0x2C6F),
                    id: "VALVE-2".into(),
                    role: Role::EndDevice,
                },
            ],
            mock_echo: true,
            ..Default::default()
        }
    }

    /// Serialize the configuration in a "pretty" (i.e. non-compact) fashion.
    pub fn serialize_pretty(&self) -> String {
        Self::ron()
            .to_string_pretty(self, ron::ser::PrettyConfig::default())
            .unwrap()
    }

    /// Setup a new configuration from a RON file.
    pub fn new_from_path<P: AsRef<Path>>(p: P) -> Self {
        let s = std::fs::read_to_string(p).unwrap();

        Self::deserialize(&s)
    }

    /// The queue timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.queue_timeout)
    }

    fn check_ports(&self) -> Result<(), Error> {
        // Both zero is fine: that means "any free port" (tests).
        if self.request_port == self.notify_port && self.request_port != 0 {
            return Err(Error::BadConfig(format!(
                "The request and notify servers cannot share port {}",
                self.request_port
            )));
        }

        Ok(())
    }

    fn check_timeout(&self) -> Result<(), Error> {
        if !self.queue_timeout.is_finite() || self.queue_timeout <= 0.0 {
            return Err(Error::BadConfig(format!(
                "`{}` is not a valid queue timeout, expected a positive number of seconds",
                self.queue_timeout
            )));
        }

        Ok(())
    }

    fn check_duplicate_nodes(&self) -> Result<(), Error> {
        let duplicates = self
            .mock_nodes
            .iter()
            .map(|node| node.address64)
            .duplicates()
            .collect::<Vec<_>>();

        if duplicates.is_empty() {
            Ok(())
        } else {
            Err(Error::BadConfig(format!(
                "Mock nodes must have unique 64-bit addresses. Duplicates: {duplicates:?}"
            )))
        }
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        self.check_ports()?;
        self.check_timeout()?;
        self.check_duplicate_nodes()?;

        Ok(())
    }
}
