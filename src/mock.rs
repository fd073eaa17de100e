//! A mock coordinator link, useful to run and test the bridge without
//! an actual radio on a serial port.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use tracing::{debug, info};

use crate::{
    device::{Address16, Address64, DeviceLink, InboundCallback, NodeInfo, Role},
    error::Error,
};

/// Builder for a [`MockLink`].
#[derive(Default)]
pub struct MockLinkBuilder {
    nodes: Vec<NodeInfo>,
    parameters: HashMap<(Address64, String), Vec<u8>>,
    echo: bool,
    operation_delay: Duration,
}

impl MockLinkBuilder {
    /// A builder with an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the roster of reachable nodes.
    pub fn add_node(mut self, node: NodeInfo) -> Self {
        self.nodes.push(node);
        self
    }

    /// Preset an AT parameter value on one node.
    pub fn add_parameter(
        mut self,
        node: Address64,
        at_command: &str,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        self.parameters
            .insert((node, at_command.to_owned()), value.into());
        self
    }

    /// Reflect every sent payload back as a received message from the
    /// destination node.
    pub fn echo(mut self) -> Self {
        self.echo = true;
        self
    }

    /// Make every operation take at least this long.
    pub fn operation_delay(mut self, delay: Duration) -> Self {
        self.operation_delay = delay;
        self
    }

    /// Build the link.
    #[must_use]
    pub fn build(self) -> MockLink {
        MockLink {
            nodes: self.nodes,
            parameters: self.parameters,
            echo: self.echo,
            operation_delay: self.operation_delay,
            open: false,
            callback: Arc::new(Mutex::new(None)),
        }
    }
}

/// A handle for pushing inbound messages into a [`MockLink`] after the
/// link itself has been handed to the device worker.
#[derive(Clone)]
pub struct MockInjector {
    callback: Arc<Mutex<Option<InboundCallback>>>,
}

impl MockInjector {
    /// Deliver `payload` as if node `from` had sent it to the
    /// coordinator. A no-op until the worker registers its callback.
    pub fn receive(&self, from: Address64, payload: &[u8]) {
        let callback = self
            .callback
            .lock()
            .expect("Callback lock should not be poisoned");

        match callback.as_ref() {
            Some(callback) => callback(from, payload.to_vec()),
            None => debug!(%from, "Inbound message before callback registration, dropping"),
        }
    }
}

/// An in-memory [`DeviceLink`]: a fixed roster of nodes, a parameter
/// table, and optional echo of sent payloads.
pub struct MockLink {
    nodes: Vec<NodeInfo>,
    parameters: HashMap<(Address64, String), Vec<u8>>,
    echo: bool,
    operation_delay: Duration,
    open: bool,
    callback: Arc<Mutex<Option<InboundCallback>>>,
}

impl MockLink {
    /// An injector for delivering inbound messages to this link.
    pub fn injector(&self) -> MockInjector {
        MockInjector {
            callback: Arc::clone(&self.callback),
        }
    }

    /// A small example roster.
    pub fn example() -> Self {
        MockLinkBuilder::new()
            .add_node(NodeInfo {
                address64: Address64(0x0013_A200_418D_05FC),
                address16: Address16(0xD9A1),
                id: "SENSOR-1".into(),
                role: Role::Router,
            })
            .add_node(NodeInfo {
                address64: Address64(0x0013_A200_418D_1234),
                address16: Address16(0x2C6F),
                id: "VALVE-2".into(),
                role: Role::EndDevice,
            })
            .echo()
            .build()
    }

    fn begin_operation(&self) -> Result<(), Error> {
        if !self.open {
            return Err(Error::device("Device is not open"));
        }

        if !self.operation_delay.is_zero() {
            std::thread::sleep(self.operation_delay);
        }

        Ok(())
    }

    fn node(&self, address: Address64) -> Result<&NodeInfo, Error> {
        self.nodes
            .iter()
            .find(|node| node.address64 == address)
            .ok_or_else(|| Error::device(format!("Could not reach node {address}")))
    }
}

impl DeviceLink for MockLink {
    fn open(&mut self) -> Result<(), Error> {
        if self.open {
            return Err(Error::device("Device is already open"));
        }

        info!("Mock link open, {} node(s)", self.nodes.len());
        self.open = true;

        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn on_receive(&mut self, callback: InboundCallback) {
        *self
            .callback
            .lock()
            .expect("Callback lock should not be poisoned") = Some(callback);
    }

    fn discover(&mut self) -> Result<Vec<NodeInfo>, Error> {
        self.begin_operation()?;

        Ok(self.nodes.clone())
    }

    fn send(&mut self, destination: Address64, payload: &[u8]) -> Result<(), Error> {
        self.begin_operation()?;
        self.node(destination)?;

        if self.echo {
            self.injector().receive(destination, payload);
        }

        Ok(())
    }

    fn get_parameter(
        &mut self,
        target: Address64,
        at_command: &str,
        _value: Option<&[u8]>,
        _apply_changes: bool,
    ) -> Result<Option<Vec<u8>>, Error> {
        self.begin_operation()?;
        self.node(target)?;

        match self.parameters.get(&(target, at_command.to_owned())) {
            Some(value) => Ok(Some(value.clone())),
            None => Err(Error::device(format!(
                "Node {target} has no `{at_command}` parameter"
            ))),
        }
    }

    fn set_parameter(
        &mut self,
        target: Address64,
        at_command: &str,
        value: Option<&[u8]>,
        _apply_changes: bool,
    ) -> Result<Option<Vec<u8>>, Error> {
        self.begin_operation()?;
        self.node(target)?;

        let value = value.ok_or_else(|| Error::device("set_parameter needs a value"))?;
        self.parameters
            .insert((target, at_command.to_owned()), value.to_vec());

        Ok(None)
    }

    fn execute_command(
        &mut self,
        target: Address64,
        at_command: &str,
        _value: Option<&[u8]>,
        _apply_changes: bool,
    ) -> Result<Option<Vec<u8>>, Error> {
        self.begin_operation()?;
        self.node(target)?;

        debug!(%target, at_command, "Executing AT command");

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use pretty_assertions::assert_eq;

    use super::*;

    fn sensor() -> Address64 {
        Address64(0x0013_A200_418D_05FC)
    }

    fn open_example() -> MockLink {
        let mut link = MockLink::example();
        link.open().unwrap();
        link
    }

    #[test]
    fn discover_returns_the_roster() {
        let mut link = open_example();

        let nodes = link.discover().unwrap();

        assert_eq!(2, nodes.len());
        assert_eq!(sensor(), nodes[0].address64);
    }

    #[test]
    fn operations_require_open() {
        let mut link = MockLink::example();

        assert!(matches!(link.discover(), Err(Error::Device(_))));
    }

    #[test]
    fn send_to_unknown_node_is_unreachable() {
        let mut link = open_example();

        let err = link.send(Address64(0xDEAD_BEEF), b"hi").unwrap_err();

        assert!(err.to_string().contains("Could not reach node"));
    }

    #[test]
    fn echo_reflects_sent_payload() {
        let mut link = open_example();

        let (tx, rx) = mpsc::channel();
        link.on_receive(Box::new(move |from, payload| {
            tx.send((from, payload)).unwrap();
        }));

        link.send(sensor(), b"ping").unwrap();

        let (from, payload) = rx.recv().unwrap();
        assert_eq!(sensor(), from);
        assert_eq!(b"ping".to_vec(), payload);
    }

    #[test]
    fn parameters_round_trip() {
        let mut link = open_example();

        assert!(link
            .get_parameter(sensor(), "NI", None, false)
            .is_err());

        link.set_parameter(sensor(), "NI", Some(b"SENSOR-1"), true)
            .unwrap();

        let value = link.get_parameter(sensor(), "NI", None, false).unwrap();
        assert_eq!(Some(b"SENSOR-1".to_vec()), value);
    }

    #[test]
    fn injector_before_registration_is_dropped() {
        let link = MockLink::example();

        // Must not panic.
        link.injector().receive(sensor(), b"early");
    }
}
