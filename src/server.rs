//! Server setup: bind both listeners, start the device worker, run the
//! accept loops.

use tokio::{net::TcpListener, sync::mpsc, sync::oneshot};
use tracing::info;

use crate::{config::Config, device::DeviceLink, notify, request, worker::DeviceWorkerHandle};

/// The default port of the request-response server.
pub const DEFAULT_REQUEST_PORT: u16 = 9020;

/// The default port of the notify server.
pub const DEFAULT_NOTIFY_PORT: u16 = 9021;

/// The ports a running server actually bound.
///
/// Matches the configured ports unless those were zero (bind any free
/// port, used by tests).
#[derive(Debug, Clone, Copy)]
pub struct BoundPorts {
    /// The request-response port.
    pub request: u16,

    /// The notify port.
    pub notify: u16,
}

async fn run(
    config: Config,
    link: Box<dyn DeviceLink>,
    allocated_ports: Option<oneshot::Sender<BoundPorts>>,
) {
    config.validate().expect("Configuration must be valid");

    // Failing to bind is fatal; there is nothing to degrade to.
    let request_listener = TcpListener::bind((config.address.as_str(), config.request_port))
        .await
        .expect("Request listener should bind");
    let notify_listener = TcpListener::bind((config.address.as_str(), config.notify_port))
        .await
        .expect("Notify listener should bind");

    let ports = BoundPorts {
        request: listener_port(&request_listener),
        notify: listener_port(&notify_listener),
    };

    let (notify_tx, notify_rx) = mpsc::unbounded_channel();
    let worker =
        DeviceWorkerHandle::spawn(link, notify_tx).expect("Device connection should open");

    if let Some(port_reply) = allocated_ports {
        port_reply
            .send(ports)
            .expect("The receiver of which ports were allocated should not be dropped");
    }

    info!(
        "Request-response server listening on {}:{}",
        config.address, ports.request
    );
    info!(
        "Notify server listening on {}:{}",
        config.address, ports.notify
    );

    let queue_timeout = config.request_timeout();

    tokio::join!(
        request::run(request_listener, worker, queue_timeout),
        notify::run(notify_listener, notify_rx),
    );
}

fn listener_port(listener: &TcpListener) -> u16 {
    listener
        .local_addr()
        .expect("A bound listener should have an address")
        .port()
}

/// Start the server on the configured ports.
pub async fn run_with_config(config: Config, link: Box<dyn DeviceLink>) {
    run(config, link, None).await
}

/// Start the server on arbitrary available ports.
/// The ports allocated will be sent on the provided channel.
pub async fn run_any_port(
    config: Config,
    link: Box<dyn DeviceLink>,
    allocated_ports: oneshot::Sender<BoundPorts>,
) {
    let config = Config {
        request_port: 0,
        notify_port: 0,
        ..config
    };

    run(config, link, Some(allocated_ports)).await
}
