#![allow(dead_code)]

use color_eyre::Result;
use tokio::sync::oneshot;
use xbee_bridge::{
    client::{NotifyClient, RequestClient},
    config::Config,
    mock::{MockInjector, MockLink, MockLinkBuilder},
    protocol::{Request, Response},
    server::{self, BoundPorts},
};

/// A node present in [`Config::example`]'s roster.
pub const SENSOR: &str = "0013A200418D05FC";

/// Another node present in [`Config::example`]'s roster.
pub const VALVE: &str = "0013A200418D1234";

pub fn link_from_config(config: &Config) -> MockLink {
    let mut link = MockLinkBuilder::new();

    for node in &config.mock_nodes {
        link = link.add_node(node.clone());
    }
    if config.mock_echo {
        link = link.echo();
    }

    link.build()
}

pub async fn start_server_with(config: Config, link: MockLink) -> BoundPorts {
    let (ports_tx, ports_rx) = oneshot::channel();

    tokio::spawn(async move { server::run_any_port(config, Box::new(link), ports_tx).await });

    ports_rx
        .await
        .expect("Server should reply with allocated ports")
}

pub async fn start_server_with_config(config: Config) -> BoundPorts {
    let link = link_from_config(&config);

    start_server_with(config, link).await
}

/// Example config: two mock nodes, echo on, 25 s queue timeout.
pub async fn start_server() -> BoundPorts {
    start_server_with_config(Config::example()).await
}

/// Like [`start_server_with_config`], but also hands out the mock
/// link's injector for pushing inbound messages from the test.
pub async fn start_server_with_injector(config: Config) -> (BoundPorts, MockInjector) {
    let link = link_from_config(&config);
    let injector = link.injector();

    (start_server_with(config, link).await, injector)
}

pub async fn connect(ports: BoundPorts) -> Result<RequestClient> {
    Ok(RequestClient::connect(("127.0.0.1", ports.request)).await?)
}

pub async fn subscribe(ports: BoundPorts) -> Result<NotifyClient> {
    Ok(NotifyClient::connect(("127.0.0.1", ports.notify)).await?)
}

pub async fn start_server_and_connect() -> Result<RequestClient> {
    let ports = start_server().await;

    connect(ports).await
}

pub fn send_request(address64: &str, payload: &[u8]) -> Request {
    Request::with_data(
        "send",
        serde_json::json!({
            "address64": address64,
            "message": base64(payload),
        }),
    )
}

pub fn wait_request(seconds: f64) -> Request {
    Request::with_data("wait", serde_json::json!({ "time": seconds }))
}

pub fn base64(payload: &[u8]) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine};

    STANDARD.encode(payload)
}

#[macro_export]
macro_rules! assert_ok_response {
    ($response:ident, $name:expr) => {
        assert_eq!(Some($name.into()), $response.name);
        assert!(
            $response.is_ok(),
            "expected ok, got: {:?}",
            $response.message
        );
    };
}

#[macro_export]
macro_rules! assert_error_response {
    ($response:ident, $message_part:expr) => {
        assert_eq!(
            xbee_bridge::protocol::Status::Error,
            $response.status
        );
        let message = $response.message.as_deref().unwrap_or_default();
        assert!(
            message.contains($message_part),
            "expected `{}` in `{message}`",
            $message_part
        );
    };
}

pub fn response_devices(response: &Response) -> Vec<String> {
    let data: xbee_bridge::protocol::DiscoverData =
        response.data_as().expect("Discover data should parse");

    data.devices
        .into_iter()
        .map(|node| node.address64.to_string())
        .collect()
}
