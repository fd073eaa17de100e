use std::time::{Duration, Instant};

use color_eyre::Result;
use common::{connect, send_request, start_server, start_server_with_config, wait_request, SENSOR};
use pretty_assertions::assert_eq;
use xbee_bridge::{
    config::Config,
    protocol::{Request, WaitData},
};

mod common;

#[tokio::test]
async fn responses_come_back_in_request_order() -> Result<()> {
    let mut client = common::start_server_and_connect().await?;

    // Pipeline three requests before reading anything back.
    client.send(&Request::new("discover")).await?;
    client.send(&send_request(SENSOR, b"one")).await?;
    client.send(&Request::new("discover")).await?;

    for expected in ["discover", "send", "discover"] {
        let response = client.recv().await?;
        assert_ok_response!(response, expected);
    }

    Ok(())
}

#[tokio::test]
async fn discover_then_wait_scenario() -> Result<()> {
    let mut client = common::start_server_and_connect().await?;

    let started = Instant::now();
    client.send(&Request::new("discover")).await?;
    client.send(&wait_request(1.0)).await?;

    let response = client.recv().await?;
    assert_ok_response!(response, "discover");
    assert!(started.elapsed() < Duration::from_secs(1));

    let response = client.recv().await?;
    assert_ok_response!(response, "wait");
    assert!(started.elapsed() >= Duration::from_secs(1));

    let data: WaitData = response.data_as()?;
    assert_eq!(1.0, data.time);

    Ok(())
}

#[tokio::test]
async fn commands_from_all_connections_share_one_queue() -> Result<()> {
    let ports = start_server().await;

    let mut stalling = connect(ports).await?;
    let mut waiting = connect(ports).await?;

    // Put a slow command at the head of the queue, then give it a
    // moment to actually arrive there.
    stalling.send(&wait_request(0.4)).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // A command from another connection runs only after the stall.
    let started = Instant::now();
    let response = waiting.request(&Request::new("discover")).await?;

    assert_ok_response!(response, "discover");
    assert!(started.elapsed() >= Duration::from_millis(200));

    let response = stalling.recv().await?;
    assert_ok_response!(response, "wait");

    Ok(())
}

#[tokio::test]
async fn concurrent_clients_never_overlap_on_the_device() -> Result<()> {
    // Every device operation takes at least 50 ms on this link. If the
    // worker serializes all of them, 24 commands from 8 concurrent
    // clients cannot finish in less than 1.2 s of wall clock.
    let config = Config {
        // Generously above the per-operation delay times the total
        // command count.
        queue_timeout: 20.0,
        ..Config::example()
    };

    let mut builder =
        xbee_bridge::mock::MockLinkBuilder::new().operation_delay(Duration::from_millis(50));
    for node in &config.mock_nodes {
        builder = builder.add_node(node.clone());
    }

    let ports = common::start_server_with(config, builder.build()).await;

    let started = Instant::now();

    let mut handles = Vec::new();
    for _ in 0..8 {
        handles.push(tokio::spawn(async move {
            let mut client = connect(ports).await.unwrap();

            for _ in 0..3 {
                let response = client.request(&Request::new("discover")).await.unwrap();
                assert!(response.is_ok(), "{:?}", response.message);
            }
        }));
    }

    for handle in handles {
        handle.await?;
    }

    assert!(started.elapsed() >= Duration::from_millis(1200));

    Ok(())
}

#[tokio::test]
async fn stop_terminates_the_worker() -> Result<()> {
    let ports = start_server_with_config(Config::example()).await;
    let mut client = connect(ports).await?;

    // The worker never answers a stop; the abandoned slot surfaces as
    // a synthesized timeout error.
    let response = client.request(&Request::new("stop")).await?;
    assert_error_response!(response, "Operation timed out");

    // Nothing queued afterwards is processed.
    let response = client.request(&Request::new("discover")).await?;
    assert_eq!(Some("discover".into()), response.name);
    assert_error_response!(response, "Operation timed out");

    Ok(())
}
