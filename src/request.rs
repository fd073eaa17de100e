//! The request-response server.
//!
//! One handler task per accepted connection, any number of
//! connections. Each request becomes a command on the device worker's
//! queue; the handler waits on the response slot for at most the queue
//! timeout and synthesizes a timeout error past that. A handler failure
//! takes down only its own connection.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::{debug, info_span, warn, Instrument};

use crate::{
    error::Error,
    framing::JsonLinesCodec,
    protocol::{Operation, Request, Response},
    worker::DeviceWorkerHandle,
};

pub(crate) async fn run(
    listener: TcpListener,
    worker: DeviceWorkerHandle,
    queue_timeout: Duration,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let span = info_span!("Connection", %peer);

                tokio::spawn(
                    handle_connection(stream, worker.clone(), queue_timeout).instrument(span),
                );
            }
            Err(e) => warn!(%e, "Could not accept connection"),
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    worker: DeviceWorkerHandle,
    queue_timeout: Duration,
) {
    debug!("Accepted connection");

    match connection_loop(stream, worker, queue_timeout).await {
        Ok(()) | Err(Error::ConnectionBroken) => debug!("Connection closed"),
        Err(e) => warn!(%e, "Connection handler stopped"),
    }
}

async fn connection_loop(
    stream: TcpStream,
    worker: DeviceWorkerHandle,
    queue_timeout: Duration,
) -> Result<(), Error> {
    let mut framed = Framed::new(stream, JsonLinesCodec::new());

    while let Some(frame) = framed.next().await {
        let response = handle_frame(frame?, &worker, queue_timeout).await;

        debug!(%response, "Answering");
        framed.send(&response).await?;
    }

    Ok(())
}

async fn handle_frame(
    frame: Value,
    worker: &DeviceWorkerHandle,
    queue_timeout: Duration,
) -> Response {
    // A frame which is valid JSON but not a valid request is answered
    // in-band; only transport-level failures kill the connection.
    let request: Request = match serde_json::from_value(frame.clone()) {
        Ok(request) => request,
        Err(e) => {
            return Response::error(
                None,
                Error::BadRequest {
                    request: frame.to_string(),
                    problem: e.to_string(),
                },
            )
        }
    };

    let operation = match Operation::from_request(&request) {
        Ok(operation) => operation,
        Err(e) => return Response::error(Some(&request.name), e),
    };

    debug!(name = %request.name, "Queueing command");
    let slot = worker.submit(operation);

    match tokio::time::timeout(queue_timeout, slot).await {
        Ok(Ok(response)) => response,
        Ok(Err(_)) => {
            // The worker stopped before reaching the command; the slot
            // will never be written.
            debug!(name = %request.name, "Worker stopped before answering");
            Response::timed_out(Some(&request.name))
        }
        Err(_) => {
            // The command stays queued and will still execute; nobody
            // reads the slot it eventually writes into.
            warn!(name = %request.name, ?queue_timeout, "No response in time");
            Response::timed_out(Some(&request.name))
        }
    }
}
