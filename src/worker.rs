//! The device worker: the single owner of the coordinator link.
//!
//! All device access goes through one FIFO command queue drained by one
//! thread, so no two operations ever overlap. Asynchronously received
//! radio messages take a separate path: the driver callback pushes them
//! onto the notify queue, independent of command execution.

use std::{thread, time::Duration};

use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, info_span, warn};

use crate::{
    device::{Address64, DeviceLink},
    error::Error,
    protocol::{AtArgs, DiscoverData, Notification, Operation, Response, WaitData},
};

/// An operation queued for execution, paired with the slot its response
/// will be written into.
///
/// Exactly one response is ever written to a given command's slot. If
/// the requester stops waiting (queue timeout), the write lands in a
/// dropped receiver and the work is wasted but harmless.
pub(crate) struct Command {
    operation: Operation,
    response: oneshot::Sender<Response>,
}

/// Handle to the device worker. Cloned into every connection handler;
/// the worker itself runs on its own thread for the process lifetime,
/// or until a `stop` command is dequeued.
#[derive(Clone)]
pub struct DeviceWorkerHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl DeviceWorkerHandle {
    /// Open the link, register the inbound-message callback, and start
    /// the worker thread.
    pub fn spawn(
        mut link: Box<dyn DeviceLink>,
        notifications: mpsc::UnboundedSender<Notification>,
    ) -> Result<Self, Error> {
        link.open()?;
        info!("Device connection opened");

        // Fires on the driver's reader thread, concurrently with
        // command execution; the notify queue is the only shared thing
        // on this path.
        link.on_receive(Box::new(move |from, payload| {
            debug!(%from, "Received message");
            if notifications
                .send(Notification::receive(from, payload))
                .is_err()
            {
                warn!("Notify queue gone, dropping received message");
            }
        }));

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let mut worker = DeviceWorker {
            link,
            commands: commands_rx,
        };

        thread::Builder::new()
            .name("device-worker".into())
            .spawn(move || worker.run())
            .map_err(|e| Error::Io(e.to_string()))?;

        Ok(Self {
            commands: commands_tx,
        })
    }

    /// Queue an operation. The returned slot yields the response once
    /// the worker has reached and executed the operation; it errors if
    /// the worker stopped before getting there.
    pub fn submit(&self, operation: Operation) -> oneshot::Receiver<Response> {
        let (response_tx, response_rx) = oneshot::channel();

        let command = Command {
            operation,
            response: response_tx,
        };

        if self.commands.send(command).is_err() {
            // The worker is gone; the dropped sender makes the
            // receiver's error visible to the caller.
            debug!("Command submitted after worker stop");
        }

        response_rx
    }

    /// Whether the worker has stopped and dropped its queue.
    pub fn is_stopped(&self) -> bool {
        self.commands.is_closed()
    }
}

struct DeviceWorker {
    link: Box<dyn DeviceLink>,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl DeviceWorker {
    fn run(&mut self) {
        debug!("Device worker started");

        while let Some(command) = self.commands.blocking_recv() {
            let _span = info_span!("Command", operation = %command.operation).entered();

            if matches!(command.operation, Operation::Stop) {
                info!("Stop command, shutting down");
                break;
            }

            let name = command.operation.wire_name();

            let response = match self.execute(&command.operation) {
                Ok(data) => {
                    info!("Executed");
                    Response::ok(name, data)
                }
                Err(e) => {
                    error!(%e, "Command failed");
                    Response::error(Some(name), e)
                }
            };

            if command.response.send(response).is_err() {
                debug!("Response ready but the requester gave up waiting");
            }
        }

        self.link.close();
        info!("Device connection closed");
    }

    fn execute(&mut self, operation: &Operation) -> Result<Value, Error> {
        match operation {
            Operation::Discover => {
                let devices = self.link.discover()?;
                Ok(to_value(DiscoverData { devices }))
            }
            Operation::Send(args) => {
                let destination: Address64 = args.address64.parse()?;
                self.link.send(destination, &args.message.0)?;
                Ok(json!({}))
            }
            Operation::GetParameter(args) => {
                let (target, value) = at_target(args)?;
                let result = self.link.get_parameter(
                    target,
                    &args.at_command,
                    value,
                    args.apply_changes,
                )?;
                Ok(at_result(result))
            }
            Operation::SetParameter(args) => {
                let (target, value) = at_target(args)?;
                let result = self.link.set_parameter(
                    target,
                    &args.at_command,
                    value,
                    args.apply_changes,
                )?;
                Ok(at_result(result))
            }
            Operation::ExecuteCommand(args) => {
                let (target, value) = at_target(args)?;
                let result = self.link.execute_command(
                    target,
                    &args.at_command,
                    value,
                    args.apply_changes,
                )?;
                Ok(at_result(result))
            }
            Operation::Wait(args) => {
                let time = args.time;
                let duration = Duration::try_from_secs_f64(time)
                    .map_err(|_| Error::device(format!("`{time}` is not a valid wait time")))?;

                // Deliberately stalls the queue: strict FIFO means
                // everything queued behind this waits too.
                thread::sleep(duration);

                Ok(to_value(WaitData { time }))
            }
            Operation::Stop => unreachable!("Stop is handled by the worker loop"),
        }
    }
}

fn at_target(args: &AtArgs) -> Result<(Address64, Option<&[u8]>), Error> {
    let target = args.address64.parse()?;
    let value = args.value.as_ref().map(|bytes| bytes.0.as_slice());

    Ok((target, value))
}

fn at_result(result: Option<Vec<u8>>) -> Value {
    to_value(crate::protocol::AtResultData {
        result: result.map(Into::into),
    })
}

fn to_value(data: impl serde::Serialize) -> Value {
    serde_json::to_value(data).expect("Result data should serialize")
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        mock::MockLink,
        protocol::{B64Bytes, SendArgs, Status, WaitArgs},
    };

    const SENSOR: &str = "0013A200418D05FC";

    fn spawn_example() -> (DeviceWorkerHandle, mpsc::UnboundedReceiver<Notification>) {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let worker = DeviceWorkerHandle::spawn(Box::new(MockLink::example()), notify_tx).unwrap();

        (worker, notify_rx)
    }

    fn send_operation(message: &[u8]) -> Operation {
        Operation::Send(SendArgs {
            address64: SENSOR.into(),
            message: message.into(),
        })
    }

    #[tokio::test]
    async fn discover_answers_with_the_roster() {
        let (worker, _notify) = spawn_example();

        let response = worker.submit(Operation::Discover).await.unwrap();

        assert!(response.is_ok());
        let data: DiscoverData = response.data_as().unwrap();
        assert_eq!(2, data.devices.len());
    }

    #[tokio::test]
    async fn a_failing_command_does_not_kill_the_worker() {
        let (worker, _notify) = spawn_example();

        let response = worker
            .submit(Operation::Send(SendArgs {
                address64: "FFFFFFFFFFFFFFFF".into(),
                message: B64Bytes::default(),
            }))
            .await
            .unwrap();

        assert_eq!(Status::Error, response.status);
        assert!(response.message.unwrap().contains("Could not reach node"));

        // The next command still executes.
        let response = worker.submit(Operation::Discover).await.unwrap();
        assert!(response.is_ok());
    }

    #[tokio::test]
    async fn malformed_address_is_a_device_error_response() {
        let (worker, _notify) = spawn_example();

        let response = worker
            .submit(Operation::Send(SendArgs {
                address64: "not-an-address".into(),
                message: B64Bytes::default(),
            }))
            .await
            .unwrap();

        assert_eq!(Status::Error, response.status);
        assert_eq!(Some("send".into()), response.name);
    }

    #[tokio::test]
    async fn sent_payload_echoes_back_as_a_notification() {
        let (worker, mut notify) = spawn_example();

        let response = worker.submit(send_operation(b"ping")).await.unwrap();
        assert!(response.is_ok());

        let notification = notify.recv().await.unwrap();
        assert_eq!(SENSOR, notification.data.address64.to_string());
        assert_eq!(b"ping".to_vec(), notification.data.message.0);
    }

    #[tokio::test]
    async fn wait_stalls_commands_queued_behind_it() {
        let (worker, _notify) = spawn_example();

        let started = Instant::now();
        let slow = worker.submit(Operation::Wait(WaitArgs { time: 0.2 }));
        let behind = worker.submit(Operation::Discover);

        let response = behind.await.unwrap();
        assert!(response.is_ok());
        assert!(started.elapsed() >= Duration::from_millis(200));

        assert!(slow.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn an_abandoned_command_still_executes() {
        let (worker, mut notify) = spawn_example();

        // Stall the worker, then abandon a queued send by dropping its
        // response slot before the worker reaches it.
        let _slow = worker.submit(Operation::Wait(WaitArgs { time: 0.1 }));
        drop(worker.submit(send_operation(b"abandoned")));

        // The echo notification proves the send ran anyway.
        let notification = notify.recv().await.unwrap();
        assert_eq!(b"abandoned".to_vec(), notification.data.message.0);
    }

    #[tokio::test]
    async fn stop_terminates_and_later_commands_get_no_response() {
        let (worker, _notify) = spawn_example();

        let stop_slot = worker.submit(Operation::Stop);

        // The worker never answers a stop command; the slot just dies.
        assert!(stop_slot.await.is_err());

        // Give the thread a moment to drop the queue.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(worker.is_stopped());

        assert!(worker.submit(Operation::Discover).await.is_err());
    }

    #[tokio::test]
    async fn commands_queued_behind_a_stop_are_not_processed() {
        let (worker, mut notify) = spawn_example();

        let _slow = worker.submit(Operation::Wait(WaitArgs { time: 0.1 }));
        let _stop = worker.submit(Operation::Stop);
        let after = worker.submit(send_operation(b"too late"));

        assert!(after.await.is_err());
        assert!(notify.recv().await.is_none());
    }
}
