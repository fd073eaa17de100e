#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

/// The frames exchanged on the wire: requests, responses and
/// notifications, plus the closed set of recognized commands.
pub mod protocol;

/// Newline-delimited JSON framing, shared by both TCP ports.
pub mod framing;

/// The contract a coordinator driver must satisfy, and the address and
/// node types.
pub mod device;

/// An in-memory coordinator link for tests and hardware-free runs.
pub mod mock;

/// The device worker: the one task with exclusive, sequential access
/// to the coordinator.
pub mod worker;

/// The request-response server: one handler per connection, commands
/// queued for the worker.
pub(crate) mod request;

/// The notify server: fans received radio messages out to all
/// subscribers.
pub(crate) mod notify;

/// Code relating to setting up the server which binds the listeners
/// and starts the worker.
pub mod server;

/// Clients for both ports.
pub mod client;

/// Relates to config files.
pub mod config;

/// The command line interface.
pub mod cli;

/// Possible errors in this library.
pub mod error;

/// Logging/tracing setup.
pub mod logging;
