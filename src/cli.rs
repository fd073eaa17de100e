use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::{config::Config, protocol};

/// The command line interface for the bridge.
#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a configuration file
    pub config: Option<PathBuf>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Commands available in the command line interface.
#[derive(Subcommand)]
pub enum Commands {
    /// Examples for user convenience.
    #[clap(subcommand)]
    Examples(Examples),
}

/// Helpful examples for users.
#[derive(Subcommand, Clone)]
pub enum Examples {
    /// Show an example of a configuration file's contents.
    Config,

    /// Show an example JSON request for discovering nodes.
    DiscoverRequest,

    /// Show an example JSON request for sending a payload to a node.
    SendRequest,

    /// Show an example JSON response to a successful discovery.
    DiscoverResponse,

    /// Show an example JSON notification of a received message.
    Notification,
}

/// Print what the given subcommand asks for.
pub fn handle_command(command: Commands) {
    let Commands::Examples(example) = command;

    let serialized = match example {
        Examples::Config => Config::example().serialize_pretty(),
        Examples::DiscoverRequest => pretty(&protocol::Request::example_discover()),
        Examples::SendRequest => pretty(&protocol::Request::example_send()),
        Examples::DiscoverResponse => pretty(&protocol::Response::example_discover_ok()),
        Examples::Notification => pretty(&protocol::Notification::example()),
    };

    println!("{serialized}");
}

fn pretty(frame: &impl serde::Serialize) -> String {
    serde_json::to_string_pretty(frame).expect("Examples should serialize")
}
