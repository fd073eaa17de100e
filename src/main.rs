use clap::Parser;
use tracing::{debug, error, info};
use xbee_bridge::{cli, config::Config, logging, mock::MockLinkBuilder, server};

#[tokio::main]
async fn main() {
    logging::init();

    let cli = cli::Cli::parse();

    if let Some(command) = cli.command {
        cli::handle_command(command);

        return;
    }

    let config = if let Some(config_path) = cli.config {
        debug!(?config_path, "Config from path");
        Config::new_from_path(config_path)
    } else {
        debug!("Default config");
        Config::default()
    };

    // Until a real radio driver is plugged in through the library API,
    // the binary serves the configured mock roster.
    let mut link = MockLinkBuilder::new();
    for node in &config.mock_nodes {
        link = link.add_node(node.clone());
    }
    if config.mock_echo {
        link = link.echo();
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C, quitting")
        }
        _ = server::run_with_config(config, Box::new(link.build())) => {
            error!("Server returned")
        }
    }
}
