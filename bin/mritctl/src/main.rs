//! ---
//! mrit_section: "05-networking-external-interfaces"
//! mrit_subsection: "binary"
//! mrit_type: "source"
//! mrit_scope: "code"
//! mrit_description: "Control CLI for operators and scripts talking to a gateway."
//! mrit_version: "v0.1.0"
//! mrit_owner: "tbd"
//! ---
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mrit_common::logging::init_cli_tracing;

mod client;

use client::{CommandArgs, GatewayClient};

#[derive(Debug, Parser)]
#[command(author, version, about = "MRIT gateway control utility", long_about = None)]
struct Cli {
    #[arg(
        long,
        env = "MRIT_URL",
        default_value = "http://127.0.0.1:8080",
        help = "Base URL of the gateway"
    )]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Show site status")]
    Status,
    #[command(about = "List registered devices")]
    Devices,
    #[command(about = "Register a device and send it a power command")]
    Command(CommandArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    init_cli_tracing();
    let cli = Cli::parse();
    let client = GatewayClient::new(&cli.url)?;

    let reply = match cli.command {
        Commands::Status => client.status().await?,
        Commands::Devices => client.devices().await?,
        Commands::Command(args) => client.command(&args).await?,
    };

    println!("{}", serde_json::to_string_pretty(&reply.body)?);
    if reply.status.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
