//! wirebus-cli - Command-line interface for wirebus
//!
//! One-shot calls against a running bus, plus a trivial echo provider for
//! smoke-testing.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use wirebus_client::{Client, ConnectionConfig};
use wirebus_protocol::Payload;

#[derive(Parser)]
#[command(name = "wirebus-cli")]
#[command(about = "Command-line interface for the wirebus message bus")]
#[command(version)]
struct Cli {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:7450", env = "WIREBUS_SERVER")]
    server: SocketAddr,

    /// Request timeout in seconds
    #[arg(short = 't', long, default_value_t = 30)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Call a method with key=value arguments
    Call {
        /// Method name
        method: String,

        /// Arguments as key=value pairs
        args: Vec<String>,
    },

    /// Serve an echo method until interrupted (for smoke tests)
    ServeEcho {
        /// Method name to publish
        #[arg(short, long, default_value = "echo")]
        name: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config =
        ConnectionConfig::new(cli.server).with_request_timeout(Duration::from_secs(cli.timeout));

    match cli.command {
        Commands::Call { method, args } => {
            let payload = parse_args(&args)?;
            let client = Client::connect(config).await?;
            let out = client.call(&method, payload).await?;

            println!("{}", "OK".green().bold());
            for (key, value) in out.iter() {
                println!("{} = {}", key.cyan(), value);
            }
            client.shutdown().await?;
            Ok(())
        }

        Commands::ServeEcho { name } => {
            let client = Client::connect(config).await?;
            client
                .register_method(&name, |input: &Payload| {
                    let who = input.get("name").unwrap_or("world");
                    Payload::new().with("greeting", format!("Hello, {}", who))
                })
                .await?;

            println!(
                "{} serving '{}' on {} (ctrl-c to stop)",
                "OK".green().bold(),
                name,
                cli.server
            );
            tokio::signal::ctrl_c().await.ok();
            client.shutdown().await?;
            Ok(())
        }
    }
}

/// Parses `key=value` arguments into a payload.
fn parse_args(args: &[String]) -> Result<Payload, String> {
    let mut payload = Payload::new();
    for arg in args {
        match arg.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                payload.set(key, value);
            }
            _ => return Err(format!("argument '{}' is not of the form key=value", arg)),
        }
    }
    Ok(payload)
}
