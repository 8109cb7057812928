use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facegate", about = "Facegate face verification CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a descriptor against the enrolled references
    Verify {
        /// JSON file holding a 128-number array or {"descriptor": [...]} ("-" for stdin)
        input: PathBuf,
    },
    /// Enroll a descriptor as a new reference for the target identity
    Enroll {
        /// JSON file holding a 128-number array or {"descriptor": [...]} ("-" for stdin)
        input: PathBuf,
    },
    /// List stored identity rows
    List,
    /// Show daemon status
    Status,
}

#[zbus::proxy(
    interface = "org.facegate.Gate1",
    default_service = "org.facegate.Gate1",
    default_path = "/org/facegate/Gate1",
    gen_blocking = false
)]
trait Gate {
    fn verify(&self, descriptor_json: &str) -> zbus::Result<String>;
    fn enroll(&self, descriptor_json: &str) -> zbus::Result<i64>;
    fn list_identities(&self) -> zbus::Result<String>;
    fn status(&self) -> zbus::Result<String>;
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading descriptor from stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
    }
}

fn pretty(json: &str) -> String {
    serde_json::from_str::<Value>(json)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| json.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = zbus::Connection::session()
        .await
        .context("connecting to session bus")?;
    let gate = GateProxy::new(&conn)
        .await
        .context("facegated not reachable on D-Bus")?;

    match cli.command {
        Commands::Verify { input } => {
            let payload = read_input(&input)?;
            let decision = gate.verify(&payload).await?;
            println!("{}", pretty(&decision));

            let matched = serde_json::from_str::<Value>(&decision)
                .ok()
                .and_then(|v| v.get("match").and_then(Value::as_bool))
                .unwrap_or(false);
            if !matched {
                std::process::exit(1);
            }
        }
        Commands::Enroll { input } => {
            let payload = read_input(&input)?;
            let id = gate.enroll(&payload).await?;
            println!("Enrolled reference {id}");
        }
        Commands::List => {
            let identities = gate.list_identities().await?;
            println!("{}", pretty(&identities));
        }
        Commands::Status => {
            let status = gate.status().await?;
            println!("{}", pretty(&status));
        }
    }

    Ok(())
}
