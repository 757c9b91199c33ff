use std::time::Duration;

use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::{connect_async, tungstenite::Message};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Operator CLI for the edge gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000", env = "GATEWAY_URL")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show gateway health and uptime
    Health,
    /// Show gateway name and version
    Version,
    /// Open the real-time channel and round-trip a ping
    Ping {
        /// Real-time channel path
        #[arg(long, default_value = "/ws")]
        path: String,

        /// Seconds to wait for each reply
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let base = cli.url.trim_end_matches('/');
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Health => {
            let res = client.get(format!("{}/health", base)).send().await?;
            print_response(res).await?;
        }
        Commands::Version => {
            let res = client.get(format!("{}/version", base)).send().await?;
            print_response(res).await?;
        }
        Commands::Ping { path, timeout } => {
            ping(base, &path, Duration::from_secs(timeout)).await?;
        }
    }

    Ok(())
}

async fn ping(base: &str, path: &str, timeout: Duration) -> Result<(), Box<dyn std::error::Error>> {
    let ws_url = match base.split_once("://") {
        Some(("https", rest)) => format!("wss://{}{}", rest, path),
        Some((_, rest)) => format!("ws://{}{}", rest, path),
        None => format!("ws://{}{}", base, path),
    };

    let (mut socket, _) = connect_async(ws_url.as_str()).await?;

    let greeting = next_json(&mut socket, timeout).await?;
    println!("connected: {}", greeting);

    let sent = std::time::Instant::now();
    socket.send(Message::Text(r#"{"type":"ping"}"#.into())).await?;
    let reply = next_json(&mut socket, timeout).await?;
    println!("reply ({} ms): {}", sent.elapsed().as_millis(), reply);

    socket.close(None).await?;
    Ok(())
}

async fn next_json<S>(socket: &mut S, timeout: Duration) -> Result<Value, Box<dyn std::error::Error>>
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = tokio::time::timeout(timeout, socket.next())
            .await
            .map_err(|_| "timed out waiting for the gateway")?
            .ok_or("connection closed by the gateway")??;
        if let Message::Text(text) = frame {
            return Ok(serde_json::from_str(text.as_str())?);
        }
    }
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
