//! Live radio server demo
//!
//! Run with: cargo run --example radio_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example radio_server                    # binds to 0.0.0.0:3000
//!   cargo run --example radio_server localhost          # binds to 127.0.0.1:3000
//!   cargo run --example radio_server 127.0.0.1:3001     # binds to 127.0.0.1:3001
//!
//! ## Listening
//!
//! Any HTTP client that plays a stream:
//!   ffplay http://localhost:3000/stream
//!   curl -s http://localhost:3000/stream | mpv -
//!
//! ## Operating
//!
//! Type a command on stdin:
//!   start        play the program
//!   stop         stop playback
//!   applause     mix the matching effect from audio/fx into the program
//!   status       print the engine status
//!
//! Requires `sox` with mp3 support on the PATH and the assets under `audio/`.

use std::net::SocketAddr;
use std::sync::Arc;

use airwave::{Command, Engine, EngineConfig};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

const DEFAULT_PORT: u16 = 3000;

const RESPONSE_HEADER: &[u8] = b"HTTP/1.1 200 OK\r\n\
Content-Type: audio/mpeg\r\n\
Cache-Control: no-cache\r\n\
Connection: close\r\n\
\r\n";

/// Parse bind address from command line argument.
///
/// Accepts "localhost", "localhost:PORT", "IP" or "IP:PORT".
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: radio_server [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:{})", DEFAULT_PORT);
}

/// Stream the broadcast to one HTTP client until it goes away
async fn serve_listener(engine: Arc<Engine>, mut socket: TcpStream, peer: SocketAddr) {
    // The request itself is not inspected
    let mut request = [0u8; 1024];
    match socket.read(&mut request).await {
        Ok(0) | Err(_) => return,
        Ok(_) => {}
    }

    if let Err(e) = socket.write_all(RESPONSE_HEADER).await {
        tracing::debug!(peer = %peer, error = %e, "Listener left before header");
        return;
    }

    let (id, mut stream) = engine.connect_listener().await;
    tracing::info!(listener = %id, peer = %peer, "Listener connected");

    while let Some(chunk) = stream.recv().await {
        if let Err(e) = socket.write_all(&chunk).await {
            tracing::debug!(listener = %id, error = %e, "Listener write failed");
            break;
        }
    }

    engine.disconnect_listener(id).await;
    tracing::info!(listener = %id, "Listener disconnected");
}

async fn accept_loop(engine: Arc<Engine>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                if let Err(e) = socket.set_nodelay(true) {
                    tracing::error!(error = %e, "Failed to configure socket");
                    continue;
                }
                tokio::spawn(serve_listener(Arc::clone(&engine), socket, peer));
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to accept connection");
            }
        }
    }
}

/// Read operator commands from stdin until it closes
async fn operator_loop(engine: Arc<Engine>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().eq_ignore_ascii_case("status") {
            let status = engine.status().await;
            let stats = engine.fanout_stats();
            println!(
                "phase={} source={:?} rate={}B/s listeners={} sent={}B avg={}bit/s pruned={}",
                status.phase,
                status.source,
                status.bytes_per_sec,
                status.listeners,
                stats.bytes,
                stats.bitrate(),
                stats.pruned
            );
            continue;
        }

        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(_) => continue,
        };

        match engine.execute(command.clone()).await {
            Ok(()) => println!("ok: {}", command),
            Err(e) => println!("error: {}", e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let bind_addr = match args.get(1) {
        Some(addr_str) => match parse_bind_addr(addr_str) {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("airwave=info".parse()?)
                .add_directive("radio_server=debug".parse()?),
        )
        .init();

    let engine = Arc::new(Engine::new(EngineConfig::default()));

    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Radio server listening");
    println!("Listen:  ffplay http://{}/stream", bind_addr);
    println!("Operate: type start, stop, status or an effect name");

    tokio::select! {
        _ = accept_loop(Arc::clone(&engine), listener) => {}
        _ = operator_loop(Arc::clone(&engine)) => {
            println!("Operator input closed");
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
    }

    engine.stop().await?;
    Ok(())
}
