//! Minimal echo server: every channel a client opens is echoed back.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal:
//!   cargo run --features cli -- send /tmp/chanmux-echo-<pid>/echo.sock \
//!     --name greeting --json '{"hello":"world"}' --wait --wait-timeout 3

use std::fs;

use chanmux::mux::{Channel, ChannelOptions, MuxConfig};
use chanmux::transport::UnixDomainSocket;
use chanmux::Multiplexer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sock_dir = std::env::temp_dir().join(format!("chanmux-echo-{}", std::process::id()));
    fs::create_dir_all(&sock_dir)?;
    let sock_path = sock_dir.join("echo.sock");

    let listener = UnixDomainSocket::bind(&sock_path)?;
    eprintln!("Listening on {}", sock_path.display());

    // Accept one client; replies may be written after the client has ended.
    let stream = listener.accept().await?;
    let config =
        MuxConfig::default().with_incoming(ChannelOptions::default().with_half_open(true));
    let (mux, mut incoming) = Multiplexer::with_config(stream, config);

    while let Some(channel) = incoming.accept().await {
        tokio::spawn(echo(channel));
    }
    eprintln!("Client disconnected: {}", mux.closed().await);
    Ok(())
}

async fn echo(mut channel: Channel) {
    let name = String::from_utf8_lossy(channel.name()).into_owned();
    while let Some(Ok(chunk)) = channel.recv().await {
        eprintln!("{name}: {} bytes", chunk.len());
        if channel.write(chunk).await.is_err() {
            return;
        }
    }
    let _ = channel.end().await;
}
