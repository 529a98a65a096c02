//! Two symmetric peers agree on a duplex stream by name alone.
//!
//! Run with:
//!   cargo run --example shared-channel

use chanmux::transport::memory_pair;
use chanmux::{ChannelOptions, Multiplexer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (left, right) = memory_pair(64 * 1024);
    let (alice, _) = Multiplexer::new(left);
    let (bob, _) = Multiplexer::new(right);

    // Neither side decides who opens; both just ask for "chat".
    let mut at_alice = alice
        .create_shared_channel("chat", ChannelOptions::default())
        .await?;
    let mut at_bob = bob
        .create_shared_channel("chat", ChannelOptions::default())
        .await?;

    at_alice.write("hi bob").await?;
    at_alice.end().await?;
    at_bob.write("hi alice").await?;
    at_bob.end().await?;

    let to_bob = at_bob.read_to_end().await?;
    let to_alice = at_alice.read_to_end().await?;
    println!("bob got: {}", String::from_utf8_lossy(&to_bob));
    println!("alice got: {}", String::from_utf8_lossy(&to_alice));

    at_alice.closed().await;
    at_bob.closed().await;
    Ok(())
}
