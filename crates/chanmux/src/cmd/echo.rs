use chanmux_mux::{Channel, MuxConfig, MuxError, Multiplexer};
use chanmux_transport::{Transport, UnixDomainSocket};
use tracing::{debug, info, warn};

use crate::cmd::{Context, EchoArgs};
use crate::exit::{transport_error, CliResult, SUCCESS};

pub async fn run(args: EchoArgs, ctx: &Context) -> CliResult<i32> {
    let listener =
        UnixDomainSocket::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;
    info!(path = %listener.path().display(), "echo server listening");

    let config = echo_config(ctx.config.clone());
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("interrupted, shutting down");
                break;
            }
            accepted = listener.accept() => {
                let stream = accepted.map_err(|err| transport_error("accept failed", err))?;
                tokio::spawn(serve(stream, config.clone()));
            }
        }
    }

    Ok(SUCCESS)
}

/// Replies are written after the peer may already have ended its side.
pub(crate) fn echo_config(config: MuxConfig) -> MuxConfig {
    let incoming = config.incoming.with_half_open(true);
    config.with_incoming(incoming)
}

/// Echo every channel the peer opens on `stream` until it disconnects.
pub(crate) async fn serve<T: Transport>(stream: T, config: MuxConfig) {
    let (mux, mut incoming) = Multiplexer::with_config(stream, config);
    debug!("connection accepted");

    while let Some(channel) = incoming.accept().await {
        tokio::spawn(async move {
            let name = String::from_utf8_lossy(channel.name()).into_owned();
            match echo_channel(channel).await {
                Ok(size) => info!(name = %name, size, "channel echoed"),
                Err(err) => warn!(name = %name, error = %err, "echo failed"),
            }
        });
    }

    let reason = mux.closed().await;
    debug!(reason = %reason, "connection closed");
}

async fn echo_channel(mut channel: Channel) -> Result<u64, MuxError> {
    let mut echoed = 0u64;
    while let Some(chunk) = channel.recv().await {
        let chunk = chunk?;
        echoed += chunk.len() as u64;
        channel.write(chunk).await?;
    }
    channel.end().await?;
    Ok(echoed)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chanmux_mux::{ChannelOptions, Multiplexer};
    use chanmux_transport::memory_pair;
    use tokio::time::timeout;

    use super::*;

    #[test]
    fn echo_config_forces_half_open_incoming() {
        let config = echo_config(MuxConfig::default().with_channel_buffer(2));
        assert!(config.incoming.half_open);
        assert_eq!(config.channel_buffer, 2);
    }

    #[tokio::test]
    async fn channels_are_echoed_and_ended() {
        let (client, server) = memory_pair(4096);
        tokio::spawn(serve(server, echo_config(MuxConfig::default())));
        let (mux, _incoming) = Multiplexer::new(client);

        let mut first = mux
            .create_channel("one", ChannelOptions::default())
            .await
            .unwrap();
        let mut second = mux.create_channel("", ChannelOptions::default()).await.unwrap();
        first.write("hello ").await.unwrap();
        second.write("other").await.unwrap();
        first.write("world").await.unwrap();
        first.end().await.unwrap();
        second.end().await.unwrap();

        let wait = Duration::from_secs(5);
        let echoed = timeout(wait, first.read_to_end()).await.unwrap().unwrap();
        assert_eq!(echoed, "hello world");
        let echoed = timeout(wait, second.read_to_end()).await.unwrap().unwrap();
        assert_eq!(echoed, "other");
    }
}
