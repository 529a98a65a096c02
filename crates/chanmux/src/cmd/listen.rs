use bytes::Bytes;
use chanmux_mux::{MuxConfig, Multiplexer};
use chanmux_transport::{Transport, UnixDomainSocket};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cmd::{Context, ListenArgs};
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::print_received;

/// One channel's payload, read up to its END.
#[derive(Debug)]
struct Message {
    name: Bytes,
    index: Option<u64>,
    payload: Bytes,
}

pub async fn run(args: ListenArgs, ctx: &Context) -> CliResult<i32> {
    let listener =
        UnixDomainSocket::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;
    info!(path = %listener.path().display(), "listening");

    let (sink, mut messages) = mpsc::unbounded_channel();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut printed = 0usize;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("interrupted, shutting down");
                break;
            }
            accepted = listener.accept() => {
                let stream = accepted.map_err(|err| transport_error("accept failed", err))?;
                tokio::spawn(collect(stream, ctx.config.clone(), sink.clone()));
            }
            Some(message) = messages.recv() => {
                if !wanted(args.names.as_deref(), &message.name) {
                    continue;
                }
                print_received(&message.name, message.index, &message.payload, ctx.format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    return Ok(SUCCESS);
                }
            }
        }
    }

    Ok(SUCCESS)
}

fn wanted(names: Option<&[String]>, name: &[u8]) -> bool {
    names.is_none_or(|names| names.iter().any(|wanted| wanted.as_bytes() == name))
}

async fn collect<T: Transport>(stream: T, config: MuxConfig, sink: mpsc::UnboundedSender<Message>) {
    let (mux, mut incoming) = Multiplexer::with_config(stream, config);
    debug!("connection accepted");

    while let Some(mut channel) = incoming.accept().await {
        let sink = sink.clone();
        tokio::spawn(async move {
            let name = channel.name().clone();
            match channel.read_to_end().await {
                Ok(payload) => {
                    let _ = sink.send(Message {
                        name,
                        index: channel.index(),
                        payload,
                    });
                }
                Err(err) => warn!(
                    name = %String::from_utf8_lossy(&name),
                    error = %err,
                    "channel failed before end"
                ),
            }
        });
    }

    let reason = mux.closed().await;
    debug!(reason = %reason, "connection closed");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chanmux_mux::ChannelOptions;
    use chanmux_transport::memory_pair;
    use tokio::time::timeout;

    use super::*;

    #[test]
    fn name_filter() {
        let names = vec!["logs".to_string(), "metrics".to_string()];
        assert!(wanted(None, b"anything"));
        assert!(wanted(Some(names.as_slice()), b"logs"));
        assert!(!wanted(Some(names.as_slice()), b"other"));
    }

    #[tokio::test]
    async fn complete_channels_are_collected() {
        let (client, server) = memory_pair(4096);
        let (sink, mut messages) = mpsc::unbounded_channel();
        tokio::spawn(collect(server, MuxConfig::default(), sink));
        let (mux, _incoming) = Multiplexer::new(client);

        let channel = mux.create_channel("logs", ChannelOptions::default()).await.unwrap();
        channel.write("line one\n").await.unwrap();
        channel.write("line two\n").await.unwrap();
        channel.end().await.unwrap();

        let message = timeout(Duration::from_secs(5), messages.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.name, "logs");
        assert_eq!(message.index, Some(0));
        assert_eq!(message.payload, "line one\nline two\n");
    }
}
