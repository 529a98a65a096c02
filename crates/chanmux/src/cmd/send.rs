use std::fs;
use std::time::Duration;

use bytes::Bytes;
use chanmux_mux::{ChannelOptions, Multiplexer};
use chanmux_transport::UnixDomainSocket;
use tracing::debug;

use crate::cmd::{parse_duration, Context, SendArgs};
use crate::exit::{
    channel_error, io_error, mux_error, transport_error, CliError, CliResult, SUCCESS, TIMEOUT,
    USAGE,
};
use crate::output::print_received;

pub async fn run(args: SendArgs, ctx: &Context) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = resolve_payload(&args)?;

    let stream = UnixDomainSocket::connect(&args.path)
        .await
        .map_err(|err| transport_error("connect failed", err))?;
    let (mux, _incoming) = Multiplexer::with_config(stream, ctx.config.clone());

    let name = args.name.clone().unwrap_or_default();
    let reply = exchange(&mux, name, payload, args.wait.then_some(wait_timeout)).await;
    mux.destroy("send finished");

    if let Some(reply) = reply? {
        print_received(&reply.name, reply.index, &reply.payload, ctx.format);
    }
    Ok(SUCCESS)
}

#[derive(Debug)]
struct Reply {
    name: Bytes,
    index: Option<u64>,
    payload: Bytes,
}

/// Write `payload` on a fresh channel and end it. With `wait`, collect
/// what the peer sends back until it ends the channel.
async fn exchange(
    mux: &Multiplexer,
    name: String,
    payload: Vec<u8>,
    wait: Option<Duration>,
) -> CliResult<Option<Reply>> {
    let mut channel = mux
        .create_channel(name, ChannelOptions::default())
        .await
        .map_err(|err| mux_error("open failed", err))?;
    let size = payload.len();
    if !payload.is_empty() {
        channel
            .write(payload)
            .await
            .map_err(|err| mux_error("send failed", err))?;
    }
    channel
        .end()
        .await
        .map_err(|err| mux_error("send failed", err))?;
    debug!(index = ?channel.index(), size, "payload sent");

    let Some(wait) = wait else {
        return Ok(None);
    };
    let payload = tokio::time::timeout(wait, channel.read_to_end())
        .await
        .map_err(|_| CliError::new(TIMEOUT, format!("no reply within {wait:?}")))?
        .map_err(|err| channel_error("receive failed", err))?;
    Ok(Some(Reply {
        name: channel.name().clone(),
        index: channel.index(),
        payload,
    }))
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}
