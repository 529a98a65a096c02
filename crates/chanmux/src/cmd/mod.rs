use clap::{Args, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chanmux_mux::MuxConfig;

use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, USAGE};
use crate::output::OutputFormat;

pub mod echo;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Echo every incoming channel back to its sender.
    Echo(EchoArgs),
    /// Open one channel, send a payload and end it.
    Send(SendArgs),
    /// Print the complete payload of every incoming channel.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Context {
    pub format: OutputFormat,
    pub config: MuxConfig,
}

pub async fn run(command: Command, ctx: Context) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args, &ctx).await,
        Command::Send(args) => send::run(args, &ctx).await,
        Command::Listen(args) => listen::run(args, &ctx).await,
        Command::Version(args) => version::run(args),
    }
}

/// Read a JSON `MuxConfig`; missing fields keep their defaults.
pub fn load_config(path: Option<&Path>) -> CliResult<MuxConfig> {
    let Some(path) = path else {
        return Ok(MuxConfig::default());
    };
    let raw = fs::read_to_string(path)
        .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
    serde_json::from_str(&raw).map_err(|err| {
        CliError::new(
            DATA_INVALID,
            format!("invalid config {}: {err}", path.display()),
        )
    })
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Socket path to bind.
    pub path: PathBuf,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Channel name. Omit to open an unnamed channel.
    #[arg(long, short = 'n')]
    pub name: Option<String>,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Wait for the peer to end the channel and print what it sent back.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Only print channels with these names (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub names: Option<Vec<String>>,
    /// Exit after printing N channels.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }

    #[test]
    fn missing_config_path_uses_defaults() {
        assert_eq!(load_config(None).unwrap(), MuxConfig::default());
    }

    #[test]
    fn config_file_is_parsed_and_validated() {
        let dir = std::env::temp_dir().join(format!("chanmux-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let good = dir.join("good.json");
        fs::write(&good, r#"{"channel_buffer": 4, "incoming": {"half_open": true}}"#).unwrap();
        let config = load_config(Some(good.as_path())).unwrap();
        assert_eq!(config.channel_buffer, 4);
        assert!(config.incoming.half_open);

        let bad = dir.join("bad.json");
        fs::write(&bad, "{not json").unwrap();
        assert_eq!(load_config(Some(bad.as_path())).unwrap_err().code, DATA_INVALID);

        let _ = fs::remove_dir_all(&dir);
    }
}
