use chanmux_frame::DEFAULT_MAX_MESSAGE_SIZE;
use chanmux_mux::{DEFAULT_CHANNEL_BUFFER, DEFAULT_READ_CHUNK_SIZE};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("chanmux {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: chanmux");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("CHANMUX_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("default_max_message_size: {DEFAULT_MAX_MESSAGE_SIZE}");
    println!("default_channel_buffer: {DEFAULT_CHANNEL_BUFFER}");
    println!("default_read_chunk_size: {DEFAULT_READ_CHUNK_SIZE}");

    Ok(SUCCESS)
}
