use rpcframe_frame::{DEFAULT_MAX_BUFFERED_BYTES, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("rpcframe {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: rpcframe");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("RPCFRAME_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "build_profile: {}",
        option_env!("RPCFRAME_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("wire_header_bytes: {HEADER_SIZE}");
    println!("default_max_payload: {DEFAULT_MAX_PAYLOAD}");
    println!("default_max_buffered: {DEFAULT_MAX_BUFFERED_BYTES}");

    Ok(SUCCESS)
}
