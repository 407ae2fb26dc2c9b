use acesim_device::{
    DEFAULT_DEVICE_NAME, DEFAULT_READ_CHUNK_SIZE, DEFAULT_RESTART_BACKOFF,
    DEFAULT_WATCHDOG_TIMEOUT,
};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("acesim {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: acesim");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("ACESIM_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("device_name: {DEFAULT_DEVICE_NAME}");
    println!("watchdog_timeout: {DEFAULT_WATCHDOG_TIMEOUT:?}");
    println!("restart_backoff: {DEFAULT_RESTART_BACKOFF:?}");
    println!("read_chunk_size: {DEFAULT_READ_CHUNK_SIZE}");

    Ok(SUCCESS)
}
