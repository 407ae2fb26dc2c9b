use acesim_device::{DeviceConfig, Orchestrator};
use bytes::Bytes;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cmd::{parse_duration, runtime, RunArgs};
use crate::exit::{device_error, io_error, CliResult, FAILURE, SUCCESS};
use crate::output::{print_stats, OutputFormat};

/// Why the emulator stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    /// SIGTERM: cooperative shutdown.
    Terminated,
    /// SIGINT / Ctrl-C.
    Interrupted,
}

impl Stop {
    fn exit_code(self) -> i32 {
        match self {
            Stop::Terminated => SUCCESS,
            Stop::Interrupted => FAILURE,
        }
    }
}

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let config = device_config(&args)?;
    let orchestrator =
        Orchestrator::new(config).map_err(|err| device_error("invalid configuration", err))?;

    let stop = runtime()?.block_on(serve(&orchestrator))?;

    if args.stats {
        print_stats(&orchestrator.stats().snapshot(), format);
    }
    Ok(stop.exit_code())
}

fn device_config(args: &RunArgs) -> CliResult<DeviceConfig> {
    let runtime_dir = args.runtime_dir.clone().map(|dir| dir.into_os_string());
    let mut config = DeviceConfig::with_runtime_dir(runtime_dir)
        .map_err(|err| device_error("cannot place device link", err))?;

    config.device_name = args.device_name.clone();
    config.watchdog_timeout = parse_duration(&args.watchdog_timeout)?;
    config.restart_backoff = parse_duration(&args.restart_backoff)?;
    config.read_chunk_size = args.chunk_size;
    config.response_mode = args.mode.into();
    config.framed_responses = args.framed;
    if let Some(ack) = &args.ack {
        config.ack_payload = Bytes::from(ack.clone().into_bytes());
    }
    Ok(config)
}

async fn serve(orchestrator: &Orchestrator) -> CliResult<Stop> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|err| io_error("signal handler setup failed", err))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|err| io_error("signal handler setup failed", err))?;

    let shutdown = CancellationToken::new();
    let emulator = orchestrator.run_forever(&shutdown);
    tokio::pin!(emulator);

    let stop = tokio::select! {
        result = &mut emulator => {
            result.map_err(|err| device_error("emulator stopped", err))?;
            return Ok(Stop::Terminated);
        }
        _ = sigterm.recv() => Stop::Terminated,
        _ = sigint.recv() => Stop::Interrupted,
    };

    info!(?stop, "shutting down");
    shutdown.cancel();
    emulator
        .await
        .map_err(|err| device_error("emulator stopped", err))?;
    Ok(stop)
}
