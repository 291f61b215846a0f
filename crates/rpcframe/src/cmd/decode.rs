use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use rpcframe_demux::{DecodeError, DecodedResponse, FrameDecoder, StreamRegistry, TextChannel};
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::cmd::{parse_duration, parse_size, DecodeArgs};
use crate::exit::{decode_error, io_error, CliError, CliResult, INTERNAL, SUCCESS, TIMEOUT};
use crate::output::{print_report, DecodeReport, OutputFormat, StreamReport};

/// Why text collection stopped.
enum Stop {
    Finished(Option<DecodeError>),
    TimedOut(Duration),
    Interrupted,
}

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.limits.decoder_config()?;
    let chunk_size = parse_size(&args.chunk_size)?;
    let timeout = args.timeout.as_deref().map(parse_duration).transpose()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", &err))?;

    runtime.block_on(async move {
        let input = open_input(&args.input).await?;
        let decoder = FrameDecoder::new(config);
        let limits = decoder.config();
        debug!(
            max_payload = limits.max_frame_payload_bytes,
            max_buffered = limits.max_buffered_bytes,
            max_streams = limits.max_concurrent_streams,
            chunk_size,
            "decoding framed response"
        );
        let response = decoder.decode(ReaderStream::with_capacity(input, chunk_size));
        let (report, stop) = collect(response, timeout, args.out_dir.as_deref()).await?;
        print_report(&report, format);

        match stop {
            Stop::Finished(None) => Ok(SUCCESS),
            Stop::Finished(Some(err)) => Err(decode_error("decode failed", &err)),
            Stop::TimedOut(after) => Err(CliError::new(
                TIMEOUT,
                format!("decode cancelled after {after:?}"),
            )),
            Stop::Interrupted => Err(decode_error("decode interrupted", &DecodeError::Cancelled)),
        }
    })
}

async fn open_input(path: &Path) -> CliResult<Box<dyn AsyncRead + Send + Unpin>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(tokio::io::stdin()));
    }
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|err| io_error(&format!("failed opening {}", path.display()), &err))?;
    Ok(Box::new(file))
}

async fn collect(
    mut response: DecodedResponse,
    timeout: Option<Duration>,
    out_dir: Option<&Path>,
) -> CliResult<(DecodeReport, Stop)> {
    let mut text = Vec::new();
    let stop = {
        let timer = async {
            match timeout {
                Some(after) => tokio::time::sleep(after).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            failure = read_text(&mut response.text, &mut text) => Stop::Finished(failure),
            _ = timer => Stop::TimedOut(timeout.unwrap_or_default()),
            Ok(()) = tokio::signal::ctrl_c() => Stop::Interrupted,
        }
    };
    if !matches!(stop, Stop::Finished(_)) {
        warn!("cancelling framed response");
        response.text.cancel();
    }

    let outcome = response
        .driver
        .await
        .map_err(|err| CliError::new(INTERNAL, format!("decoder task failed: {err}")))?;
    debug!(
        phase = outcome.phase.name(),
        frames = outcome.frames,
        bytes = outcome.bytes,
        "decoder finished"
    );

    if let Some(dir) = out_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|err| io_error(&format!("failed creating {}", dir.display()), &err))?;
    }
    let streams = read_streams(&response.streams, out_dir).await?;
    info!(
        messages = text.len(),
        streams = streams.len(),
        "framed response decoded"
    );

    let error = match &stop {
        Stop::Finished(failure) => failure.as_ref().map(ToString::to_string),
        Stop::TimedOut(_) | Stop::Interrupted => Some(DecodeError::Cancelled.to_string()),
    };
    let report = DecodeReport {
        text,
        streams,
        phase: outcome.phase.name(),
        frames: outcome.frames,
        bytes: outcome.bytes,
        error,
    };
    Ok((report, stop))
}

/// Drain the text channel; returns the decoder's failure if it reported one.
async fn read_text(channel: &mut TextChannel, out: &mut Vec<String>) -> Option<DecodeError> {
    while let Some(message) = channel.next().await {
        match message {
            Ok(message) => out.push(message),
            Err(err) => return Some(err),
        }
    }
    None
}

/// Read every stream the response mentioned. The decoder has finished, so
/// each read completes from what is already buffered.
async fn read_streams(
    registry: &StreamRegistry,
    out_dir: Option<&Path>,
) -> CliResult<Vec<StreamReport>> {
    let mut reports = Vec::new();
    for id in registry.known_stream_ids() {
        let stream = registry
            .get_or_create_stream(id)
            .map_err(|err| decode_error(&format!("stream {id} unavailable"), &err))?;
        let data = stream.clone().read_all().await;
        let state = stream.state().name();

        let report = match data {
            Ok(data) => {
                let output = match out_dir {
                    Some(dir) => Some(write_stream(dir, id, &data).await?),
                    None => None,
                };
                StreamReport {
                    id,
                    state,
                    size: data.len(),
                    output,
                    error: None,
                }
            }
            Err(err) => StreamReport {
                id,
                state,
                size: 0,
                output: None,
                error: Some(err.to_string()),
            },
        };
        reports.push(report);
    }
    Ok(reports)
}

async fn write_stream(dir: &Path, id: u32, data: &[u8]) -> CliResult<String> {
    let path: PathBuf = dir.join(format!("stream-{id}.bin"));
    tokio::fs::write(&path, data)
        .await
        .map_err(|err| io_error(&format!("failed writing {}", path.display()), &err))?;
    Ok(path.display().to_string())
}
