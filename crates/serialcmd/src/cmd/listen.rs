use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serialcmd_frame::{CommandPair, FrameConfig, FrameError, FrameReader};
use serialcmd_transport::{MonotonicClock, SerialStream};

use crate::cmd::ListenArgs;
use crate::exit::{frame_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_frame, OutputFormat};
use crate::variant::{CliCommand, Variant};

/// Read timeout used to notice Ctrl-C between frames.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    /// The link closed; wait for another one.
    Closed,
    /// Stop listening.
    Done,
}

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    match args.link.variant {
        Variant::Byte => listen::<u8>(args, format),
        Variant::Pair => listen::<CommandPair>(args, format),
    }
}

fn listen<C: CliCommand>(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.link.frame_config(Some(POLL_INTERVAL))?;
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;
    let source = args.target.display().to_string();

    if args.bind {
        return listen_bound::<C>(&args, &config, &running, &mut printed, format);
    }

    let stream = SerialStream::open(&args.target, &args.link.line_config(Some(POLL_INTERVAL)))
        .map_err(|err| transport_error("open failed", err))?;
    print_frames::<C>(stream, &config, &source, args.count, &running, &mut printed, format)?;
    Ok(SUCCESS)
}

#[cfg(unix)]
fn listen_bound<C: CliCommand>(
    args: &ListenArgs,
    config: &FrameConfig,
    running: &AtomicBool,
    printed: &mut usize,
    format: OutputFormat,
) -> CliResult<i32> {
    let socket = serialcmd_transport::UnixDomainSocket::bind(&args.target)
        .map_err(|err| transport_error("bind failed", err))?;
    tracing::info!(path = %socket.path().display(), "listening");

    while let Some(stream) = super::accept_until_stopped(&socket, running)? {
        let source = socket.path().display().to_string();
        let flow =
            print_frames::<C>(stream, config, &source, args.count, running, printed, format)?;
        if flow == Flow::Done {
            break;
        }
    }

    Ok(SUCCESS)
}

#[cfg(not(unix))]
fn listen_bound<C: CliCommand>(
    _args: &ListenArgs,
    _config: &FrameConfig,
    _running: &AtomicBool,
    _printed: &mut usize,
    _format: OutputFormat,
) -> CliResult<i32> {
    Err(CliError::new(
        crate::exit::USAGE,
        "--bind requires Unix domain sockets",
    ))
}

fn print_frames<C: CliCommand>(
    stream: SerialStream,
    config: &FrameConfig,
    source: &str,
    count: Option<usize>,
    running: &AtomicBool,
    printed: &mut usize,
    format: OutputFormat,
) -> CliResult<Flow> {
    let mut reader =
        FrameReader::<C, _, _>::with_config_stream(stream, MonotonicClock::new(), config.clone())
            .map_err(|err| frame_error("open failed", err))?;

    let flow = loop {
        if !running.load(Ordering::SeqCst) {
            break Flow::Done;
        }

        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(FrameError::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                continue
            }
            Err(FrameError::ConnectionClosed) => break Flow::Closed,
            Err(err) => return Err(frame_error("receive failed", err)),
        };

        print_frame(&frame, source, format);
        *printed = printed.saturating_add(1);

        if count.is_some_and(|count| *printed >= count) {
            break Flow::Done;
        }
    };

    let stats = reader.parser().stats();
    tracing::debug!(
        frames = stats.frames,
        dropped = stats.dropped(),
        discarded_bytes = stats.discarded_bytes,
        "link closed"
    );
    Ok(flow)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
