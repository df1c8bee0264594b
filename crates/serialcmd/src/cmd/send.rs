use std::io::ErrorKind;
use std::time::{Duration, Instant};

use serialcmd_frame::{Frame, FrameError, FrameReader, FrameWriter};
use serialcmd_transport::{Clock, MonotonicClock, SerialStream};

use crate::cmd::{parse_duration, resolve_payload, SendArgs};
use crate::exit::{frame_error, transport_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_frame, OutputFormat};
use crate::variant::{CliCommand, Variant};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    match args.link.variant {
        Variant::Byte => send::<u8>(args, format),
        Variant::Pair => send::<serialcmd_frame::CommandPair>(args, format),
    }
}

fn send<C: CliCommand>(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let command = C::parse_arg(&args.cmd)?;
    let payload = resolve_payload(&args.payload)?;
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let config = args.link.frame_config(Some(wait_timeout))?;

    let stream = SerialStream::open(&args.target, &args.link.line_config(Some(wait_timeout)))
        .map_err(|err| transport_error("open failed", err))?;
    let reply_stream = if args.wait {
        Some(
            stream
                .try_clone()
                .map_err(|err| transport_error("open failed", err))?,
        )
    } else {
        None
    };

    let mut writer = FrameWriter::with_config_stream(stream, config.clone())
        .map_err(|err| frame_error("open failed", err))?;
    writer
        .send_strict(command, &payload)
        .map_err(|err| frame_error("send failed", err))?;
    tracing::debug!(command = %command.label(), size = payload.len(), "frame sent");

    if let Some(stream) = reply_stream {
        let mut reader =
            FrameReader::<C, _, _>::with_config_stream(stream, MonotonicClock::new(), config)
                .map_err(|err| frame_error("open failed", err))?;
        let frame: Frame<C> = wait_for_response(&mut reader, wait_timeout)?;
        print_frame(&frame, &args.target.display().to_string(), format);
    }

    Ok(SUCCESS)
}

trait ResponseSource<C> {
    fn next_frame(&mut self) -> Result<Frame<C>, FrameError>;
}

impl<C: CliCommand, K: Clock> ResponseSource<C> for FrameReader<C, SerialStream, K> {
    fn next_frame(&mut self) -> Result<Frame<C>, FrameError> {
        self.read_frame()
    }
}

/// Wait for the first complete frame, retrying read timeouts until
/// `timeout` has elapsed.
fn wait_for_response<C, R: ResponseSource<C>>(
    source: &mut R,
    timeout: Duration,
) -> CliResult<Frame<C>> {
    let started = Instant::now();
    loop {
        match source.next_frame() {
            Ok(frame) => return Ok(frame),
            Err(FrameError::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                if started.elapsed() >= timeout {
                    return Err(CliError::new(
                        TIMEOUT,
                        format!("no response within {}ms", timeout.as_millis()),
                    ));
                }
            }
            Err(err) => return Err(frame_error("receive failed", err)),
        }
    }
}
