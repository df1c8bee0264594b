//! A simulated network bridge for exercising links without hardware.
//!
//! Every catalog command gets a handler; anything else lands on the
//! `invalid-cmd` fallback, which answers with the rejected code. Replies
//! are queued by the handlers and written after each read.

use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serialcmd_frame::{
    Dispatcher, Frame, FrameConfig, FrameError, SerialInterface, MAX_PAYLOAD_SIZE,
};
use serialcmd_proto::{
    AliasInfo, ApInfo, Command, ConnectionInfo, IpInfo, MemPage, NetworkState, Payload,
    ProtoError, ServerInfo, MEM_PAGE_SIZE,
};
use serialcmd_transport::{MonotonicClock, SerialStream, UnixDomainSocket};

use crate::cmd::{parse_duration, SimulateArgs};
use crate::exit::{frame_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::OutputFormat;

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const MEMORY_SIZE: usize = 4096;

/// Simulated firmware state shared by all handlers.
#[derive(Debug)]
pub struct Device {
    name: String,
    memory: Vec<u8>,
    ap: ApInfo,
    server: ServerInfo,
    pub_aliases: BTreeMap<u8, String>,
    sub_aliases: BTreeMap<u8, String>,
    subscriptions: BTreeSet<String>,
    link: ConnectionInfo,
    time_offset: i64,
    outbox: Vec<Frame<u8>>,
}

impl Device {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            memory: vec![0; MEMORY_SIZE],
            ap: ApInfo::default(),
            server: ServerInfo::default(),
            pub_aliases: BTreeMap::new(),
            sub_aliases: BTreeMap::new(),
            subscriptions: BTreeSet::new(),
            link: ConnectionInfo {
                ap: NetworkState::Disconnected,
                server: NetworkState::Disconnected,
            },
            time_offset: 0,
            outbox: Vec::new(),
        }
    }

    /// Replies queued since the last call.
    pub fn take_replies(&mut self) -> Vec<Frame<u8>> {
        std::mem::take(&mut self.outbox)
    }

    /// Handle one catalog command. Malformed payloads are answered like
    /// unknown commands.
    pub fn handle(&mut self, command: Command, payload: &[u8]) {
        if let Err(err) = self.apply(command, payload) {
            tracing::warn!(%command, error = %err, "rejecting command payload");
            self.reject(command.code());
        }
    }

    /// Answer a code the catalog does not know.
    pub fn reject(&mut self, code: u8) {
        self.reply(Command::InvalidCmd, vec![code]);
    }

    fn reply(&mut self, command: Command, payload: impl Into<Vec<u8>>) {
        let mut payload = payload.into();
        payload.truncate(MAX_PAYLOAD_SIZE);
        self.outbox.push(Frame::new(command.code(), payload));
    }

    fn reply_with<P: Payload>(&mut self, command: Command, payload: &P) -> Result<(), ProtoError> {
        let frame = payload.to_frame(command)?;
        self.outbox.push(frame);
        Ok(())
    }

    fn ack(&mut self, command: Command) {
        self.reply(command, Vec::new());
    }

    fn apply(&mut self, command: Command, payload: &[u8]) -> Result<(), ProtoError> {
        match command {
            Command::NoCmd
            | Command::Save
            | Command::StartNetworkHelper
            | Command::StopNetworkHelper => self.ack(command),
            Command::GetDeviceName => {
                let name = self.name.clone();
                self.reply(command, name.into_bytes());
            }
            Command::Version => self.reply(command, env!("CARGO_PKG_VERSION").as_bytes()),
            Command::MemRead => {
                let request = MemPage::decode(payload)?;
                let range = self.page_range(request.addr, usize::from(request.count))?;
                let page = MemPage::with_data(request.addr, self.memory[range].to_vec())?;
                self.reply_with(command, &page)?;
            }
            Command::MemWrite => {
                let page = MemPage::decode(payload)?;
                let range = self.page_range(page.addr, page.data.len())?;
                self.memory[range].copy_from_slice(&page.data);
                self.ack(command);
            }
            Command::Reboot => {
                self.link = ConnectionInfo {
                    ap: NetworkState::Disconnected,
                    server: NetworkState::Disconnected,
                };
                self.subscriptions.clear();
                self.ack(command);
            }
            Command::SetApInfo => {
                self.ap = ApInfo::decode(payload)?;
                self.ack(command);
            }
            Command::GetApInfo => {
                let ap = self.ap.clone();
                self.reply_with(command, &ap)?;
            }
            Command::ConnectToAp => {
                self.link.ap = if self.ap.ssid.is_empty() {
                    NetworkState::Disconnected
                } else {
                    NetworkState::ConnectedToAp
                };
                self.ack(command);
            }
            Command::DisconnectFromAp | Command::StopAp => {
                self.link = ConnectionInfo {
                    ap: NetworkState::Disconnected,
                    server: NetworkState::Disconnected,
                };
                self.ack(command);
            }
            Command::StartAp => {
                self.link.ap = NetworkState::ActingAsAp;
                self.ack(command);
            }
            Command::GetIp => {
                let ip = match self.link.ap {
                    NetworkState::ActingAsAp => Ipv4Addr::new(192, 168, 4, 1),
                    NetworkState::ConnectedToAp => Ipv4Addr::new(10, 0, 0, 42),
                    _ => Ipv4Addr::UNSPECIFIED,
                };
                self.reply_with(command, &IpInfo { ip })?;
            }
            Command::SetServerInfo => {
                self.server = ServerInfo::decode(payload)?;
                self.ack(command);
            }
            Command::GetServerInfo => {
                let server = self.server.clone();
                self.reply_with(command, &server)?;
            }
            Command::ConnectToServer => {
                // The broker link reuses the access point states.
                self.link.server = if self.link.ap == NetworkState::ConnectedToAp
                    && !self.server.addr.is_empty()
                {
                    NetworkState::ConnectedToAp
                } else {
                    NetworkState::Disconnected
                };
                self.ack(command);
            }
            Command::DisconnectFromServer => {
                self.link.server = NetworkState::Disconnected;
                self.ack(command);
            }
            Command::SetPubAlias | Command::SetSubAlias => {
                let alias = AliasInfo::decode(payload)?;
                let table = if command == Command::SetPubAlias {
                    &mut self.pub_aliases
                } else {
                    &mut self.sub_aliases
                };
                table.insert(alias.index, alias.alias);
                self.ack(command);
            }
            Command::AddSubscription => {
                self.subscriptions.insert(topic(payload)?);
                self.ack(command);
            }
            Command::RemoveSubscription => {
                self.subscriptions.remove(&topic(payload)?);
                self.ack(command);
            }
            Command::GetConnectionInfo => {
                let link = self.link;
                self.reply_with(command, &link)?;
            }
            Command::PublishInfo => {
                tracing::info!(size = payload.len(), "publish requested");
                self.ack(command);
            }
            Command::Time => {
                let now = self.now_unix_seconds();
                self.reply(command, now.to_le_bytes());
            }
            Command::SetTimeOffset => {
                let raw: [u8; 4] = payload
                    .get(..4)
                    .and_then(|raw| raw.try_into().ok())
                    .ok_or(ProtoError::Truncated {
                        expected: 4,
                        actual: payload.len(),
                    })?;
                self.time_offset = i64::from(i32::from_le_bytes(raw));
                self.ack(command);
            }
            Command::InvalidCmd => self.reject(command.code()),
        }
        Ok(())
    }

    fn page_range(&self, addr: u16, len: usize) -> Result<std::ops::Range<usize>, ProtoError> {
        let start = usize::from(addr);
        let end = start + len;
        if len > MEM_PAGE_SIZE || end > self.memory.len() {
            return Err(ProtoError::FieldTooLong {
                field: "addr",
                actual: end,
                max: self.memory.len(),
            });
        }
        Ok(start..end)
    }

    fn now_unix_seconds(&self) -> u32 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let shifted = i64::try_from(now).unwrap_or(i64::MAX) + self.time_offset;
        u32::try_from(shifted.max(0)).unwrap_or(u32::MAX)
    }
}

fn topic(payload: &[u8]) -> Result<String, ProtoError> {
    let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
    std::str::from_utf8(&payload[..end])
        .map(str::to_string)
        .map_err(|_| ProtoError::InvalidUtf8("topic"))
}

/// Route every catalog command to `device`, with `invalid-cmd` as fallback.
pub fn device_dispatcher(device: &Arc<Mutex<Device>>) -> Dispatcher<u8> {
    let mut builder = Dispatcher::builder();
    for &command in Command::ALL {
        if command == Command::InvalidCmd {
            continue;
        }
        let device = Arc::clone(device);
        builder = builder.on(command.code(), move |_, payload| {
            device
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .handle(command, payload)
        });
    }

    let device = Arc::clone(device);
    builder
        .fallback(Command::INVALID, move |code, _| {
            tracing::debug!(code, "unknown command");
            device
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .reject(code)
        })
        .build()
}

pub fn run(args: SimulateArgs, _format: OutputFormat) -> CliResult<i32> {
    let config = FrameConfig {
        stale_timeout: parse_duration(&args.stale_timeout)?,
        read_timeout: Some(POLL_INTERVAL),
        ..FrameConfig::default()
    };
    config
        .validate()
        .map_err(|err| frame_error("invalid options", err))?;

    let socket =
        UnixDomainSocket::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;
    tracing::info!(path = %socket.path().display(), name = %args.device_name, "simulator ready");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let device = Arc::new(Mutex::new(Device::new(args.device_name)));

    while let Some(stream) = super::accept_until_stopped(&socket, &running)? {
        if let Err(err) = serve(stream, &device, &config, &running) {
            tracing::warn!(error = %err, "link ended with error");
        }
    }

    Ok(SUCCESS)
}

fn serve(
    stream: SerialStream,
    device: &Arc<Mutex<Device>>,
    config: &FrameConfig,
    running: &AtomicBool,
) -> CliResult<()> {
    let mut source = stream
        .try_clone()
        .map_err(|err| transport_error("clone failed", err))?;
    source
        .set_read_timeout(config.read_timeout)
        .map_err(|err| transport_error("configure failed", err))?;

    let mut link = SerialInterface::with_config(
        MonotonicClock::new(),
        stream,
        device_dispatcher(device),
        config.clone(),
    );
    tracing::info!("link connected");

    while running.load(Ordering::SeqCst) {
        match link.pump(&mut source) {
            Ok(_) => {}
            Err(FrameError::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                continue
            }
            Err(FrameError::ConnectionClosed) => break,
            Err(err) => return Err(frame_error("receive failed", err)),
        }

        let replies = device
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take_replies();
        for reply in replies {
            link.send(reply.command, Some(reply.payload.as_ref()))
                .map_err(|err| frame_error("reply failed", err))?;
        }
    }

    let stats = link.parser().stats();
    tracing::info!(
        frames = stats.frames,
        dropped = stats.dropped(),
        "link closed"
    );
    Ok(())
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
