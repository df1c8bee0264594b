use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ProtoError;

macro_rules! commands {
    ($($variant:ident = $code:literal => $name:literal),+ $(,)?) => {
        /// Commands understood by the network bridge firmware.
        ///
        /// Codes are contiguous; [`Command::InvalidCmd`] is the last entry and
        /// doubles as the fallback handler key for unknown codes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(rename_all = "kebab-case")]
        #[repr(u8)]
        pub enum Command {
            $($variant = $code,)+
        }

        impl Command {
            /// Every command in code order.
            pub const ALL: &'static [Command] = &[$(Command::$variant,)+];

            /// Kebab-case name used on the command line.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Command::$variant => $name,)+
                }
            }
        }

        impl TryFrom<u8> for Command {
            type Error = ProtoError;

            fn try_from(code: u8) -> Result<Self, Self::Error> {
                match code {
                    $($code => Ok(Command::$variant),)+
                    other => Err(ProtoError::UnknownCommand(other)),
                }
            }
        }
    };
}

commands! {
    NoCmd = 0 => "no-cmd",
    GetDeviceName = 1 => "get-device-name",
    Version = 2 => "version",
    MemRead = 3 => "mem-read",
    MemWrite = 4 => "mem-write",
    Save = 5 => "save",
    Reboot = 6 => "reboot",
    SetApInfo = 7 => "set-ap-info",
    GetApInfo = 8 => "get-ap-info",
    ConnectToAp = 9 => "connect-to-ap",
    DisconnectFromAp = 10 => "disconnect-from-ap",
    StartAp = 11 => "start-ap",
    StopAp = 12 => "stop-ap",
    StartNetworkHelper = 13 => "start-network-helper",
    StopNetworkHelper = 14 => "stop-network-helper",
    GetIp = 15 => "get-ip",
    SetServerInfo = 16 => "set-server-info",
    GetServerInfo = 17 => "get-server-info",
    ConnectToServer = 18 => "connect-to-server",
    DisconnectFromServer = 19 => "disconnect-from-server",
    SetPubAlias = 20 => "set-pub-alias",
    SetSubAlias = 21 => "set-sub-alias",
    AddSubscription = 22 => "add-subscription",
    RemoveSubscription = 23 => "remove-subscription",
    GetConnectionInfo = 24 => "get-connection-info",
    PublishInfo = 25 => "publish-info",
    Time = 26 => "time",
    SetTimeOffset = 27 => "set-time-offset",
    InvalidCmd = 28 => "invalid-cmd",
}

impl Command {
    /// Wire code of the fallback command.
    pub const INVALID: u8 = Command::InvalidCmd as u8;

    /// Wire code of this command.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Resolve a command from its name, its decimal code or a `0x` hex code.
    pub fn parse_loose(input: &str) -> Result<Self, ProtoError> {
        let trimmed = input.trim();
        if let Some(hex) = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            let code = u8::from_str_radix(hex, 16)
                .map_err(|_| ProtoError::UnknownCommandName(input.to_string()))?;
            return Command::try_from(code);
        }
        if let Ok(code) = trimmed.parse::<u8>() {
            return Command::try_from(code);
        }
        trimmed.parse()
    }
}

impl From<Command> for u8 {
    fn from(command: Command) -> Self {
        command.code()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Command {
    type Err = ProtoError;

    /// Names are matched case-insensitively; `_` is accepted for `-`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Command::ALL
            .iter()
            .copied()
            .find(|command| command.name() == normalized)
            .ok_or_else(|| ProtoError::UnknownCommandName(s.to_string()))
    }
}

/// Link state reported in [`ConnectionInfo`](crate::ConnectionInfo).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum NetworkState {
    #[default]
    NoChange = 0,
    Disconnected = 1,
    ConnectingToAp = 2,
    ConnectedToAp = 3,
    ActingAsAp = 4,
    UnknownState = 5,
}

impl TryFrom<u8> for NetworkState {
    type Error = ProtoError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(NetworkState::NoChange),
            1 => Ok(NetworkState::Disconnected),
            2 => Ok(NetworkState::ConnectingToAp),
            3 => Ok(NetworkState::ConnectedToAp),
            4 => Ok(NetworkState::ActingAsAp),
            5 => Ok(NetworkState::UnknownState),
            other => Err(ProtoError::UnknownNetworkState(other)),
        }
    }
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NetworkState::NoChange => "no-change",
            NetworkState::Disconnected => "disconnected",
            NetworkState::ConnectingToAp => "connecting-to-ap",
            NetworkState::ConnectedToAp => "connected-to-ap",
            NetworkState::ActingAsAp => "acting-as-ap",
            NetworkState::UnknownState => "unknown-state",
        };
        f.write_str(name)
    }
}
