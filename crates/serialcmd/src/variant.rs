use clap::ValueEnum;
use serde::Serialize;
use serde_json::{json, Value};
use serialcmd_frame::{CommandId, CommandPair};
use serialcmd_proto::{
    ApInfo, Command, ConnectionInfo, IpInfo, MemPage, Payload, ProtoError, ServerInfo,
};

use crate::exit::{proto_error, CliError, CliResult, USAGE};

/// Command field layout on the wire.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Variant {
    /// One numeric byte, named by the network bridge catalog.
    #[default]
    Byte,
    /// Two ASCII characters.
    Pair,
}

/// Command identifiers the CLI can parse, label and describe.
pub trait CliCommand: CommandId {
    fn parse_arg(input: &str) -> CliResult<Self>;

    fn label(self) -> String;

    /// Wire bytes of the identifier as upper-case hex.
    fn code_hex(self) -> String {
        hex::encode_upper(&self.to_wire()[..Self::WIDTH])
    }

    /// Structured view of a reply payload, when the command is known.
    fn describe(self, _payload: &[u8]) -> Option<Value> {
        None
    }
}

impl CliCommand for u8 {
    /// Catalog names, decimal or `0x` codes. Codes outside the catalog are
    /// accepted so unknown-command handling can be exercised.
    fn parse_arg(input: &str) -> CliResult<Self> {
        match Command::parse_loose(input) {
            Ok(command) => Ok(command.code()),
            Err(ProtoError::UnknownCommand(code)) => Ok(code),
            Err(err) => Err(proto_error("invalid --cmd", err)),
        }
    }

    fn label(self) -> String {
        Command::try_from(self)
            .map(|command| command.to_string())
            .unwrap_or_else(|_| format!("0x{self:02X}"))
    }

    fn describe(self, payload: &[u8]) -> Option<Value> {
        describe_reply(Command::try_from(self).ok()?, payload)
    }
}

impl CliCommand for CommandPair {
    fn parse_arg(input: &str) -> CliResult<Self> {
        input
            .parse()
            .map_err(|err: String| CliError::new(USAGE, format!("invalid --cmd: {err}")))
    }

    fn label(self) -> String {
        self.to_string()
    }
}

fn layout<P: Payload + Serialize>(payload: &[u8]) -> Option<Value> {
    P::decode(payload)
        .ok()
        .and_then(|decoded| serde_json::to_value(decoded).ok())
}

fn text(payload: &[u8]) -> Value {
    let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
    Value::String(String::from_utf8_lossy(&payload[..end]).into_owned())
}

/// Decode what the bridge sends back for `command`.
pub fn describe_reply(command: Command, payload: &[u8]) -> Option<Value> {
    match command {
        Command::Version | Command::GetDeviceName => Some(text(payload)),
        Command::MemRead => layout::<MemPage>(payload),
        Command::GetApInfo => layout::<ApInfo>(payload),
        Command::GetIp => layout::<IpInfo>(payload),
        Command::GetServerInfo => layout::<ServerInfo>(payload),
        Command::GetConnectionInfo => layout::<ConnectionInfo>(payload),
        Command::Time => {
            let raw: [u8; 4] = payload.get(..4)?.try_into().ok()?;
            Some(json!({ "unix_seconds": u32::from_le_bytes(raw) }))
        }
        Command::InvalidCmd => {
            let rejected = *payload.first()?;
            Some(json!({ "rejected": rejected.label() }))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serialcmd_proto::NetworkState;

    use super::*;

    #[test]
    fn byte_commands_parse_by_name_or_code() {
        assert_eq!(u8::parse_arg("get-ip").unwrap(), 15);
        assert_eq!(u8::parse_arg("0x02").unwrap(), 2);
        assert_eq!(u8::parse_arg("200").unwrap(), 200);
        assert_eq!(u8::parse_arg("bogus").unwrap_err().code, USAGE);
    }

    #[test]
    fn byte_labels_fall_back_to_hex() {
        assert_eq!(26u8.label(), "time");
        assert_eq!(0xC8u8.label(), "0xC8");
        assert_eq!(0x1Bu8.code_hex(), "1B");
    }

    #[test]
    fn pair_commands_parse_two_characters() {
        let pair = CommandPair::parse_arg("vr").unwrap();
        assert_eq!(pair.label(), "VR");
        assert_eq!(pair.code_hex(), "5652");
        assert!(pair.describe(b"anything").is_none());
        assert_eq!(CommandPair::parse_arg("VRX").unwrap_err().code, USAGE);
    }

    #[test]
    fn replies_are_described() {
        let info = ConnectionInfo {
            ap: NetworkState::ActingAsAp,
            server: NetworkState::Disconnected,
        };
        let payload = info.to_bytes().unwrap();
        assert_eq!(
            24u8.describe(&payload).unwrap(),
            json!({ "ap": "acting-as-ap", "server": "disconnected" })
        );
        assert_eq!(2u8.describe(b"1.4.2\0\0").unwrap(), json!("1.4.2"));
        assert_eq!(
            28u8.describe(&[0x40]).unwrap(),
            json!({ "rejected": "0x40" })
        );
        assert!(5u8.describe(&[]).is_none());
        assert!(26u8.describe(&[1, 2]).is_none());
    }
}
