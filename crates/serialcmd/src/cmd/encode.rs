use bytes::BytesMut;
use serialcmd_frame::{try_encode_frame, CommandPair};

use crate::cmd::{resolve_payload, EncodeArgs};
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_encoded, OutputFormat};
use crate::variant::{CliCommand, Variant};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    match args.variant {
        Variant::Byte => encode::<u8>(&args, format),
        Variant::Pair => encode::<CommandPair>(&args, format),
    }
}

fn encode<C: CliCommand>(args: &EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let command = C::parse_arg(&args.cmd)?;
    let payload = resolve_payload(&args.payload)?;
    let wire = encode_to_vec(command, &payload)?;
    print_encoded(command, payload.len(), &wire, format);
    Ok(SUCCESS)
}

fn encode_to_vec<C: CliCommand>(command: C, payload: &[u8]) -> CliResult<Vec<u8>> {
    let mut wire = BytesMut::new();
    try_encode_frame(command, payload, &mut wire)
        .map_err(|err| frame_error("encode failed", err))?;
    Ok(wire.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit::DATA_INVALID;

    #[test]
    fn encodes_byte_and_pair_commands() {
        assert_eq!(
            encode_to_vec(2u8, &[]).unwrap(),
            vec![0x55, 0x02, 0x00, 0xAA]
        );
        assert_eq!(
            encode_to_vec(CommandPair::new(b'm', b'r'), &[0x10]).unwrap(),
            vec![0x55, b'M', b'R', 0x01, 0x10, 0xAA]
        );
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let err = encode_to_vec(1u8, &[0; 129]).unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
    }
}
