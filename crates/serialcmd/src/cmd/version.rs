use serialcmd_frame::{DEFAULT_STALE_TIMEOUT, ETX, MAX_PAYLOAD_SIZE, STX};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("serialcmd {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: serialcmd");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("SERIALCMD_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "framing: stx=0x{STX:02X} etx=0x{ETX:02X} max_payload={MAX_PAYLOAD_SIZE} stale={}ms",
        DEFAULT_STALE_TIMEOUT.as_millis()
    );
    println!("features: async={}, cli=true", cfg!(feature = "async"));

    Ok(SUCCESS)
}
