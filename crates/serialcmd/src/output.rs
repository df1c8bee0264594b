use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;
use serialcmd_frame::Frame;

use crate::variant::CliCommand;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    schema_id: &'a str,
    command: String,
    code: String,
    payload_size: usize,
    payload: String,
    payload_hex: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    decoded: Option<Value>,
    source: &'a str,
    timestamp: String,
}

#[derive(Serialize)]
struct EncodedOutput<'a> {
    schema_id: &'a str,
    command: String,
    code: String,
    payload_size: usize,
    wire_size: usize,
    wire_hex: String,
}

pub fn print_frame<C: CliCommand>(frame: &Frame<C>, source: &str, format: OutputFormat) {
    let payload = frame.payload.as_ref();
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                schema_id: "serialcmd/cli/v1/frame-received",
                command: frame.command.label(),
                code: frame.command.code_hex(),
                payload_size: payload.len(),
                payload: payload_preview(payload),
                payload_hex: hex::encode(payload),
                decoded: frame.command.describe(payload),
                source,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let decoded = frame
                .command
                .describe(payload)
                .map(|value| value.to_string())
                .unwrap_or_else(|| payload_preview(payload));
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "CODE", "SIZE", "SOURCE", "PAYLOAD"])
                .add_row(vec![
                    frame.command.label(),
                    frame.command.code_hex(),
                    payload.len().to_string(),
                    source.to_string(),
                    decoded,
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "command={} (0x{}) size={} source={} payload={}",
                frame.command.label(),
                frame.command.code_hex(),
                payload.len(),
                source,
                payload_preview(payload)
            );
        }
        OutputFormat::Raw => {
            print_raw(payload);
        }
    }
}

pub fn print_encoded<C: CliCommand>(
    command: C,
    payload_size: usize,
    wire: &[u8],
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            let out = EncodedOutput {
                schema_id: "serialcmd/cli/v1/frame-encoded",
                command: command.label(),
                code: command.code_hex(),
                payload_size,
                wire_size: wire.len(),
                wire_hex: hex::encode(wire),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "SIZE", "WIRE"])
                .add_row(vec![
                    command.label(),
                    wire.len().to_string(),
                    spaced_hex(wire),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", spaced_hex(wire)),
        OutputFormat::Raw => print_raw(wire),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn spaced_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{byte:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) if !text.chars().any(char::is_control) => text.to_string(),
        _ => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
