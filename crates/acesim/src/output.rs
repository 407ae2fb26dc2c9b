use std::io::{IsTerminal, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use acesim_device::StatsSnapshot;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

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

/// What the device sent back for one request.
#[derive(Debug)]
pub struct Response<'a> {
    pub device: &'a Path,
    pub bytes: &'a [u8],
    /// CRC verdict when the reply was read as a frame.
    pub crc_valid: Option<bool>,
}

#[derive(Serialize)]
struct ResponseOutput {
    device: String,
    response_size: usize,
    response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    crc_valid: Option<bool>,
    timestamp: String,
}

pub fn print_response(response: &Response<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ResponseOutput {
                device: response.device.display().to_string(),
                response_size: response.bytes.len(),
                response: payload_preview(response.bytes),
                crc_valid: response.crc_valid,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let crc = match response.crc_valid {
                Some(true) => "ok",
                Some(false) => "bad",
                None => "-",
            };
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["DEVICE", "SIZE", "CRC", "RESPONSE"])
                .add_row(vec![
                    response.device.display().to_string(),
                    response.bytes.len().to_string(),
                    crc.to_string(),
                    payload_preview(response.bytes),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            print!(
                "device={} size={}",
                response.device.display(),
                response.bytes.len()
            );
            if let Some(valid) = response.crc_valid {
                print!(" crc_valid={valid}");
            }
            println!(" response={}", payload_preview(response.bytes));
        }
        OutputFormat::Raw => {
            print_raw(response.bytes);
        }
    }
}

pub fn print_stats(stats: &StatsSnapshot, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            println!(
                "{}",
                serde_json::to_string(stats).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COUNTER", "VALUE"]);
            for (name, value) in stats_rows(stats) {
                table.add_row(vec![name.to_string(), value.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line = stats_rows(stats)
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join(" ");
            println!("{line}");
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn stats_rows(stats: &StatsSnapshot) -> [(&'static str, u64); 8] {
    [
        ("cycles", stats.cycles),
        ("endpoints_created", stats.endpoints_created),
        ("endpoints_destroyed", stats.endpoints_destroyed),
        ("watchdog_expiries", stats.watchdog_expiries),
        ("frames_received", stats.frames_received),
        ("crc_mismatches", stats.crc_mismatches),
        ("decode_failures", stats.decode_failures),
        ("responses_sent", stats.responses_sent),
    ]
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
