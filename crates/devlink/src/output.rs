use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use devlink_comm::HandshakeOutcome;
use devlink_frame::Message;
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

#[derive(Serialize)]
struct MessageOutput<'a> {
    port: &'a str,
    payload_size: usize,
    payload: String,
    timestamp: String,
}

#[derive(Serialize)]
struct ProbeOutput<'a> {
    port: &'a str,
    ready: bool,
    ready_message: String,
    frames_seen: usize,
    frames_dropped: usize,
    elapsed_ms: u128,
}

pub fn print_message(message: &Message, port: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                port,
                payload_size: message.len(),
                payload: payload_preview(message.as_bytes()),
                timestamp: now_unix_seconds(),
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
                .set_header(vec!["PORT", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    port.to_string(),
                    message.len().to_string(),
                    payload_preview(message.as_bytes()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "port={} size={} payload={}",
                port,
                message.len(),
                payload_preview(message.as_bytes())
            );
        }
        OutputFormat::Raw => {
            let mut out = std::io::stdout();
            let _ = out.write_all(message.as_bytes());
            let _ = out.write_all(b"\n");
            let _ = out.flush();
        }
    }
}

pub fn print_probe(outcome: &HandshakeOutcome, port: &str, format: OutputFormat) {
    let ready_message = payload_preview(outcome.ready_message.as_bytes());
    match format {
        OutputFormat::Json => {
            let out = ProbeOutput {
                port,
                ready: true,
                ready_message,
                frames_seen: outcome.frames_seen,
                frames_dropped: outcome.frames_dropped,
                elapsed_ms: outcome.elapsed.as_millis(),
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
                .set_header(vec!["PORT", "READY MESSAGE", "FRAMES", "DROPPED", "ELAPSED"])
                .add_row(vec![
                    port.to_string(),
                    ready_message,
                    outcome.frames_seen.to_string(),
                    outcome.frames_dropped.to_string(),
                    format!("{:?}", outcome.elapsed),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!(
                "port={} ready=true message={} frames={} dropped={} elapsed={:?}",
                port, ready_message, outcome.frames_seen, outcome.frames_dropped, outcome.elapsed
            );
        }
    }
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
