use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

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

/// Everything one channel carried, gathered up to its END.
#[derive(Debug, Serialize)]
pub struct Received<'a> {
    pub channel: &'a str,
    pub index: Option<u64>,
    pub size: usize,
    pub payload: String,
    pub timestamp: String,
}

impl<'a> Received<'a> {
    pub fn new(channel: &'a str, index: Option<u64>, payload: &[u8]) -> Self {
        Self {
            channel,
            index,
            size: payload.len(),
            payload: payload_preview(payload),
            timestamp: now_unix_seconds(),
        }
    }
}

pub fn print_received(name: &[u8], index: Option<u64>, payload: &[u8], format: OutputFormat) {
    let name = String::from_utf8_lossy(name);
    let out = Received::new(&name, index, payload);
    match format {
        OutputFormat::Json => {
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
                .set_header(vec!["CHANNEL", "INDEX", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    out.channel.to_string(),
                    index_label(out.index),
                    out.size.to_string(),
                    out.payload.clone(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "channel={} index={} size={} payload={}",
                out.channel,
                index_label(out.index),
                out.size,
                out.payload
            );
        }
        OutputFormat::Raw => print_raw(payload),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn index_label(index: Option<u64>) -> String {
    index.map_or_else(|| "-".to_string(), |index| index.to_string())
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
