use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use imlink_proto::{content, Envelope};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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

/// One row of envelope output.
#[derive(Serialize)]
struct EnvelopeRow<'a> {
    #[serde(rename = "type")]
    msg_type: String,
    seq: Option<&'a str>,
    msg_id: Option<u64>,
    from: Option<&'a str>,
    to: Option<&'a str>,
    group: Option<&'a str>,
    content_type: Vec<&'static str>,
    content: Option<&'a str>,
}

impl<'a> EnvelopeRow<'a> {
    fn new(envelope: &'a Envelope) -> Self {
        let body = envelope.body.as_ref();
        Self {
            msg_type: type_label(envelope),
            seq: envelope.seq(),
            msg_id: envelope.msg_id(),
            from: body.map(|b| b.from_id.as_str()).filter(|s| !s.is_empty()),
            to: body.and_then(|b| b.to_id.as_deref()),
            group: body.and_then(|b| b.group_id.as_deref()),
            content_type: body
                .and_then(|b| b.content_type)
                .map(content::names)
                .unwrap_or_default(),
            content: body.map(|b| b.content.as_str()).filter(|s| !s.is_empty()),
        }
    }
}

fn type_label(envelope: &Envelope) -> String {
    match envelope.message_type() {
        Some(ty) => ty.to_string(),
        None => format!("UNKNOWN({})", envelope.header.msg_type),
    }
}

/// Print decoded envelopes. JSON emits one object per line.
pub fn print_envelopes(envelopes: &[Envelope], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for envelope in envelopes {
                print_envelope(envelope, format);
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "SEQ", "MSG ID", "FROM", "TO", "CONTENT"]);
            for envelope in envelopes {
                let row = EnvelopeRow::new(envelope);
                table.add_row(vec![
                    row.msg_type,
                    row.seq.unwrap_or("-").to_string(),
                    row.msg_id.map_or_else(|| "-".to_string(), |id| id.to_string()),
                    row.from.unwrap_or("-").to_string(),
                    row.to.or(row.group).unwrap_or("-").to_string(),
                    row.content.unwrap_or("").to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for envelope in envelopes {
                print_envelope(envelope, format);
            }
        }
    }
}

/// Print one envelope as it arrives. Table output degrades to the pretty line form.
pub fn print_envelope(envelope: &Envelope, format: OutputFormat) {
    let row = EnvelopeRow::new(envelope);
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&row).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("{}", pretty_line(&row));
        }
    }
}

fn pretty_line(row: &EnvelopeRow<'_>) -> String {
    let mut line = row.msg_type.clone();
    if let Some(seq) = row.seq {
        line.push_str(&format!(" seq={seq}"));
    }
    if let Some(id) = row.msg_id {
        line.push_str(&format!(" msg_id={id}"));
    }
    if let Some(from) = row.from {
        line.push_str(&format!(" from={from}"));
    }
    if let Some(to) = row.to {
        line.push_str(&format!(" to={to}"));
    }
    if let Some(group) = row.group {
        line.push_str(&format!(" group={group}"));
    }
    if !row.content_type.is_empty() {
        line.push_str(&format!(" content_type={}", row.content_type.join("|")));
    }
    if let Some(content) = row.content {
        line.push_str(&format!(" content={content:?}"));
    }
    line
}

/// Print `(key, value)` pairs as a two-column table, a JSON object or `key: value` lines.
pub fn print_fields<T: Serialize>(value: &T, fields: &[(&str, String)], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (key, value) in fields {
                table.add_row(vec![key.to_string(), value.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (key, value) in fields {
                println!("{key}: {value}");
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}
