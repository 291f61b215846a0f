use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use rpcframe_frame::{stream_name, Frame};
use serde::Serialize;

const PREVIEW_CHARS: usize = 64;

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

/// Everything `decode` learned about one response.
#[derive(Debug, Serialize)]
pub struct DecodeReport {
    pub text: Vec<String>,
    pub streams: Vec<StreamReport>,
    pub phase: &'static str,
    pub frames: usize,
    pub bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StreamReport {
    pub id: u32,
    pub state: &'static str,
    pub size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One header as listed by `inspect`.
#[derive(Debug, Serialize)]
pub struct FrameRecord {
    pub offset: usize,
    pub frame_type: &'static str,
    pub channel: &'static str,
    pub stream_id: u32,
    pub payload_size: usize,
    pub preview: String,
}

impl FrameRecord {
    pub fn new(offset: usize, frame: &Frame, wire_size: usize) -> Self {
        let preview = match frame {
            Frame::Text(text) => truncate(text),
            Frame::Chunk { data, .. } => payload_preview(data),
            Frame::End { .. } => String::new(),
            Frame::Error { message, .. } => truncate(message),
        };
        Self {
            offset,
            frame_type: frame.frame_type().name(),
            channel: stream_name(frame.stream_id()),
            stream_id: frame.stream_id(),
            payload_size: wire_size - rpcframe_frame::HEADER_SIZE,
            preview,
        }
    }
}

pub fn print_report(report: &DecodeReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut text = Table::new();
            text.load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "TEXT"]);
            for (index, message) in report.text.iter().enumerate() {
                text.add_row(vec![index.to_string(), truncate(message)]);
            }
            println!("{text}");

            if !report.streams.is_empty() {
                let mut streams = Table::new();
                streams
                    .load_preset(UTF8_FULL)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(vec!["STREAM", "STATE", "SIZE", "OUTPUT"]);
                for stream in &report.streams {
                    let detail = stream
                        .error
                        .clone()
                        .or_else(|| stream.output.clone())
                        .unwrap_or_default();
                    streams.add_row(vec![
                        stream.id.to_string(),
                        stream.state.to_string(),
                        stream.size.to_string(),
                        detail,
                    ]);
                }
                println!("{streams}");
            }
            println!(
                "{} frames, {} bytes, {}",
                report.frames, report.bytes, report.phase
            );
        }
        OutputFormat::Pretty => {
            for (index, message) in report.text.iter().enumerate() {
                println!("text[{index}] {}", message.trim_end());
            }
            for stream in &report.streams {
                print!("stream={} state={} size={}", stream.id, stream.state, stream.size);
                if let Some(output) = &stream.output {
                    print!(" output={output}");
                }
                if let Some(error) = &stream.error {
                    print!(" error={error}");
                }
                println!();
            }
            println!(
                "phase={} frames={} bytes={}",
                report.phase, report.frames, report.bytes
            );
        }
        OutputFormat::Raw => {
            for message in &report.text {
                print_raw(message.as_bytes());
            }
        }
    }
}

/// Print one `inspect` record. Table output is batched by the caller.
pub fn print_frame(record: &FrameRecord, frame: &Frame, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Pretty => {
            println!(
                "offset={} type={} stream={} ({}) size={} {}",
                record.offset,
                record.frame_type,
                record.stream_id,
                record.channel,
                record.payload_size,
                record.preview
            );
        }
        OutputFormat::Raw => match frame {
            Frame::Text(text) => print_raw(text.as_bytes()),
            Frame::Chunk { data, .. } => print_raw(data),
            Frame::Error { message, .. } => print_raw(message.as_bytes()),
            Frame::End { .. } => {}
        },
        OutputFormat::Table => {}
    }
}

pub fn print_frame_table(records: &[FrameRecord]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["OFFSET", "TYPE", "STREAM", "SIZE", "PAYLOAD"]);
    for record in records {
        table.add_row(vec![
            record.offset.to_string(),
            record.frame_type.to_string(),
            record.stream_id.to_string(),
            record.payload_size.to_string(),
            record.preview.clone(),
        ]);
    }
    println!("{table}");
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => truncate(text),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn truncate(text: &str) -> String {
    let text = text.trim_end();
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn previews_binary_and_long_text() {
        assert_eq!(payload_preview(&[0xff, 0x00, 0x01]), "<binary 3 bytes>");
        assert_eq!(payload_preview(b"ok\n"), "ok");

        let long = "x".repeat(PREVIEW_CHARS + 10);
        let preview = truncate(&long);
        assert_eq!(preview.len(), PREVIEW_CHARS + 3);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn frame_records_describe_headers() {
        let frame = Frame::Chunk {
            stream_id: 5,
            data: Bytes::from_static(&[1, 2, 3]),
        };
        let record = FrameRecord::new(20, &frame, rpcframe_frame::HEADER_SIZE + 3);
        assert_eq!(record.frame_type, "CHUNK");
        assert_eq!(record.channel, "RAW");
        assert_eq!(record.stream_id, 5);
        assert_eq!(record.payload_size, 3);
        assert_eq!(record.preview, "<binary 3 bytes>");
    }

    #[test]
    fn reports_serialize_without_empty_fields() {
        let report = DecodeReport {
            text: vec!["{}\n".into()],
            streams: vec![StreamReport {
                id: 5,
                state: "closed",
                size: 3,
                output: None,
                error: None,
            }],
            phase: "closed",
            frames: 3,
            bytes: 33,
            error: None,
        };
        let json: serde_json::Value =
            serde_json::to_value(&report).expect("report should serialize");
        assert_eq!(json["streams"][0]["id"], 5);
        assert!(json.get("error").is_none());
        assert!(json["streams"][0].get("output").is_none());
    }
}
