#![cfg(feature = "cli")]

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use bytes::BytesMut;
use rpcframe_frame::{encode_frame, FrameType};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "rpcframe-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

/// Builds a framed response file frame by frame.
struct Fixture(BytesMut);

impl Fixture {
    fn new() -> Self {
        Self(BytesMut::new())
    }

    fn frame(mut self, frame_type: FrameType, id: u32, payload: &[u8]) -> Self {
        encode_frame(frame_type, id, payload, &mut self.0).expect("fixture frame should encode");
        self
    }

    fn write(self, dir: &Path) -> PathBuf {
        let path = dir.join("response.bin");
        std::fs::write(&path, &self.0).expect("fixture should be writable");
        path
    }
}

fn rpcframe(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rpcframe"))
        .args(["--log-level", "off"])
        .args(args)
        .env_remove("RPCFRAME_LOG")
        .stdin(Stdio::null())
        .output()
        .expect("rpcframe should run")
}

fn json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).expect("stdout should be one JSON document")
}

fn arg(path: &Path) -> &str {
    path.to_str().expect("temp path should be UTF-8")
}

#[test]
fn decode_reports_text_and_streams() {
    let dir = unique_temp_dir("decode");
    let input = Fixture::new()
        .frame(FrameType::Text, 0, b"{\"streamRef\":5}\n")
        .frame(FrameType::Chunk, 5, &[1, 2, 3])
        .frame(FrameType::Chunk, 6, b"partial")
        .frame(FrameType::Error, 6, b"Stream failed")
        .frame(FrameType::Chunk, 5, &[4])
        .frame(FrameType::End, 5, b"")
        .write(&dir);
    let out_dir = dir.join("out");

    let output = rpcframe(&[
        "--format",
        "json",
        "decode",
        arg(&input),
        "--chunk-size",
        "3",
        "--out-dir",
        arg(&out_dir),
    ]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report = json(&output);
    assert_eq!(report["text"][0], "{\"streamRef\":5}\n");
    assert_eq!(report["phase"], "closed");
    assert_eq!(report["frames"], 6);

    let streams = report["streams"].as_array().expect("streams should be an array");
    assert_eq!(streams.len(), 2);
    assert_eq!(streams[0]["id"], 5);
    assert_eq!(streams[0]["size"], 4);
    assert_eq!(streams[1]["id"], 6);
    assert_eq!(streams[1]["state"], "errored");
    assert_eq!(streams[1]["error"], "Stream failed");

    let written = std::fs::read(out_dir.join("stream-5.bin")).expect("stream 5 should be written");
    assert_eq!(written, vec![1u8, 2, 3, 4]);
    assert!(!out_dir.join("stream-6.bin").exists());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn decode_truncated_input_is_data_invalid() {
    let dir = unique_temp_dir("truncated");
    let input = Fixture::new()
        .frame(FrameType::Text, 0, b"{}")
        .frame(FrameType::Chunk, 2, b"abcdef")
        .write(&dir);
    let bytes = std::fs::read(&input).expect("fixture should be readable");
    std::fs::write(&input, &bytes[..bytes.len() - 2]).expect("fixture should be writable");

    let output = rpcframe(&["--format", "json", "decode", arg(&input)]);
    assert_eq!(output.status.code(), Some(60));

    let report = json(&output);
    assert_eq!(report["text"][0], "{}");
    assert_eq!(report["phase"], "failed");
    assert!(report["error"]
        .as_str()
        .expect("error should be reported")
        .contains("incomplete frame"));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error: decode failed"), "stderr: {stderr}");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn decode_enforces_stream_limit_from_flag() {
    let dir = unique_temp_dir("limits");
    let input = Fixture::new()
        .frame(FrameType::Chunk, 1, b"a")
        .frame(FrameType::Chunk, 2, b"b")
        .frame(FrameType::Chunk, 3, b"c")
        .write(&dir);

    let output = rpcframe(&["--format", "json", "decode", arg(&input), "--max-streams", "2"]);
    assert_eq!(output.status.code(), Some(60));
    let report = json(&output);
    assert!(report["error"]
        .as_str()
        .expect("error should be reported")
        .contains("too many raw streams"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn decode_rejects_bad_size_flag() {
    let output = rpcframe(&["decode", "missing.bin", "--chunk-size", "lots"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn decode_missing_file_fails() {
    let dir = unique_temp_dir("missing");
    let output = rpcframe(&["decode", arg(&dir.join("nope.bin"))]);
    assert_eq!(output.status.code(), Some(1));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn inspect_lists_every_header() {
    let dir = unique_temp_dir("inspect");
    let input = Fixture::new()
        .frame(FrameType::Text, 0, b"hello")
        .frame(FrameType::Chunk, 7, &[0xff, 0xfe])
        .frame(FrameType::End, 7, b"")
        .write(&dir);

    let output = rpcframe(&["--format", "json", "inspect", arg(&input)]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let records: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be JSON"))
        .collect();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["frame_type"], "TEXT");
    assert_eq!(records[0]["preview"], "hello");
    assert_eq!(records[1]["offset"], 14);
    assert_eq!(records[1]["stream_id"], 7);
    assert_eq!(records[1]["preview"], "<binary 2 bytes>");
    assert_eq!(records[2]["frame_type"], "END");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_prints_package_version() {
    let output = rpcframe(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("rpcframe {}", env!("CARGO_PKG_VERSION")));
}
