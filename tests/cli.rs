use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use serde_json::{json, Value};
use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use tempfile::TempDir;

struct TestEnv {
    _tmp: TempDir,
    data_dir: PathBuf,
    archive: PathBuf,
}

impl TestEnv {
    fn new() -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let data_dir = tmp.path().join("data");
        let archive = tmp.path().join("token.zip");
        fs::write(&archive, b"PK\x03\x04fixture").expect("write archive");
        Self {
            _tmp: tmp,
            data_dir,
            archive,
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("papers-please");
        cmd.arg("--data-dir").arg(&self.data_dir);
        cmd.env("RUST_LOG", "off");
        cmd
    }

    fn cache_path(&self) -> PathBuf {
        self.data_dir.join("formattedData")
    }
}

fn closed_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);
    format!("http://127.0.0.1:{port}/analyze")
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Serve a single canned reply and hand back the raw request.
fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let handle = std::thread::spawn(move || {
        let (mut sock, _) = listener.accept().expect("accept");
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = sock.read(&mut chunk).expect("read");
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let Some(end) = find(&buf, b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok());
            match len {
                Some(len) if buf.len() >= end + 4 + len => break,
                Some(_) => {}
                None if buf.ends_with(b"0\r\n\r\n") => break,
                None => {}
            }
        }
        let reply = format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        sock.write_all(reply.as_bytes()).expect("write");
        String::from_utf8_lossy(&buf).into_owned()
    });
    (format!("http://{addr}/analyze"), handle)
}

fn stderr_of(out: &std::process::Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

fn write_cache(path: &Path, text: &str) {
    fs::create_dir_all(path.parent().expect("parent")).expect("create data dir");
    fs::write(path, text).expect("write cache");
}

#[test]
fn show_cached_with_empty_store() {
    let env = TestEnv::new();
    let out = env.cmd().arg("--show-cached").output().expect("run");
    assert!(out.status.success());
    assert!(out.stdout.is_empty());
    assert!(stderr_of(&out).contains("No cached analysis results"));
}

#[test]
fn show_cached_prints_last_rendering() {
    let env = TestEnv::new();
    let text = "TokenA\n  Compliance:\n    ERC721: true\n  oz_modules:\n";
    write_cache(&env.cache_path(), text);
    env.cmd()
        .arg("--show-cached")
        .assert()
        .success()
        .stdout(text.to_string());
}

#[test]
fn analyze_without_files_fails() {
    let env = TestEnv::new();
    let out = env
        .cmd()
        .args(["--text", "--endpoint"])
        .arg(closed_endpoint())
        .output()
        .expect("run");
    assert!(!out.status.success());
    assert!(stderr_of(&out).contains("no files selected"));
}

#[test]
fn unreachable_service_keeps_cache() {
    let env = TestEnv::new();
    write_cache(&env.cache_path(), "previous\n");
    let out = env
        .cmd()
        .args(["--text", "--endpoint"])
        .arg(closed_endpoint())
        .arg(&env.archive)
        .output()
        .expect("run");
    assert!(!out.status.success());
    assert!(stderr_of(&out).contains("could not reach the analysis service"));
    assert_eq!(
        fs::read_to_string(env.cache_path()).expect("cache"),
        "previous\n"
    );
}

#[test]
fn missing_file_is_reported() {
    let env = TestEnv::new();
    let out = env
        .cmd()
        .args(["--text", "--endpoint"])
        .arg(closed_endpoint())
        .arg(env.archive.with_file_name("absent.zip"))
        .output()
        .expect("run");
    assert!(!out.status.success());
    assert!(stderr_of(&out).contains("absent.zip"));
}

#[test]
fn service_error_is_shown_verbatim() {
    let env = TestEnv::new();
    let (endpoint, server) = serve_once("400 Bad Request", r#"{"error":"invalid archive"}"#);
    let out = env
        .cmd()
        .args(["--text", "--endpoint", &endpoint])
        .arg(&env.archive)
        .output()
        .expect("run");
    server.join().expect("server");
    assert!(!out.status.success());
    assert!(stderr_of(&out).contains("invalid archive"));
    assert!(!env.cache_path().exists());
}

#[test]
fn successful_analysis_prints_and_persists() {
    let env = TestEnv::new();
    let (endpoint, server) = serve_once(
        "200 OK",
        r#"{"message":"done","data":{"TokenA":{"compliance":{"ERC721":true},"oz_modules":["Ownable","ERC721"]}}}"#,
    );
    let expected = "TokenA\n  Compliance:\n    ERC721: true\n  oz_modules:\n    1. Ownable\n    2. ERC721\n";
    env.cmd()
        .args(["--text", "--option", "ERC721", "--endpoint", &endpoint])
        .arg(&env.archive)
        .assert()
        .success()
        .stdout(expected.to_string());

    let raw = server.join().expect("server");
    assert!(raw.contains("name=\"zipFile\""));
    assert!(raw.contains("[\"ERC721\"]"));
    assert_eq!(
        fs::read_to_string(env.cache_path()).expect("cache"),
        expected
    );
}

const TOKEN_A_REPLY: &str = r#"{"message":"Analysis completed successfully!","progress":100,"data":{"TokenA":{"compliance":{"ERC721":true},"oz_modules":["Ownable","ERC721"]}}}"#;
const TOKEN_A_TEXT: &str =
    "TokenA\n  Compliance:\n    ERC721: true\n  oz_modules:\n    1. Ownable\n    2. ERC721\n";

#[test]
fn success_status_without_data_keeps_cache() {
    let env = TestEnv::new();
    write_cache(&env.cache_path(), "previous\n");
    let (endpoint, server) = serve_once("200 OK", r#"{"error":"backend exploded"}"#);
    let out = env
        .cmd()
        .args(["--text", "--endpoint", &endpoint])
        .arg(&env.archive)
        .output()
        .expect("run");
    server.join().expect("server");
    assert!(!out.status.success());
    assert!(stderr_of(&out).contains("malformed response"));
    assert_eq!(
        fs::read_to_string(env.cache_path()).expect("cache"),
        "previous\n"
    );
}

#[test]
fn json_mode_prints_raw_response() {
    let env = TestEnv::new();
    let (endpoint, server) = serve_once("200 OK", TOKEN_A_REPLY);
    let out = env
        .cmd()
        .args(["--json", "--endpoint", &endpoint])
        .arg(&env.archive)
        .output()
        .expect("run");
    server.join().expect("server");
    assert!(out.status.success(), "{}", stderr_of(&out));

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("\n  \"data\""), "not pretty-printed: {stdout}");
    let printed: Value = serde_json::from_str(&stdout).expect("stdout is JSON");
    assert_eq!(printed["message"], json!("Analysis completed successfully!"));
    assert_eq!(printed["data"]["TokenA"]["compliance"]["ERC721"], json!(true));
    assert_eq!(
        printed["data"]["TokenA"]["oz_modules"],
        json!(["Ownable", "ERC721"])
    );
    assert_eq!(
        fs::read_to_string(env.cache_path()).expect("cache"),
        TOKEN_A_TEXT
    );
}

#[test]
fn exports_write_both_files() {
    let env = TestEnv::new();
    let json_path = env.data_dir.with_file_name("result.json");
    let text_path = env.data_dir.with_file_name("result.txt");
    let (endpoint, server) = serve_once("200 OK", TOKEN_A_REPLY);
    env.cmd()
        .args(["--text", "--endpoint", &endpoint])
        .arg("--export-json")
        .arg(&json_path)
        .arg("--export-text")
        .arg(&text_path)
        .arg(&env.archive)
        .assert()
        .success();
    server.join().expect("server");

    let exported: Value =
        serde_json::from_str(&fs::read_to_string(&json_path).expect("json export")).expect("json");
    assert_eq!(exported["message"], json!("Analysis completed successfully!"));
    assert_eq!(
        exported["data"]["TokenA"]["oz_modules"],
        json!(["Ownable", "ERC721"])
    );
    assert_eq!(
        fs::read_to_string(&text_path).expect("text export"),
        TOKEN_A_TEXT
    );
}

#[test]
fn text_mode_reports_message_and_progress() {
    let env = TestEnv::new();
    let (endpoint, server) = serve_once("200 OK", TOKEN_A_REPLY);
    let out = env
        .cmd()
        .args(["--text", "--endpoint", &endpoint])
        .arg(&env.archive)
        .output()
        .expect("run");
    server.join().expect("server");
    assert!(out.status.success(), "{}", stderr_of(&out));

    let stderr = stderr_of(&out);
    assert!(stderr.contains("Message: Analysis completed successfully!"), "{stderr}");
    assert!(stderr.contains("Progress: 100%"), "{stderr}");
    assert!(stderr.contains("Saved: "), "{stderr}");
    assert_eq!(String::from_utf8_lossy(&out.stdout), TOKEN_A_TEXT);
}
