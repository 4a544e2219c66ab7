// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! A stand-in for `helios-ls` used by the integration tests.
//!
//! Speaks Content-Length framed JSON-RPC over stdin/stdout. Flags control
//! timing and failure modes, and `--record` appends every method received to
//! a file so tests can see what the client sent.

#![allow(clippy::print_stderr, reason = "diagnostics for a test helper go to stderr")]

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Mock Helios language server.
#[derive(Parser, Debug)]
#[command(name = "helios-ls", version = "1.2.3")]
struct Args {
    /// Run mode; only `ide` starts the language server.
    mode: Option<String>,

    /// Sleep before every response (milliseconds).
    #[arg(long, default_value_t = 0)]
    response_delay: u64,

    /// Never respond to this method (repeatable).
    #[arg(long)]
    hang_on: Vec<String>,

    /// Return `InternalError` for this method (repeatable).
    #[arg(long)]
    fail_on: Vec<String>,

    /// Fail `initialize` unless this `KEY=VALUE` is in the environment (repeatable).
    #[arg(long)]
    require_env: Vec<String>,

    /// Append each received method name to this file.
    #[arg(long)]
    record: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct Request {
    id: Option<Value>,
    method: Option<String>,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct Response {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
struct RpcError {
    code: i64,
    message: String,
}

struct MockServer<W: Write> {
    args: Args,
    documents: HashMap<String, String>,
    writer: W,
    exited: bool,
}

impl<W: Write> MockServer<W> {
    fn new(args: Args, writer: W) -> Self {
        Self {
            args,
            documents: HashMap::new(),
            writer,
            exited: false,
        }
    }

    fn run(&mut self, reader: &mut dyn Read) {
        let mut buffer = Vec::new();
        let mut temp = [0u8; 4096];

        while !self.exited {
            match reader.read(&mut temp) {
                Ok(0) | Err(_) => break,
                Ok(n) => buffer.extend_from_slice(&temp[..n]),
            }

            while let Some((message, consumed)) = try_parse_message(&buffer) {
                buffer.drain(..consumed);
                if let Ok(request) = serde_json::from_str::<Request>(&message) {
                    self.handle_message(request);
                }
                if self.exited {
                    return;
                }
            }
        }
    }

    fn handle_message(&mut self, request: Request) {
        let Some(method) = request.method.clone() else {
            return;
        };
        self.record(&method);

        match request.id {
            Some(id) => self.handle_request(&method, id, &request.params),
            None => self.handle_notification(&method, &request.params),
        }
    }

    fn handle_request(&mut self, method: &str, id: Value, params: &Value) {
        if self.args.hang_on.iter().any(|m| m == method) {
            return;
        }

        if self.args.response_delay > 0 {
            std::thread::sleep(Duration::from_millis(self.args.response_delay));
        }

        let outcome = if self.args.fail_on.iter().any(|m| m == method) {
            Err((-32603, format!("helios-ls: configured to fail on {method}")))
        } else {
            match method {
                "initialize" => self.handle_initialize(params),
                "shutdown" => Ok(Value::Null),
                _ => Err((-32601, format!("helios-ls: method not found: {method}"))),
            }
        };

        let (result, error) = match outcome {
            Ok(result) => (Some(result), None),
            Err((code, message)) => (None, Some(RpcError { code, message })),
        };
        self.send(&Response {
            jsonrpc: "2.0",
            id,
            result,
            error,
        });
    }

    fn handle_initialize(&self, params: &Value) -> Result<Value, (i64, String)> {
        for requirement in &self.args.require_env {
            let (key, expected) = requirement
                .split_once('=')
                .unwrap_or((requirement.as_str(), ""));
            let actual = std::env::var(key).unwrap_or_default();
            if actual != expected {
                return Err((-32603, format!("helios-ls: {key}={actual:?}, wanted {expected:?}")));
            }
        }

        let client = params
            .get("clientInfo")
            .and_then(|c| c.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        eprintln!("helios-ls: initialize from {client}");

        Ok(serde_json::json!({
            "capabilities": {
                "textDocumentSync": { "openClose": true, "change": 1 },
                "hoverProvider": true,
                "documentSymbolProvider": true
            },
            "serverInfo": { "name": "helios-ls", "version": "1.2.3" }
        }))
    }

    fn handle_notification(&mut self, method: &str, params: &Value) {
        let uri = params
            .get("textDocument")
            .and_then(|td| td.get("uri"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match method {
            "textDocument/didOpen" => {
                let text = params
                    .get("textDocument")
                    .and_then(|td| td.get("text"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                self.documents.insert(uri.clone(), text.to_string());
                self.publish_diagnostics(&uri);
            }
            "textDocument/didChange" => {
                if let Some(text) = params
                    .get("contentChanges")
                    .and_then(Value::as_array)
                    .and_then(|changes| changes.last())
                    .and_then(|c| c.get("text"))
                    .and_then(Value::as_str)
                {
                    self.documents.insert(uri.clone(), text.to_string());
                }
                self.publish_diagnostics(&uri);
            }
            "textDocument/didClose" => {
                self.documents.remove(&uri);
            }
            "exit" => self.exited = true,
            _ => {}
        }
    }

    /// Reports one warning per line containing `todo`.
    fn publish_diagnostics(&mut self, uri: &str) {
        let diagnostics: Vec<Value> = self
            .documents
            .get(uri)
            .map(|text| {
                text.lines()
                    .enumerate()
                    .filter(|(_, line)| line.contains("todo"))
                    .map(|(n, line)| {
                        serde_json::json!({
                            "range": {
                                "start": { "line": n, "character": 0 },
                                "end": { "line": n, "character": line.len() }
                            },
                            "severity": 2,
                            "source": "helios-ls",
                            "message": "unfinished code"
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        self.send(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": "textDocument/publishDiagnostics",
            "params": { "uri": uri, "diagnostics": diagnostics }
        }));
    }

    fn record(&self, method: &str) {
        let Some(path) = &self.args.record else {
            return;
        };
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{method}");
        }
    }

    fn send<T: Serialize>(&mut self, message: &T) {
        let Ok(json) = serde_json::to_string(message) else {
            return;
        };
        let _ = write!(self.writer, "Content-Length: {}\r\n\r\n{json}", json.len());
        let _ = self.writer.flush();
    }
}

/// Parse a Content-Length framed message from a buffer.
/// Returns the message string and the number of bytes consumed.
fn try_parse_message(buffer: &[u8]) -> Option<(String, usize)> {
    let header_end = buffer.windows(4).position(|w| w == b"\r\n\r\n")?;
    let headers = std::str::from_utf8(&buffer[..header_end]).ok()?;

    let content_length: usize = headers.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("content-length")
            .then(|| value.trim().parse().ok())
            .flatten()
    })?;

    let total = header_end + 4 + content_length;
    let body = buffer.get(header_end + 4..total)?;
    Some((String::from_utf8_lossy(body).into_owned(), total))
}

fn main() {
    let args = Args::parse();
    if args.mode.as_deref() != Some("ide") {
        eprintln!("helios-ls: expected `ide` mode, got {:?}", args.mode);
        std::process::exit(2);
    }

    let mut server = MockServer::new(args, std::io::stdout().lock());
    let mut stdin = std::io::stdin().lock();
    server.run(&mut stdin);
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    reason = "Tests use expect/unwrap for clear failure messages"
)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["helios-ls", "ide"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    fn frame(body: &Value) -> Vec<u8> {
        let body = body.to_string();
        format!("Content-Length: {}\r\n\r\n{}", body.len(), body).into_bytes()
    }

    fn run_server(args: Args, input: &[Value]) -> Vec<Value> {
        let bytes: Vec<u8> = input.iter().flat_map(frame).collect();
        let mut out = Vec::new();
        MockServer::new(args, &mut out).run(&mut Cursor::new(bytes));

        let mut messages = Vec::new();
        let mut buf = out;
        while let Some((msg, consumed)) = try_parse_message(&buf) {
            messages.push(serde_json::from_str(&msg).unwrap());
            buf.drain(..consumed);
        }
        messages
    }

    fn request(id: u64, method: &str) -> Value {
        serde_json::json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": {} })
    }

    #[test]
    fn test_initialize_reports_server_info() {
        let messages = run_server(args(&[]), &[request(1, "initialize")]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["id"], 1);
        assert_eq!(messages[0]["result"]["serverInfo"]["version"], "1.2.3");
        assert_eq!(
            messages[0]["result"]["capabilities"]["textDocumentSync"]["change"],
            1
        );
    }

    #[test]
    fn test_hang_and_fail_flags() {
        let hung = run_server(args(&["--hang-on", "initialize"]), &[request(1, "initialize")]);
        assert!(hung.is_empty());

        let failed = run_server(args(&["--fail-on", "shutdown"]), &[request(7, "shutdown")]);
        assert_eq!(failed[0]["id"], 7);
        assert_eq!(failed[0]["error"]["code"], -32603);
    }

    #[test]
    fn test_unknown_request_is_method_not_found() {
        let messages = run_server(args(&[]), &[request(2, "helios/syntaxTree")]);
        assert_eq!(messages[0]["error"]["code"], -32601);
    }

    #[test]
    fn test_require_env_gates_initialize() {
        let messages = run_server(
            args(&["--require-env", "HELIOS_MOCK_SURELY_UNSET=1"]),
            &[request(1, "initialize")],
        );
        assert!(messages[0]["result"].is_null());
        assert_eq!(messages[0]["error"]["code"], -32603);
    }

    #[test]
    fn test_did_open_publishes_diagnostics() {
        let open = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "textDocument/didOpen",
            "params": { "textDocument": {
                "uri": "file:///a.hl", "languageId": "helios", "version": 1,
                "text": "let x = 1\n-- todo\n"
            }}
        });
        let messages = run_server(args(&[]), &[open]);
        assert_eq!(messages[0]["method"], "textDocument/publishDiagnostics");
        let diagnostics = messages[0]["params"]["diagnostics"].as_array().unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0]["range"]["start"]["line"], 1);
    }

    #[test]
    fn test_exit_stops_reading() {
        let exit = serde_json::json!({ "jsonrpc": "2.0", "method": "exit" });
        let messages = run_server(args(&[]), &[exit, request(9, "shutdown")]);
        assert!(messages.is_empty());
    }

    #[test]
    fn test_record_appends_methods() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("methods.log");
        let log_arg = log.to_string_lossy().into_owned();
        run_server(
            args(&["--record", &log_arg]),
            &[request(1, "initialize"), request(2, "shutdown")],
        );
        assert_eq!(std::fs::read_to_string(log).unwrap(), "initialize\nshutdown\n");
    }
}
