use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};
use tempfile::NamedTempFile;

fn write_mcp_message(stdin: &mut impl Write, payload: &Value) {
    let body = serde_json::to_vec(payload).unwrap();
    write!(stdin, "Content-Length: {}\r\n\r\n", body.len()).unwrap();
    stdin.write_all(&body).unwrap();
    stdin.flush().unwrap();
}

fn read_mcp_message(stdout: &mut impl BufRead) -> Value {
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        let n = stdout.read_line(&mut line).unwrap();
        assert!(n > 0, "unexpected EOF");
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            if name.eq_ignore_ascii_case("Content-Length") {
                content_length = Some(value.trim().parse::<usize>().unwrap());
            }
        }
    }
    let len = content_length.expect("missing Content-Length");
    let mut buf = vec![0_u8; len];
    stdout.read_exact(&mut buf).unwrap();
    serde_json::from_slice(&buf).unwrap()
}

fn call_tool(id: u64, name: &str, arguments: Value) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": name, "arguments": arguments }
    })
}

#[test]
fn stdio_server_lifecycle_without_model_access() {
    let db = NamedTempFile::new().unwrap();
    let bin = env!("CARGO_BIN_EXE_graphloom-mcp");
    let mut child = Command::new(bin)
        .env("GRAPHLOOM_DB_PATH", db.path())
        // Nothing listens on the discard port, so no model call can succeed.
        .env("GRAPHLOOM_LLM_BASE_URL", "http://127.0.0.1:9")
        .env("GRAPHLOOM_TIMEOUT_SECS", "2")
        .env("RUST_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();

    let mut stdin = child.stdin.take().unwrap();
    let mut stdout = BufReader::new(child.stdout.take().unwrap());

    write_mcp_message(
        &mut stdin,
        &serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {}
        }),
    );
    let init = read_mcp_message(&mut stdout);
    assert_eq!(init["id"], 1);
    assert_eq!(init["result"]["serverInfo"]["name"], "graphloom-mcp");

    write_mcp_message(
        &mut stdin,
        &serde_json::json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }),
    );
    let list = read_mcp_message(&mut stdout);
    let names: Vec<&str> = list["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    for tool in ["ingest", "query", "graph_paths", "delete_all"] {
        assert!(names.contains(&tool), "missing tool {tool}");
    }

    write_mcp_message(
        &mut stdin,
        &call_tool(3, "query", serde_json::json!({ "question": "Who is Ada?" })),
    );
    let query = read_mcp_message(&mut stdout);
    assert_eq!(query["id"], 3);
    assert_eq!(query["result"]["isError"], true);
    assert!(query["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("not built"));

    write_mcp_message(&mut stdin, &call_tool(4, "graph_stats", serde_json::json!({})));
    let stats = read_mcp_message(&mut stdout);
    assert_eq!(stats["result"]["structuredContent"]["stats"]["documents"], 0);

    // A frame with a broken JSON body gets a parse error; the server keeps going.
    write!(stdin, "Content-Length: 5\r\n\r\nnot{{}}").unwrap();
    stdin.flush().unwrap();
    let parse_error = read_mcp_message(&mut stdout);
    assert_eq!(parse_error["error"]["code"], -32700);

    write_mcp_message(&mut stdin, &call_tool(5, "delete_all", serde_json::json!({})));
    let deleted = read_mcp_message(&mut stdout);
    assert_eq!(deleted["id"], 5);
    assert_eq!(deleted["result"]["isError"], false);

    write_mcp_message(
        &mut stdin,
        &serde_json::json!({ "jsonrpc": "2.0", "id": 6, "method": "ping" }),
    );
    assert_eq!(read_mcp_message(&mut stdout)["id"], 6);

    drop(stdin);
    let _ = child.wait();
}
