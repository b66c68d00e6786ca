mod openai;

use anyhow::{Context, Result};
use graphloom::{KnowledgeGraph, SeedFilter};
use graphloom_retrieval::{ChunkRecord, GraphMode, HybridRetriever, RetrievalConfig};
use openai::{OpenAiCompatible, OpenAiSettings};
use serde_json::{json, Value as JsonValue};
use std::env;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const MAX_MESSAGE_BYTES: usize = 1_048_576; // 1 MiB
const MAX_TEXT_BYTES: usize = 32 * 1024; // 32 KiB
const MAX_QUESTION_BYTES: usize = 8 * 1024; // 8 KiB
const MAX_NAME_BYTES: usize = 512;
const MAX_INGEST_CHUNKS: usize = 500;
const MAX_RESULT_LIMIT: usize = 200;

struct AppState {
    retriever: HybridRetriever,
}

impl AppState {
    fn open() -> Result<Self> {
        let db_path =
            env::var("GRAPHLOOM_DB_PATH").unwrap_or_else(|_| "./graphloom.redb".to_string());
        let graph = KnowledgeGraph::open(&db_path)
            .with_context(|| format!("failed to open graph store at {db_path}"))?;

        let intelligence = Arc::new(
            OpenAiCompatible::new(settings_from_env()?)
                .context("failed to build model client")?,
        );
        let retriever = HybridRetriever::new(graph, intelligence.clone(), intelligence);

        // The vector index is not persisted; restore it for an existing corpus.
        if retriever.graph().stats()?.chunks > 0 {
            match retriever.rebuild_index() {
                Ok(n) => info!(chunks = n, "restored vector index"),
                Err(e) => warn!(error = %e, "could not rebuild vector index at startup"),
            }
        }
        info!(path = %db_path, "graph store ready");
        Ok(Self { retriever })
    }
}

fn settings_from_env() -> Result<OpenAiSettings> {
    let timeout_secs = match env::var("GRAPHLOOM_TIMEOUT_SECS") {
        Ok(v) => v
            .trim()
            .parse::<u64>()
            .context("GRAPHLOOM_TIMEOUT_SECS must be a whole number of seconds")?,
        Err(_) => 60,
    };
    let api_key = env::var("GRAPHLOOM_API_KEY")
        .or_else(|_| env::var("OPENAI_API_KEY"))
        .ok()
        .filter(|k| !k.trim().is_empty());

    Ok(OpenAiSettings {
        base_url: env::var("GRAPHLOOM_LLM_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
        chat_model: env::var("GRAPHLOOM_CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
        embed_model: env::var("GRAPHLOOM_EMBED_MODEL")
            .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
        api_key,
        timeout_secs,
    })
}

/// Logs go to stderr; stdout carries the protocol.
fn init_logging() {
    let fallback = env::var("GRAPHLOOM_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_logging();
    let state = AppState::open().context("failed to start graphloom server")?;
    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin.lock());
    let stdout = io::stdout();
    let mut writer = stdout.lock();

    loop {
        let maybe = match read_message(&mut reader) {
            Ok(m) => m,
            Err(e) => {
                // Bad framing gets a parse error; keep serving.
                let err_resp = json!({
                    "jsonrpc": "2.0",
                    "id": null,
                    "error": { "code": -32700, "message": format!("Parse error: {e}") }
                });
                write_message(&mut writer, &err_resp)?;
                continue;
            }
        };
        let Some(request) = maybe else {
            break;
        };
        if let Some(response) = handle_request(&state, &request) {
            write_message(&mut writer, &response)?;
        }
    }

    Ok(())
}

fn read_message<R: BufRead>(reader: &mut R) -> Result<Option<JsonValue>> {
    let mut content_length: Option<usize> = None;

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }

        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }

        if let Some((name, value)) = trimmed.split_once(':') {
            if name.eq_ignore_ascii_case("Content-Length") {
                content_length = Some(
                    value
                        .trim()
                        .parse::<usize>()
                        .context("invalid Content-Length")?,
                );
            }
        }
    }

    let len = content_length.context("missing Content-Length header")?;
    if len > MAX_MESSAGE_BYTES {
        anyhow::bail!(
            "Content-Length {} exceeds max allowed {} bytes",
            len,
            MAX_MESSAGE_BYTES
        );
    }
    let mut payload = vec![0_u8; len];
    reader.read_exact(&mut payload)?;
    let value: JsonValue = serde_json::from_slice(&payload).context("invalid JSON payload")?;
    Ok(Some(value))
}

fn write_message<W: Write>(writer: &mut W, value: &JsonValue) -> Result<()> {
    let payload = serde_json::to_vec(value)?;
    write!(writer, "Content-Length: {}\r\n\r\n", payload.len())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

fn handle_request(state: &AppState, req: &JsonValue) -> Option<JsonValue> {
    let id = req.get("id").cloned();
    let method = req.get("method").and_then(JsonValue::as_str)?;

    match method {
        "initialize" => id.map(|id_val| {
            json!({
                "jsonrpc": "2.0",
                "id": id_val,
                "result": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "graphloom-mcp", "version": env!("CARGO_PKG_VERSION") }
                }
            })
        }),
        "notifications/initialized" => None,
        "tools/list" => id.map(|id_val| {
            json!({
                "jsonrpc": "2.0",
                "id": id_val,
                "result": {
                    "tools": tools_schema()
                }
            })
        }),
        "tools/call" => id.map(|id_val| {
            let result = call_tool(state, req.get("params"));
            match result {
                Ok(tool_result) => json!({
                    "jsonrpc": "2.0",
                    "id": id_val,
                    "result": tool_result
                }),
                Err(err) => json!({
                    "jsonrpc": "2.0",
                    "id": id_val,
                    "result": {
                        "content": [{ "type": "text", "text": format!("tool error: {err}") }],
                        "isError": true
                    }
                }),
            }
        }),
        "ping" => id.map(|id_val| json!({ "jsonrpc": "2.0", "id": id_val, "result": {} })),
        _ => id.map(|id_val| {
            json!({
                "jsonrpc": "2.0",
                "id": id_val,
                "error": {
                    "code": -32601,
                    "message": format!("method not found: {method}")
                }
            })
        }),
    }
}

fn tools_schema() -> Vec<JsonValue> {
    let limit = json!({"type": "integer", "minimum": 1, "maximum": MAX_RESULT_LIMIT});
    let hops = json!({"type": "integer", "minimum": 1, "maximum": graphloom::MAX_TRAVERSAL_HOPS});
    vec![
        json!({
            "name": "ingest",
            "description": "Store document chunks, extract entities and relations, and rebuild the vector index.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "chunks": {
                        "type": "array",
                        "maxItems": MAX_INGEST_CHUNKS,
                        "items": {
                            "type": "object",
                            "properties": {
                                "text": {"type": "string"},
                                "source": {"type": "string"},
                                "index": {"type": "integer", "minimum": 0}
                            },
                            "required": ["text", "source", "index"]
                        }
                    }
                },
                "required": ["chunks"]
            }
        }),
        json!({
            "name": "query",
            "description": "Answer a question from knowledge-graph and vector context.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "question": {"type": "string"},
                    "topic": {"type": "string"},
                    "hops": hops,
                    "graph_limit": limit,
                    "vector_k": limit,
                    "docs_only": {"type": "boolean"},
                    "graph_mode": {"type": "string", "enum": ["traverse", "document_keyword"]}
                },
                "required": ["question"]
            }
        }),
        json!({
            "name": "retrieve_by_keyword",
            "description": "Return chunk texts of documents whose name contains a keyword.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "keyword": {"type": "string"},
                    "limit": limit
                },
                "required": ["keyword"]
            }
        }),
        json!({
            "name": "graph_paths",
            "description": "List shortest entity paths from entities matching a topic.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "topic": {"type": "string"},
                    "hops": hops,
                    "limit": limit,
                    "ignore_case": {"type": "boolean"}
                },
                "required": ["topic"]
            }
        }),
        json!({
            "name": "graph_stats",
            "description": "Node and edge counts, document names, and vector index size.",
            "inputSchema": { "type": "object", "properties": {} }
        }),
        json!({
            "name": "delete_document",
            "description": "Delete one document with its chunks and orphaned entities.",
            "inputSchema": {
                "type": "object",
                "properties": { "name": {"type": "string"} },
                "required": ["name"]
            }
        }),
        json!({
            "name": "delete_all",
            "description": "Delete every document, chunk, entity, and edge.",
            "inputSchema": { "type": "object", "properties": {} }
        }),
    ]
}

fn str_arg<'a>(args: &'a JsonValue, key: &str, max_bytes: usize) -> Result<&'a str> {
    let value = args
        .get(key)
        .and_then(JsonValue::as_str)
        .with_context(|| format!("{key} is required"))?;
    if value.len() > max_bytes {
        anyhow::bail!("{key} exceeds max allowed size ({max_bytes} bytes)");
    }
    Ok(value)
}

/// An optional non-negative integer argument. Absent or `null` yields
/// `default`; any other non-integer value is an error.
fn limit_arg(args: &JsonValue, key: &str, default: usize, max: usize) -> Result<usize> {
    let value = match args.get(key) {
        None | Some(JsonValue::Null) => default,
        Some(raw) => raw
            .as_u64()
            .and_then(|v| usize::try_from(v).ok())
            .with_context(|| format!("{key} must be a non-negative integer"))?,
    };
    if value > max {
        anyhow::bail!("{key} exceeds max allowed value ({max})");
    }
    Ok(value)
}

fn call_tool(state: &AppState, params: Option<&JsonValue>) -> Result<JsonValue> {
    let name = params
        .and_then(|v| v.get("name"))
        .and_then(JsonValue::as_str)
        .context("missing tool name")?;
    let args = params
        .and_then(|v| v.get("arguments"))
        .cloned()
        .unwrap_or_else(|| json!({}));
    let retriever = &state.retriever;
    let defaults: &RetrievalConfig = retriever.config();

    match name {
        "ingest" => {
            let raw = args.get("chunks").context("chunks is required")?;
            let chunks: Vec<ChunkRecord> = serde_json::from_value(raw.clone())
                .context("chunks must be an array of {text, source, index}")?;
            if chunks.len() > MAX_INGEST_CHUNKS {
                anyhow::bail!("chunks exceeds max allowed count ({MAX_INGEST_CHUNKS})");
            }
            for chunk in &chunks {
                if chunk.text.len() > MAX_TEXT_BYTES {
                    anyhow::bail!("chunk text exceeds max allowed size ({MAX_TEXT_BYTES} bytes)");
                }
                if chunk.source.len() > MAX_NAME_BYTES {
                    anyhow::bail!("source exceeds max allowed size ({MAX_NAME_BYTES} bytes)");
                }
            }

            let report = retriever.ingest(chunks)?;
            Ok(json!({
                "content": [{ "type": "text", "text": format!(
                    "stored {} chunk(s), wrote {} triple(s), indexed {} chunk(s)",
                    report.chunks_stored, report.triples_written, report.indexed_chunks
                ) }],
                "structuredContent": report
            }))
        }
        "query" => {
            let question = str_arg(&args, "question", MAX_QUESTION_BYTES)?;
            let mut request = retriever.request(question);
            if let Some(topic) = args.get("topic").and_then(JsonValue::as_str) {
                if topic.len() > MAX_NAME_BYTES {
                    anyhow::bail!("topic exceeds max allowed size ({MAX_NAME_BYTES} bytes)");
                }
                request = request.with_topic(topic);
            }
            request.hops = limit_arg(&args, "hops", defaults.hops, graphloom::MAX_TRAVERSAL_HOPS)?;
            request.graph_limit =
                limit_arg(&args, "graph_limit", defaults.graph_limit, MAX_RESULT_LIMIT)?;
            request.vector_k = limit_arg(&args, "vector_k", defaults.vector_k, MAX_RESULT_LIMIT)?;
            if let Some(docs_only) = args.get("docs_only").and_then(JsonValue::as_bool) {
                request.docs_only = docs_only;
            }
            if let Some(mode) = args.get("graph_mode") {
                let mode: GraphMode = serde_json::from_value(mode.clone())
                    .context("graph_mode must be \"traverse\" or \"document_keyword\"")?;
                request.graph_mode = mode;
            }

            let answer = retriever.query(&request)?;
            Ok(json!({
                "content": [{ "type": "text", "text": answer.text.clone() }],
                "structuredContent": answer
            }))
        }
        "retrieve_by_keyword" => {
            let keyword = str_arg(&args, "keyword", MAX_NAME_BYTES)?;
            let limit = limit_arg(&args, "limit", defaults.graph_limit, MAX_RESULT_LIMIT)?;
            let texts = retriever
                .graph()
                .retrieve_by_document_keyword(keyword, limit)?;
            Ok(json!({
                "content": [{ "type": "text", "text": format!("found {} chunk(s)", texts.len()) }],
                "structuredContent": { "chunks": texts }
            }))
        }
        "graph_paths" => {
            let topic = str_arg(&args, "topic", MAX_NAME_BYTES)?;
            let hops = limit_arg(&args, "hops", defaults.hops, graphloom::MAX_TRAVERSAL_HOPS)?;
            let limit = limit_arg(&args, "limit", 20, MAX_RESULT_LIMIT)?;
            let seed = if args.get("ignore_case").and_then(JsonValue::as_bool) == Some(true) {
                SeedFilter::ContainsIgnoreCase(topic.to_string())
            } else {
                SeedFilter::contains(topic)
            };
            let paths = retriever.graph().traversal_paths(&seed, hops, limit)?;
            Ok(json!({
                "content": [{ "type": "text", "text": format!("found {} path(s)", paths.len()) }],
                "structuredContent": { "paths": paths }
            }))
        }
        "graph_stats" => {
            let stats = retriever.graph().stats()?;
            let documents = retriever.graph().document_names()?;
            Ok(json!({
                "content": [{ "type": "text", "text": format!(
                    "{} document(s), {} chunk(s), {} entities, {} relation(s)",
                    stats.documents, stats.chunks, stats.entities, stats.relations
                ) }],
                "structuredContent": {
                    "stats": stats,
                    "documents": documents,
                    "indexed_chunks": retriever.indexed_chunks()
                }
            }))
        }
        "delete_document" => {
            let doc = str_arg(&args, "name", MAX_NAME_BYTES)?;
            let removal = retriever.delete_document(doc)?;
            Ok(json!({
                "content": [{ "type": "text", "text": format!(
                    "deleted {doc}: {} chunk(s), {} orphaned entities", removal.chunks, removal.entities
                ) }],
                "structuredContent": removal
            }))
        }
        "delete_all" => {
            let report = retriever.delete_all();
            let text = if report.is_complete() {
                "deleted all documents and entities".to_string()
            } else {
                format!("delete finished with {} failure(s)", report.failures.len())
            };
            Ok(json!({
                "content": [{ "type": "text", "text": text }],
                "structuredContent": report,
                "isError": !report.is_complete()
            }))
        }
        _ => anyhow::bail!("unknown tool: {name}"),
    }
}
