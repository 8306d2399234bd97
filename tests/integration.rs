//! End-to-end tests of the `rag` binary.
//!
//! Every test runs offline: embeddings use the hash provider, and the
//! language model is either disabled or a local stub server.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use axum::{routing::post, Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;

fn rag_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("rag");
    path
}

const FACTS: &str = "Paris is the capital of France. The Seine flows through it.\x0c\
Bananas are rich in potassium and grow in tropical climates.\x0c\
The Rust compiler checks ownership and borrowing at compile time.";

fn setup_test_env(generation: &str) -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let doc_path = root.join("facts.txt");
    fs::write(&doc_path, FACTS).unwrap();

    let config_content = format!(
        r#"[chunking]
chunk_size = 200
chunk_overlap = 20

[retrieval]
k = 2

[embedding]
provider = "hash"
dims = 256

{}

[trace]
run_name = "integration"
"#,
        generation
    );
    let config_path = root.join("rag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path, doc_path)
}

fn run_rag(config_path: &Path, args: &[&str], envs: &[(&str, &str)]) -> (String, String, bool) {
    let binary = rag_binary();
    let output: Output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .envs(envs.iter().copied())
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run rag binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

const DISABLED: &str = "[generation]\nprovider = \"disabled\"";

#[test]
fn test_retrieve_ranks_relevant_page_first() {
    let (_tmp, config_path, doc_path) = setup_test_env(DISABLED);
    let (stdout, stderr, success) = run_rag(
        &config_path,
        &["retrieve", doc_path.to_str().unwrap(), "What is the capital of France?"],
        &[],
    );
    assert!(success, "retrieve failed: {}", stderr);

    let first = stdout.lines().next().unwrap_or_default();
    assert!(first.starts_with("1. ["), "unexpected output: {}", stdout);
    assert!(first.ends_with("(page 1)"), "expected page 1 first: {}", stdout);
    assert!(stdout.contains("Paris is the capital of France"));
    assert!(!stdout.contains("3. ["), "k = 2 must cap results: {}", stdout);
}

#[test]
fn test_retrieve_k_flag_overrides_config() {
    let (_tmp, config_path, doc_path) = setup_test_env(DISABLED);
    let (stdout, stderr, success) = run_rag(
        &config_path,
        &["retrieve", doc_path.to_str().unwrap(), "potassium", "--k", "1"],
        &[],
    );
    assert!(success, "retrieve failed: {}", stderr);
    assert!(stdout.contains("(page 2)"));
    assert!(!stdout.contains("2. ["));
}

#[test]
fn test_pdf_with_disabled_generator_fails_without_answer() {
    let (_tmp, config_path, doc_path) = setup_test_env(DISABLED);
    let (stdout, stderr, success) = run_rag(
        &config_path,
        &["pdf", doc_path.to_str().unwrap(), "--question", "Where is Paris?"],
        &[],
    );
    assert!(!success);
    assert!(stdout.trim().is_empty(), "no answer may be printed: {}", stdout);
    assert!(stderr.contains("generation provider is disabled"), "stderr: {}", stderr);
}

#[test]
fn test_missing_document_is_reported() {
    let (tmp, config_path, _) = setup_test_env(DISABLED);
    let missing = tmp.path().join("nope.pdf");
    let (_, stderr, success) = run_rag(
        &config_path,
        &["retrieve", missing.to_str().unwrap(), "anything"],
        &[],
    );
    assert!(!success);
    assert!(stderr.contains("source unavailable"), "stderr: {}", stderr);
}

#[test]
fn test_corrupt_pdf_is_reported() {
    let (tmp, config_path, _) = setup_test_env(DISABLED);
    let pdf = tmp.path().join("broken.pdf");
    fs::write(&pdf, b"%PDF-1.4\nthis is not really a pdf").unwrap();
    let (_, stderr, success) =
        run_rag(&config_path, &["retrieve", pdf.to_str().unwrap(), "x"], &[]);
    assert!(!success);
    assert!(stderr.contains("source unavailable"), "stderr: {}", stderr);
}

#[test]
fn test_invalid_config_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("rag.toml");
    fs::write(&config_path, "[chunking]\nchunk_size = 100\nchunk_overlap = 200\n").unwrap();
    let (_, stderr, success) = run_rag(&config_path, &["ask", "hi"], &[]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"), "stderr: {}", stderr);
}

#[test]
fn test_missing_api_key_is_configuration_error() {
    let (_tmp, config_path, _) = setup_test_env(
        "[generation]\nprovider = \"openai\"\napi_key_env = \"PDF_RAG_INTEGRATION_KEY_UNSET\"",
    );
    let (_, stderr, success) = run_rag(&config_path, &["ask", "hi"], &[]);
    assert!(!success);
    assert!(
        stderr.contains("PDF_RAG_INTEGRATION_KEY_UNSET environment variable not set"),
        "stderr: {}",
        stderr
    );
}

// ============ Against a stub chat-completions server ============

/// Answers from the `<context>` section: the first line after the first
/// chunk header, or the refusal when nothing relevant was retrieved.
async fn stub_completion(Json(body): Json<Value>) -> Json<Value> {
    let user = body["messages"][1]["content"]
        .as_str()
        .or_else(|| body["messages"][0]["content"].as_str())
        .unwrap_or_default()
        .to_string();
    let content = if user.contains("<context>") {
        let mut lines = user.lines().skip_while(|l| !l.starts_with("[1] (page"));
        lines.next();
        lines.next().unwrap_or("I don't know.").to_string()
    } else {
        format!("echo: {}", user)
    };
    Json(json!({
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
    }))
}

async fn spawn_stub() -> String {
    let router = Router::new().route("/chat/completions", post(stub_completion));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn stub_generation(base_url: &str) -> String {
    format!(
        "[generation]\nprovider = \"openai\"\nbase_url = \"{}\"\n\
         api_key_env = \"PDF_RAG_STUB_KEY\"\nmax_retries = 0",
        base_url
    )
}

async fn run_rag_async(config_path: PathBuf, args: Vec<String>) -> (String, String, bool) {
    tokio::task::spawn_blocking(move || {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run_rag(&config_path, &args, &[("PDF_RAG_STUB_KEY", "test-key")])
    })
    .await
    .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pdf_answers_from_retrieved_context() {
    let base_url = spawn_stub().await;
    let (_tmp, config_path, doc_path) = setup_test_env(&stub_generation(&base_url));
    let (stdout, stderr, success) = run_rag_async(
        config_path,
        vec![
            "pdf".into(),
            doc_path.to_string_lossy().into_owned(),
            "--question".into(),
            "What is the capital of France?".into(),
        ],
    )
    .await;
    assert!(success, "pdf failed: {}", stderr);
    assert_eq!(
        stdout.trim(),
        "Paris is the capital of France. The Seine flows through it."
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ask_and_chain_use_the_model() {
    let base_url = spawn_stub().await;
    let (_tmp, config_path, _) = setup_test_env(&stub_generation(&base_url));

    let (stdout, stderr, success) = run_rag_async(
        config_path.clone(),
        vec!["ask".into(), "what is the capital of india?".into()],
    )
    .await;
    assert!(success, "ask failed: {}", stderr);
    assert_eq!(stdout.trim(), "echo: what is the capital of india?");

    let (stdout, stderr, success) =
        run_rag_async(config_path, vec!["chain".into(), "Unemployment in India".into()]).await;
    assert!(success, "chain failed: {}", stderr);
    assert!(stdout.starts_with("echo: Generate a 5 pointer summary from the following text"));
    assert!(stdout.contains("echo: Generate a detailed report on Unemployment in India"));
}
