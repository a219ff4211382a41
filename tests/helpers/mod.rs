//! Test harness: boots a full server (store, watcher, metrics sink,
//! acceptor) on an ephemeral port around a temp data file, then exchanges
//! one request per connection like a real client.

use linematch_server::metrics::MetricsSink;
use linematch_server::search::Catalogue;
use linematch_server::server::{run_acceptor, ServerContext};
use linematch_server::snapshot::Snapshot;
use linematch_server::store::FileStore;
use linematch_server::watch;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Catalogue order used by every test server; mirrors the shipped
/// descriptor.
pub const ALL_ALGORITHMS: &[&str] = &[
    "default",
    "hash_table",
    "linear",
    "binary",
    "jump",
    "ternary",
    "exponential",
    "interpolation",
    "fibonacci",
    "tim",
    "shell",
    "trie",
    "inverted_index",
    "graph",
];

pub struct TestServer {
    pub addr: SocketAddr,
    pub store: Arc<FileStore>,
    pub data_path: PathBuf,
    pub metrics_path: PathBuf,
    _watcher: Option<notify::RecommendedWatcher>,
    _temp_dir: TempDir,
}

impl TestServer {
    /// Boot a server over `lines` written to a temp data file.
    pub async fn start(lines: &[&str], reread_on_query: bool) -> Self {
        let temp_dir = TempDir::new().expect("temp dir");
        let data_path = temp_dir.path().join("data.txt");
        let mut contents = lines.join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }
        std::fs::write(&data_path, contents).expect("write data file");
        let metrics_path = temp_dir.path().join("metrics.json");

        let names: Vec<String> = ALL_ALGORITHMS.iter().map(|s| s.to_string()).collect();
        let snapshot = Snapshot::load(&data_path).expect("initial snapshot");
        let store = Arc::new(FileStore::new(snapshot));
        let catalogue = Catalogue::new(names.clone()).expect("catalogue");
        let metrics = MetricsSink::spawn(metrics_path.clone(), names);
        let watcher = watch::start_watcher(data_path.clone(), Arc::clone(&store));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let ctx = Arc::new(ServerContext {
            store: Arc::clone(&store),
            catalogue,
            file_path: data_path.clone(),
            reread_on_query,
            metrics,
        });
        tokio::spawn(run_acceptor(listener, None, ctx));

        Self {
            addr,
            store,
            data_path,
            metrics_path,
            _watcher: watcher,
            _temp_dir: temp_dir,
        }
    }

    /// One raw exchange: send `payload`, read to EOF, return the reply bytes.
    pub async fn exchange(&self, payload: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(self.addr).await.expect("connect");
        stream.write_all(payload).await.expect("send");
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.expect("recv");
        reply
    }

    /// JSON request helper returning the reply as text.
    pub async fn query(&self, query_string: &str, algorithm: &str) -> String {
        let payload = serde_json::json!({
            "query_string": query_string,
            "algorithm": algorithm,
        });
        let reply = self.exchange(payload.to_string().as_bytes()).await;
        String::from_utf8(reply).expect("utf-8 reply")
    }
}
