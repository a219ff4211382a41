//! Connection acceptor and per-request dispatcher.
//!
//! One exchange per connection: read a single JSON request (≤ 4096 bytes),
//! answer with one fixed token, record the latency, close. The acceptor
//! never blocks on request processing; every accepted connection runs in
//! its own task, and a failure there terminates only that task.

use crate::metrics::{MetricRecord, MetricsSink};
use crate::search::Catalogue;
use crate::snapshot::Snapshot;
use crate::store::FileStore;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error};

/// Payload buffer cap for one request.
pub const PAYLOAD_SIZE: usize = 4096;

/// Reply sent when the query equals some line of the snapshot.
pub const RESPONSE_EXISTS: &[u8] = b"STRING EXISTS";
/// Reply sent otherwise.
pub const RESPONSE_NOT_FOUND: &[u8] = b"STRING NOT FOUND";
/// Reply sent when the request could not be processed at all.
pub const RESPONSE_INTERNAL_ERROR: &[u8] = b"ERROR: An internal error occurred";

/// One wire request. Unknown fields are ignored; missing fields default to
/// empty, which the validation step maps to the default algorithm.
#[derive(Debug, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub query_string: String,
    #[serde(default)]
    pub algorithm: String,
}

/// Shared state every connection worker needs.
pub struct ServerContext {
    pub store: Arc<FileStore>,
    pub catalogue: Catalogue,
    pub file_path: PathBuf,
    pub reread_on_query: bool,
    pub metrics: MetricsSink,
}

/// Accept loop: one fresh task per connection, optional TLS wrap.
/// Returns only on a fatal listener error.
pub async fn run_acceptor(listener: TcpListener, tls: Option<TlsAcceptor>, ctx: Arc<ServerContext>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                error!(error = %e, "accept failed, shutting down listener");
                return;
            }
        };
        debug!(peer = %peer, "connection established");

        let ctx = Arc::clone(&ctx);
        match tls.clone() {
            Some(acceptor) => {
                tokio::spawn(async move {
                    match acceptor.accept(stream).await {
                        Ok(tls_stream) => handle_connection(tls_stream, peer, ctx).await,
                        Err(e) => debug!(peer = %peer, error = %e, "TLS handshake failed"),
                    }
                });
            }
            None => {
                tokio::spawn(handle_connection(stream, peer, ctx));
            }
        }
    }
}

/// Drive one connection through the request state machine:
/// read → parse → validate → acquire snapshot → execute → reply → record.
pub async fn handle_connection<S>(mut stream: S, peer: SocketAddr, ctx: Arc<ServerContext>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let started = Instant::now();
    let mut buf = vec![0u8; PAYLOAD_SIZE];

    let received = match stream.read(&mut buf).await {
        Ok(0) => {
            debug!(peer = %peer, "connection closed before sending a request");
            return;
        }
        Ok(n) => n,
        Err(e) => {
            debug!(peer = %peer, error = %e, "failed to read request");
            return;
        }
    };

    let payload = trim_trailing_nuls(&buf[..received]);
    let text = match std::str::from_utf8(payload) {
        Ok(t) => t,
        Err(e) => {
            debug!(peer = %peer, error = %e, "request is not valid UTF-8");
            let _ = stream.write_all(RESPONSE_INTERNAL_ERROR).await;
            return;
        }
    };
    debug!(peer = %peer, query = text, "search query received");

    // Malformed JSON closes the connection without a reply.
    let request: Request = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            debug!(peer = %peer, error = %e, "failed to parse query");
            return;
        }
    };

    let index = ctx.catalogue.select(&request.algorithm, &request.query_string);
    debug!(
        algorithm = ctx.catalogue.name_of(index),
        reread_on_query = ctx.reread_on_query,
        "dispatching query"
    );

    let snapshot = if ctx.reread_on_query {
        // Transient snapshot for this request only; the store is untouched.
        match Snapshot::load(&ctx.file_path) {
            Ok(snapshot) => Arc::new(snapshot),
            Err(e) => {
                error!(path = %ctx.file_path.display(), error = %e, "failed to re-read watched file");
                let _ = stream.write_all(RESPONSE_INTERNAL_ERROR).await;
                return;
            }
        }
    } else {
        ctx.store.current()
    };

    let found = ctx.catalogue.execute(index, &snapshot, &request.query_string);
    let reply = if found { RESPONSE_EXISTS } else { RESPONSE_NOT_FOUND };
    if let Err(e) = stream.write_all(reply).await {
        debug!(peer = %peer, error = %e, "client went away before the reply");
        return;
    }

    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    ctx.metrics.record(MetricRecord {
        algorithm_index: index,
        reread_mode: ctx.reread_on_query,
        elapsed_ms,
    });
    debug!(peer = %peer, elapsed_ms, "query processed");
}

/// Strip trailing NUL padding from a receive buffer.
pub fn trim_trailing_nuls(buf: &[u8]) -> &[u8] {
    let end = buf.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &buf[..end]
}
