//! linematch server — answers exact whole-line membership queries over a
//! watched text file, one JSON request per TCP (optionally TLS) connection.
//!
//! The library exposes the building blocks the binary wires together: the
//! config loader, the snapshot model and its process-wide store, the file
//! watcher, the algorithm catalogue, the acceptor/dispatcher, and the
//! metrics sink.

pub mod config;
pub mod metrics;
pub mod search;
pub mod server;
pub mod snapshot;
pub mod store;
pub mod tls;
pub mod watch;

pub use search::Catalogue;
pub use snapshot::Snapshot;
pub use store::FileStore;
