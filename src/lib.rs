//! precache - pre-cache a fixed asset list and serve requests cache-first.
//!
//! A [`CacheFirstWorker`] handles two events. On install it fetches every
//! configured asset and stores them in one named cache, failing as a unit if
//! any asset cannot be fetched. On fetch it answers from that cache when the
//! request matches and otherwise goes to the network, without storing what
//! the network returns. A [`WorkerHost`] owns the lifecycle and only
//! dispatches fetch events once install has succeeded.
//!
//! # Example
//!
//! ```no_run
//! use precache::{CacheFirstWorker, DiskStorage, HttpConfig, HttpFetcher, Request, WorkerConfig, WorkerHost};
//!
//! # async fn example() -> precache::Result<()> {
//! let config = WorkerConfig::new().with_origin("http://192.168.4.1/");
//! let worker = CacheFirstWorker::new(
//!     config,
//!     DiskStorage::new("/var/lib/precache"),
//!     HttpFetcher::new(&HttpConfig::default())?,
//! )?;
//!
//! let host = WorkerHost::new(worker);
//! let stats = host.install().await?;
//! println!("Cached {} assets", stats.assets_cached);
//!
//! let outcome = host.fetch(&Request::get_str("http://192.168.4.1/index.html")?).await?;
//! assert!(outcome.is_cache_hit());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod format;
pub mod fs;
pub mod lifecycle;
pub mod request;
pub mod response;
#[cfg(feature = "server")]
pub mod server;
pub mod stats;
pub mod worker;

// Re-export main types for convenience
pub use cache::{Cache, CacheStorage, DiskCache, DiskStorage, MemoryCache, MemoryStorage};
pub use config::{AppConfig, HttpConfig, PathConfig, ServerConfig, WorkerConfig};
pub use error::{Error, Result};
pub use fetch::{Fetcher, HttpFetcher};
pub use format::{format_bytes, format_duration};
pub use fs::{FileSystem, TokioFileSystem};
pub use lifecycle::{WorkerHost, WorkerState};
pub use request::{Request, RequestKey};
pub use response::Response;
pub use stats::{InstallStats, InstallStatsBuilder};
pub use worker::{CacheFirstWorker, FetchOutcome, InstallProgress, NoProgress, Worker};
