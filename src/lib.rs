//! S3 Adaptor Library
//!
//! A compact object-storage client for S3 and S3-compatible services.
//!
//! # Features
//!
//! - **Bucket and object operations**: create, delete, list, head, copy
//! - **Multipart uploads**: stateless calls or a tracked [`MultipartSession`]
//! - **Streaming bodies**: pull-based [`stream::ChunkSource`] uploads and
//!   bounded-chunk downloads
//! - **Presigned URLs**: time-limited GET/PUT access
//! - **Loose options**: callers pass name/value [`binder::Options`] that are
//!   bound onto typed requests
//! - **Classified errors**: every failure carries a namespaced
//!   [`error::ErrorKind`]
//!
//! # Example
//!
//! ```no_run
//! use s3_adaptor::{binder::Options, config::Config, ObjectClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let client = ObjectClient::from_config(&config).await?;
//!     for bucket in client.list_buckets().await? {
//!         println!("{} ({})", bucket.name, bucket.region);
//!     }
//!     let exists = client.object_exists("reports", "q1.csv").await?;
//!     println!("q1.csv exists: {}", exists);
//!     let page = client
//!         .list_objects("reports", &Options::new().with("prefix", "2024/"))
//!         .await?;
//!     println!("{} objects under 2024/", page.count);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod binder;
pub mod config;
pub mod error;
pub mod metrics;
pub mod s3;
pub mod stream;
pub mod transfer;

// Re-export commonly used types
pub use config::Config;
pub use error::{AdaptorError, ErrorKind};
pub use transfer::{MultipartSession, ObjectClient, ObjectReader, TransferBody};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
