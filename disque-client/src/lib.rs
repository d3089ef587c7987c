//! # Disque Sync Client
//!
//! Purpose: Provide a synchronous client for the Disque job queue broker,
//! with one connection pool per endpoint and ordered failover between them.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse TCP connections, probing idle ones with `PING`.
//! 2. **Failover by Order**: The first reachable endpoint serves the call.
//! 3. **Typed Edges**: Options structs in, typed results out; the wire stays inside.
//! 4. **Protocol Clarity**: Encode/parse RESP2 explicitly for correctness.

mod client;
mod command;
mod decode;
mod endpoints;
mod error;
mod pool;
mod resp;

pub use client::{ClientConfig, DisqueClient};
pub use command::{AddJobOptions, GetJobOptions, QScanOptions};
pub use decode::{Job, JobCounters, JobInfo};
pub use error::{ClientError, ClientResult};
pub use resp::Reply;
