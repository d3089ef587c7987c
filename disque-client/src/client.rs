//! # Synchronous Client API
//!
//! Purpose: Expose a compact, blocking API for Disque job operations over
//! RESP2, with ordered endpoint failover.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `DisqueClient` hides pooling, encoding and decoding.
//! 2. **Acquire Before Encode**: No command is built without a connection.
//! 3. **Fail Fast**: Shape mismatches surface immediately as decode errors.
//! 4. **No Hidden Retries**: Every failure goes straight back to the caller.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::{self, AddJobOptions, Command, GetJobOptions, QScanOptions};
use crate::decode::{self, Job, JobInfo};
use crate::endpoints::EndpointPool;
use crate::error::ClientResult;
use crate::pool::PoolConfig;
use crate::resp::Reply;

/// Configuration for the client and its per-endpoint pools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Broker endpoints in failover order, e.g. "127.0.0.1:7711".
    pub endpoints: Vec<String>,
    /// Maximum idle connections kept per endpoint.
    pub max_idle: usize,
    /// Maximum total connections per endpoint; `None` means unbounded.
    pub max_total: Option<usize>,
    /// Optional TCP read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    pub write_timeout: Option<Duration>,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            endpoints: vec!["127.0.0.1:7711".to_string()],
            max_idle: 3,
            max_total: None,
            read_timeout: None,
            write_timeout: None,
            connect_timeout: None,
        }
    }
}

impl ClientConfig {
    fn pool_configs(&self) -> Vec<PoolConfig> {
        self.endpoints
            .iter()
            .map(|addr| PoolConfig {
                addr: addr.clone(),
                max_idle: self.max_idle,
                max_total: self.max_total,
                read_timeout: self.read_timeout,
                write_timeout: self.write_timeout,
                connect_timeout: self.connect_timeout,
            })
            .collect()
    }
}

/// Synchronous Disque client.
///
/// Each call acquires a connection from the first reachable endpoint, runs one
/// command, and returns the connection to that endpoint's pool.
#[derive(Clone)]
pub struct DisqueClient {
    endpoints: EndpointPool,
}

impl DisqueClient {
    /// Creates a client for the given endpoints with default pool settings.
    pub fn new<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_config(ClientConfig {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            ..ClientConfig::default()
        })
    }

    /// Creates a client with a custom configuration.
    pub fn with_config(config: ClientConfig) -> Self {
        DisqueClient {
            endpoints: EndpointPool::new(config.pool_configs()),
        }
    }

    /// Submits a job and returns the broker-assigned id.
    pub fn add_job(
        &self,
        queue: &str,
        body: impl AsRef<[u8]>,
        options: &AddJobOptions,
    ) -> ClientResult<String> {
        self.run(
            || command::add_job(queue, body.as_ref(), options),
            decode::job_id,
        )
    }

    /// Fetches jobs from the first queues that have any.
    ///
    /// Returns an empty list when nothing is available within the timeout or
    /// when `no_hang` is set and the queues are empty. With neither `no_hang`
    /// nor a timeout this blocks until a job arrives.
    pub fn get_job<I, S>(&self, options: &GetJobOptions, queues: I) -> ClientResult<Vec<Job>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let with_counters = options.with_counters;
        self.run(
            || command::get_job(options, queues),
            |reply| decode::jobs(reply, with_counters),
        )
    }

    /// Acknowledges jobs. Returns how many were known to the broker.
    pub fn ack_job<I, S>(&self, ids: I) -> ClientResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.run(|| command::with_job_ids("ACKJOB", ids), decode::count)
    }

    /// Acknowledges jobs without replication bookkeeping.
    pub fn fast_ack<I, S>(&self, ids: I) -> ClientResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.run(|| command::with_job_ids("FASTACK", ids), decode::count)
    }

    /// Puts jobs back in their queues as failed deliveries.
    pub fn nack<I, S>(&self, ids: I) -> ClientResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.run(|| command::with_job_ids("NACK", ids), decode::count)
    }

    /// Returns the number of jobs queued in `queue`.
    pub fn qlen(&self, queue: &str) -> ClientResult<usize> {
        self.run(|| command::qlen(queue), decode::count)
    }

    /// Returns up to `count` jobs without removing them. A negative count
    /// peeks from the newest end.
    pub fn qpeek(&self, queue: &str, count: i64) -> ClientResult<Vec<Job>> {
        self.run(|| command::qpeek(queue, count), |reply| decode::jobs(reply, false))
    }

    /// Queues jobs that are not currently queued.
    pub fn enqueue<I, S>(&self, ids: I) -> ClientResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.run(|| command::with_job_ids("ENQUEUE", ids), decode::count)
    }

    /// Removes jobs from their queues without deleting them.
    pub fn dequeue<I, S>(&self, ids: I) -> ClientResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.run(|| command::with_job_ids("DEQUEUE", ids), decode::count)
    }

    /// Deletes jobs from the node that receives the command.
    pub fn del_job<I, S>(&self, ids: I) -> ClientResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.run(|| command::with_job_ids("DELJOB", ids), decode::count)
    }

    /// Returns the broker's metadata for one job.
    ///
    /// An unknown id is an error, never an empty map.
    pub fn show(&self, id: &str) -> ClientResult<JobInfo> {
        self.run(|| command::show(id), decode::job_info)
    }

    /// Scans queues; the raw reply items are returned as-is.
    pub fn qscan(&self, options: &QScanOptions) -> ClientResult<Vec<Reply>> {
        self.run(|| command::qscan(options), decode::scan)
    }

    /// Pings the first reachable endpoint and returns its status text.
    pub fn ping(&self) -> ClientResult<String> {
        self.run(command::ping, decode::status)
    }

    /// Closes every endpoint pool. Connections still in use are dropped
    /// when they are released.
    pub fn close(&self) -> ClientResult<()> {
        self.endpoints.close()
    }

    fn run<T>(
        &self,
        build: impl FnOnce() -> Command,
        decode: impl FnOnce(Reply) -> ClientResult<T>,
    ) -> ClientResult<T> {
        let mut conn = self.endpoints.acquire()?;
        let command = build();
        debug!(command = command.name(), addr = %conn.addr(), "sending command");
        let reply = conn.exec(&command)?;
        decode(reply)
    }
}
