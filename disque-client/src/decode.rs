//! # Reply Decoding
//!
//! Purpose: Narrow the broker's `Reply` tree into the typed result of each
//! operation.
//!
//! ## Design Principles
//! 1. **Exhaustive Matching**: Every unexpected shape has an explicit error arm.
//! 2. **All or Nothing**: A single malformed element fails the whole reply.
//! 3. **Open Metadata**: `SHOW` values keep their reply shape untouched.

use std::collections::HashMap;

use bytes::Bytes;

use crate::error::{ClientError, ClientResult};
use crate::resp::Reply;

/// A job as returned by `GETJOB` or `QPEEK`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Queue the job currently belongs to.
    pub queue: String,
    /// Broker-assigned opaque identifier.
    pub id: String,
    /// Opaque payload.
    pub body: Bytes,
    /// Present when the job was fetched with `with_counters`.
    pub counters: Option<JobCounters>,
}

/// Per-job counters returned by `GETJOB ... WITHCOUNTERS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobCounters {
    /// Best-effort count of negative acknowledgements the job received.
    pub nacks: i64,
    /// Deliveries beyond the first, e.g. after retry timeouts.
    pub additional_deliveries: i64,
}

/// Job metadata returned by `SHOW`, keyed by field name.
pub type JobInfo = HashMap<String, Reply>;

/// Decodes an affected-count reply.
pub fn count(reply: Reply) -> ClientResult<usize> {
    match reply {
        Reply::Integer(value) => usize::try_from(value)
            .map_err(|_| ClientError::decode("non-negative integer", value.to_string())),
        other => Err(ClientError::decode("integer", other.kind())),
    }
}

/// Decodes the job id returned by `ADDJOB`.
pub fn job_id(reply: Reply) -> ClientResult<String> {
    match reply {
        Reply::Bulk(data) => utf8(data, "job id"),
        Reply::Status(text) => Ok(text),
        other => Err(ClientError::decode("bulk string job id", other.kind())),
    }
}

/// Decodes a status reply such as `PONG`.
pub fn status(reply: Reply) -> ClientResult<String> {
    match reply {
        Reply::Status(text) => Ok(text),
        Reply::Bulk(data) => utf8(data, "status"),
        other => Err(ClientError::decode("status", other.kind())),
    }
}

/// Decodes a list of job tuples. Nil means nothing was available.
pub fn jobs(reply: Reply, with_counters: bool) -> ClientResult<Vec<Job>> {
    let items = match reply {
        Reply::Nil => return Ok(Vec::new()),
        Reply::Array(items) => items,
        other => return Err(ClientError::decode("array of jobs", other.kind())),
    };
    items
        .into_iter()
        .map(|item| job(item, with_counters))
        .collect()
}

fn job(reply: Reply, with_counters: bool) -> ClientResult<Job> {
    let fields = match reply {
        Reply::Array(fields) => fields,
        other => return Err(ClientError::decode("job tuple", other.kind())),
    };
    let expected_len = if with_counters { 7 } else { 3 };
    if fields.len() != expected_len {
        let expected = if with_counters {
            "job tuple of 7"
        } else {
            "job tuple of 3"
        };
        return Err(ClientError::decode(expected, format!("array of {}", fields.len())));
    }

    let mut fields = fields.into_iter();
    let queue = string_field(fields.next(), "queue name")?;
    let id = string_field(fields.next(), "job id")?;
    let body = match fields.next() {
        Some(Reply::Bulk(data)) => data,
        Some(other) => return Err(ClientError::decode("bulk string body", other.kind())),
        None => return Err(ClientError::decode("bulk string body", "nothing")),
    };
    let counters = if with_counters {
        let rest: Vec<Reply> = fields.collect();
        let pairs = pairs(rest)?;
        Some(JobCounters {
            nacks: counter(&pairs, "nacks")?,
            additional_deliveries: counter(&pairs, "additional-deliveries")?,
        })
    } else {
        None
    };

    Ok(Job {
        queue,
        id,
        body,
        counters,
    })
}

fn counter(pairs: &JobInfo, name: &'static str) -> ClientResult<i64> {
    match pairs.get(name) {
        Some(Reply::Integer(value)) => Ok(*value),
        Some(other) => Err(ClientError::decode("integer counter", other.kind())),
        None => Err(ClientError::decode("job counters", format!("no {} field", name))),
    }
}

/// Decodes the flat key/value array returned by `SHOW`.
pub fn job_info(reply: Reply) -> ClientResult<JobInfo> {
    match reply {
        Reply::Array(items) => pairs(items),
        other => Err(ClientError::decode("key/value array", other.kind())),
    }
}

/// Decodes the raw array returned by `QSCAN`.
pub fn scan(reply: Reply) -> ClientResult<Vec<Reply>> {
    match reply {
        Reply::Array(items) => Ok(items),
        other => Err(ClientError::decode("array", other.kind())),
    }
}

fn pairs(items: Vec<Reply>) -> ClientResult<JobInfo> {
    if items.len() % 2 != 0 {
        return Err(ClientError::decode(
            "even-length key/value array",
            format!("array of {}", items.len()),
        ));
    }
    let mut map = HashMap::with_capacity(items.len() / 2);
    let mut items = items.into_iter();
    while let (Some(key), Some(value)) = (items.next(), items.next()) {
        let key = match key {
            Reply::Bulk(data) => utf8(data, "string key")?,
            Reply::Status(text) => text,
            other => return Err(ClientError::decode("string key", other.kind())),
        };
        map.insert(key, value);
    }
    Ok(map)
}

fn string_field(field: Option<Reply>, expected: &'static str) -> ClientResult<String> {
    match field {
        Some(Reply::Bulk(data)) => utf8(data, expected),
        Some(Reply::Status(text)) => Ok(text),
        Some(other) => Err(ClientError::decode(expected, other.kind())),
        None => Err(ClientError::decode(expected, "nothing")),
    }
}

fn utf8(data: Bytes, expected: &'static str) -> ClientResult<String> {
    String::from_utf8(data.to_vec()).map_err(|_| ClientError::decode(expected, "non-UTF-8 bytes"))
}
