//! # Command Encoding
//!
//! Purpose: Turn typed job operations into ordered Disque argument lists.
//!
//! ## Design Principles
//! 1. **Positional First**: Required arguments precede every optional flag.
//! 2. **Canonical Flag Order**: Each operation owns a table of flag rules
//!    evaluated top to bottom; a rule that yields nothing is omitted.
//! 3. **Zero Means Omit**: A zero or false option never reaches the wire.

use std::time::Duration;

/// A single Disque command: name plus ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: &'static str,
    args: Vec<Vec<u8>>,
}

impl Command {
    /// Starts a command with no arguments.
    pub fn new(name: &'static str) -> Self {
        Command {
            name,
            args: Vec::new(),
        }
    }

    /// Command name, e.g. `ADDJOB`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Arguments after the command name.
    pub fn args(&self) -> &[Vec<u8>] {
        &self.args
    }

    /// Appends one raw argument.
    pub fn arg(mut self, value: impl AsRef<[u8]>) -> Self {
        self.args.push(value.as_ref().to_vec());
        self
    }

    /// Appends an unsigned integer argument in decimal.
    pub fn int(mut self, value: u64) -> Self {
        self.args.push(encode_u64(value));
        self
    }

    /// Appends a signed integer argument in decimal.
    pub fn signed(mut self, value: i64) -> Self {
        let mut encoded = encode_u64(value.unsigned_abs());
        if value < 0 {
            encoded.insert(0, b'-');
        }
        self.args.push(encoded);
        self
    }

    /// Appends every string as a flat trailing sequence.
    pub fn args_from<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(values.into_iter().map(|value| value.as_ref().as_bytes().to_vec()));
        self
    }

    /// Appends optional flags in table order.
    fn flags<O>(mut self, options: &O, rules: &[FlagRule<O>]) -> Self {
        for rule in rules {
            match (rule.value)(options) {
                Some(FlagValue::Bare) => self.args.push(rule.name.as_bytes().to_vec()),
                Some(FlagValue::Int(value)) => {
                    self.args.push(rule.name.as_bytes().to_vec());
                    self.args.push(encode_u64(value));
                }
                None => {}
            }
        }
        self
    }
}

/// Options for `ADDJOB`. Zero-valued fields are left to the broker default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddJobOptions {
    /// Time to wait for the replication quorum; always sent, in milliseconds.
    pub timeout: Duration,
    /// Replication factor, sent as the duration's whole seconds.
    pub replicate: Duration,
    /// Delay before the job becomes visible.
    pub delay: Duration,
    /// Requeue interval when the job is not acknowledged.
    pub retry: Duration,
    /// Total lifespan of the job.
    pub ttl: Duration,
    /// Refuse the job when the queue already holds this many.
    pub max_len: usize,
    /// Return before replication completes.
    pub async_: bool,
}

/// Options for `GETJOB`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetJobOptions {
    /// Return immediately when no job is available.
    pub no_hang: bool,
    /// Broker-side blocking bound, sent in milliseconds. Zero blocks forever.
    pub timeout: Duration,
    /// Maximum number of jobs to return.
    pub count: usize,
    /// Ask for NACK and delivery counters with each job.
    pub with_counters: bool,
}

/// Options for `QSCAN`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QScanOptions {
    /// Batch size hint for each scan step.
    pub count: usize,
    /// Scan eagerly instead of returning after one step.
    pub busy_loop: bool,
    /// Only report queues with at least this many jobs.
    pub min_len: usize,
    /// Only report queues with at most this many jobs.
    pub max_len: usize,
    /// Only report queues importing at least this many messages per second.
    pub import_rate: usize,
}

enum FlagValue {
    Bare,
    Int(u64),
}

struct FlagRule<O> {
    name: &'static str,
    value: fn(&O) -> Option<FlagValue>,
}

const ADDJOB_FLAGS: [FlagRule<AddJobOptions>; 6] = [
    FlagRule {
        name: "REPLICATE",
        value: |o| seconds(o.replicate),
    },
    FlagRule {
        name: "DELAY",
        value: |o| seconds(o.delay),
    },
    FlagRule {
        name: "RETRY",
        value: |o| seconds(o.retry),
    },
    FlagRule {
        name: "TTL",
        value: |o| seconds(o.ttl),
    },
    FlagRule {
        name: "MAXLEN",
        value: |o| count(o.max_len),
    },
    FlagRule {
        name: "ASYNC",
        value: |o| bare(o.async_),
    },
];

const GETJOB_FLAGS: [FlagRule<GetJobOptions>; 4] = [
    FlagRule {
        name: "NOHANG",
        value: |o| bare(o.no_hang),
    },
    FlagRule {
        name: "TIMEOUT",
        value: |o| millis(o.timeout),
    },
    FlagRule {
        name: "COUNT",
        value: |o| count(o.count),
    },
    FlagRule {
        name: "WITHCOUNTERS",
        value: |o| bare(o.with_counters),
    },
];

const QSCAN_FLAGS: [FlagRule<QScanOptions>; 5] = [
    FlagRule {
        name: "COUNT",
        value: |o| count(o.count),
    },
    FlagRule {
        name: "BUSYLOOP",
        value: |o| bare(o.busy_loop),
    },
    FlagRule {
        name: "MINLEN",
        value: |o| count(o.min_len),
    },
    FlagRule {
        name: "MAXLEN",
        value: |o| count(o.max_len),
    },
    FlagRule {
        name: "IMPORTRATE",
        value: |o| count(o.import_rate),
    },
];

fn seconds(value: Duration) -> Option<FlagValue> {
    match value.as_secs() {
        0 => None,
        secs => Some(FlagValue::Int(secs)),
    }
}

fn millis(value: Duration) -> Option<FlagValue> {
    match duration_millis(value) {
        0 => None,
        ms => Some(FlagValue::Int(ms)),
    }
}

fn count(value: usize) -> Option<FlagValue> {
    match value {
        0 => None,
        n => Some(FlagValue::Int(n as u64)),
    }
}

fn bare(enabled: bool) -> Option<FlagValue> {
    enabled.then_some(FlagValue::Bare)
}

fn duration_millis(value: Duration) -> u64 {
    u64::try_from(value.as_millis()).unwrap_or(u64::MAX)
}

/// `ADDJOB queue body timeout-ms [REPLICATE n] [DELAY s] [RETRY s] [TTL s] [MAXLEN n] [ASYNC]`
pub fn add_job(queue: &str, body: &[u8], options: &AddJobOptions) -> Command {
    Command::new("ADDJOB")
        .arg(queue)
        .arg(body)
        .int(duration_millis(options.timeout))
        .flags(options, &ADDJOB_FLAGS)
}

/// `GETJOB [NOHANG] [TIMEOUT ms] [COUNT n] [WITHCOUNTERS] FROM queue...`
pub fn get_job<I, S>(options: &GetJobOptions, queues: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Command::new("GETJOB")
        .flags(options, &GETJOB_FLAGS)
        .arg("FROM")
        .args_from(queues)
}

/// Commands of the form `NAME id...`: ACKJOB, FASTACK, NACK, ENQUEUE,
/// DEQUEUE and DELJOB.
pub fn with_job_ids<I, S>(name: &'static str, ids: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Command::new(name).args_from(ids)
}

/// `QLEN queue`
pub fn qlen(queue: &str) -> Command {
    Command::new("QLEN").arg(queue)
}

/// `QPEEK queue count`
pub fn qpeek(queue: &str, count: i64) -> Command {
    Command::new("QPEEK").arg(queue).signed(count)
}

/// `SHOW id`
pub fn show(id: &str) -> Command {
    Command::new("SHOW").arg(id)
}

/// `QSCAN [COUNT n] [BUSYLOOP] [MINLEN n] [MAXLEN n] [IMPORTRATE n]`
pub fn qscan(options: &QScanOptions) -> Command {
    Command::new("QSCAN").flags(options, &QSCAN_FLAGS)
}

/// `PING`
pub fn ping() -> Command {
    Command::new("PING")
}

fn encode_u64(mut value: u64) -> Vec<u8> {
    let mut buf = [0u8; 20];
    let mut len = 0;
    if value == 0 {
        return vec![b'0'];
    }
    while value > 0 {
        buf[len] = b'0' + (value % 10) as u8;
        value /= 10;
        len += 1;
    }
    buf[..len].reverse();
    buf[..len].to_vec()
}
