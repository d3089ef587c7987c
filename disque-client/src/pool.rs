//! # Per-Endpoint Connection Pool
//!
//! Purpose: Reuse TCP connections to one broker endpoint, validating idle
//! connections with `PING` before handing them out.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Keep a bounded set of idle connections.
//! 2. **Minimal Locking**: Hold the mutex only while moving idle connections.
//! 3. **Lazy Dialing**: Nothing connects until the first acquisition.
//! 4. **Probe on Borrow**: A stale idle connection is discarded, not returned.

use std::collections::VecDeque;
use std::io::{BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::command::{self, Command};
use crate::error::{ClientError, ClientResult};
use crate::resp::{encode_command, read_response, Reply};

/// Pool configuration for a single endpoint.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Endpoint address, e.g. "127.0.0.1:7711".
    pub addr: String,
    /// Maximum number of idle connections to keep.
    pub max_idle: usize,
    /// Maximum total connections (idle + in-use); `None` means unbounded.
    pub max_total: Option<usize>,
    /// Optional TCP read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    pub write_timeout: Option<Duration>,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
}

struct PoolState {
    idle: VecDeque<Connection>,
    total: usize,
    closed: bool,
}

struct PoolInner {
    config: PoolConfig,
    state: Mutex<PoolState>,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // Every critical section leaves the state consistent, so a poisoned
        // lock is still safe to use.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Connection pool handle for one endpoint.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Creates an empty pool. No connection is dialed here.
    pub fn new(config: PoolConfig) -> Self {
        let state = PoolState {
            idle: VecDeque::with_capacity(config.max_idle),
            total: 0,
            closed: false,
        };
        ConnectionPool {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(state),
            }),
        }
    }

    /// Endpoint address this pool dials.
    pub fn addr(&self) -> &str {
        &self.inner.config.addr
    }

    /// Acquires a live connection.
    ///
    /// Idle connections are probed with `PING`; failures are dropped and the
    /// next idle connection is tried before dialing a new one.
    pub fn acquire(&self) -> ClientResult<PooledConnection> {
        while let Some(mut conn) = self.pop_idle()? {
            match conn.exec(&command::ping()) {
                Ok(_) => return Ok(PooledConnection::new(self.inner.clone(), conn)),
                Err(err) => {
                    debug!(addr = %self.addr(), error = %err, "discarding stale connection");
                    self.release_slot();
                }
            }
        }

        self.try_reserve()?;

        match Connection::connect(&self.inner.config) {
            Ok(conn) => {
                debug!(addr = %self.addr(), "dialed new connection");
                Ok(PooledConnection::new(self.inner.clone(), conn))
            }
            Err(err) => {
                self.release_slot();
                Err(err)
            }
        }
    }

    /// Closes the pool and every idle connection.
    ///
    /// All idle connections are shut down even when one fails; the first
    /// failure is returned.
    pub fn close(&self) -> ClientResult<()> {
        let idle: Vec<Connection> = {
            let mut state = self.inner.lock();
            state.closed = true;
            let idle: Vec<Connection> = state.idle.drain(..).collect();
            state.total = state.total.saturating_sub(idle.len());
            idle
        };

        let mut first_error = None;
        for conn in idle {
            if let Err(err) = conn.shutdown() {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn pop_idle(&self) -> ClientResult<Option<Connection>> {
        let mut state = self.inner.lock();
        if state.closed {
            return Err(ClientError::PoolClosed);
        }
        Ok(state.idle.pop_front())
    }

    fn try_reserve(&self) -> ClientResult<()> {
        let mut state = self.inner.lock();
        if state.closed {
            return Err(ClientError::PoolClosed);
        }
        if let Some(max_total) = self.inner.config.max_total {
            if state.total >= max_total {
                return Err(ClientError::PoolExhausted);
            }
        }
        state.total += 1;
        Ok(())
    }

    fn release_slot(&self) {
        release_slot(&self.inner);
    }
}

fn release_slot(inner: &PoolInner) {
    let mut state = inner.lock();
    state.total = state.total.saturating_sub(1);
}

fn return_connection(inner: &PoolInner, conn: Connection) {
    let mut state = inner.lock();
    if !state.closed && state.idle.len() < inner.config.max_idle {
        state.idle.push_back(conn);
    } else {
        state.total = state.total.saturating_sub(1);
    }
}

/// RAII wrapper returning a connection to its own pool on drop.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    conn: Option<Connection>,
    valid: bool,
}

impl PooledConnection {
    fn new(pool: Arc<PoolInner>, conn: Connection) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
            valid: true,
        }
    }

    /// Endpoint address this connection belongs to.
    pub fn addr(&self) -> &str {
        &self.pool.config.addr
    }

    /// Sends a command and returns the parsed reply.
    pub fn exec(&mut self, command: &Command) -> ClientResult<Reply> {
        let conn = match self.conn.as_mut() {
            Some(conn) => conn,
            None => return Err(ClientError::Protocol("connection already released")),
        };
        let response = conn.exec(command);
        if let Err(err) = &response {
            // IO/framing failures leave the stream unusable; error replies do not.
            if err.is_fatal_to_connection() {
                self.valid = false;
            }
        }
        response
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => return,
        };

        if self.valid {
            return_connection(&self.pool, conn);
        } else {
            release_slot(&self.pool);
        }
    }
}

/// Single TCP connection with reusable buffers.
struct Connection {
    // Buffered reader reduces syscalls while still allowing direct writes.
    reader: BufReader<TcpStream>,
    line_buf: Vec<u8>,
    write_buf: Vec<u8>,
}

impl Connection {
    fn connect(config: &PoolConfig) -> ClientResult<Self> {
        let stream = connect_stream(config)?;
        if let Some(timeout) = config.read_timeout {
            stream.set_read_timeout(Some(timeout))?;
        }
        if let Some(timeout) = config.write_timeout {
            stream.set_write_timeout(Some(timeout))?;
        }
        // Disable Nagle to keep request latency low for small payloads.
        stream.set_nodelay(true)?;

        Ok(Connection {
            reader: BufReader::new(stream),
            line_buf: Vec::with_capacity(128),
            write_buf: Vec::with_capacity(256),
        })
    }

    fn exec(&mut self, command: &Command) -> ClientResult<Reply> {
        self.write_buf.clear();
        encode_command(command, &mut self.write_buf);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buf)?;
        stream.flush()?;

        read_response(&mut self.reader, &mut self.line_buf)
    }

    fn shutdown(self) -> ClientResult<()> {
        match self.reader.get_ref().shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // The peer already hung up; nothing left to close.
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn connect_stream(config: &PoolConfig) -> ClientResult<TcpStream> {
    let addrs: Vec<SocketAddr> = config
        .addr
        .to_socket_addrs()
        .map_err(|_| ClientError::InvalidAddress(config.addr.clone()))?
        .collect();
    if addrs.is_empty() {
        return Err(ClientError::InvalidAddress(config.addr.clone()));
    }

    let mut last_error = None;
    for addr in addrs {
        let attempt = match config.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(err) => last_error = Some(err),
        }
    }
    match last_error {
        Some(err) => Err(err.into()),
        None => Err(ClientError::InvalidAddress(config.addr.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn capped_config(addr: String, max_total: Option<usize>) -> PoolConfig {
        PoolConfig {
            addr,
            max_idle: 3,
            max_total,
            // Nothing answers PING here, so a reused idle connection times out.
            read_timeout: Some(Duration::from_millis(200)),
            write_timeout: None,
            connect_timeout: Some(Duration::from_secs(1)),
        }
    }

    #[test]
    fn max_total_caps_live_connections() {
        // The kernel backlog completes the handshake; nothing needs to accept.
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        let pool = ConnectionPool::new(capped_config(addr, Some(1)));

        let held = pool.acquire().expect("first acquire");
        assert!(matches!(pool.acquire(), Err(ClientError::PoolExhausted)));

        drop(held);
        // The returned connection fails its probe and is replaced.
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn invalid_connection_frees_its_slot() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        let pool = ConnectionPool::new(capped_config(addr, Some(1)));

        let mut held = pool.acquire().expect("acquire");
        held.valid = false;
        drop(held);
        assert!(pool.acquire().is_ok());
    }
}
