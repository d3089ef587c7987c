//! # Endpoint Failover
//!
//! One `ConnectionPool` per configured endpoint, scanned in order. The first
//! endpoint that yields a connection wins; there is no load balancing.

use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};
use crate::pool::{ConnectionPool, PoolConfig, PooledConnection};

/// Ordered set of per-endpoint pools.
#[derive(Clone)]
pub struct EndpointPool {
    pools: Vec<ConnectionPool>,
}

impl EndpointPool {
    /// Builds one pool per endpoint. Nothing is dialed yet.
    pub fn new(configs: impl IntoIterator<Item = PoolConfig>) -> Self {
        EndpointPool {
            pools: configs.into_iter().map(ConnectionPool::new).collect(),
        }
    }

    /// Returns a connection from the first endpoint that yields one.
    ///
    /// Fails with `ClientError::Connection` when the list is empty or every
    /// endpoint fails; the last endpoint failure is kept as the source.
    pub fn acquire(&self) -> ClientResult<PooledConnection> {
        let mut last_error = None;
        for pool in &self.pools {
            match pool.acquire() {
                Ok(conn) => {
                    debug!(addr = %pool.addr(), "selected endpoint");
                    return Ok(conn);
                }
                Err(err) => {
                    warn!(addr = %pool.addr(), error = %err, "endpoint unavailable");
                    last_error = Some(err);
                }
            }
        }
        Err(ClientError::Connection {
            attempts: self.pools.len(),
            source: last_error.map(Box::new),
        })
    }

    /// Closes every endpoint pool, returning the first failure.
    pub fn close(&self) -> ClientResult<()> {
        let mut first_error = None;
        for pool in &self.pools {
            if let Err(err) = pool.close() {
                warn!(addr = %pool.addr(), error = %err, "failed to close endpoint pool");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_endpoint_list_is_connection_error() {
        let endpoints = EndpointPool::new(Vec::new());
        match endpoints.acquire() {
            Err(ClientError::Connection { attempts, source }) => {
                assert_eq!(attempts, 0);
                assert!(source.is_none());
            }
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("acquired a connection from no endpoints"),
        }
    }

    #[test]
    fn closed_pools_refuse_acquisition() {
        let endpoints = EndpointPool::new(vec![PoolConfig {
            addr: "127.0.0.1:1".to_string(),
            max_idle: 3,
            max_total: None,
            read_timeout: None,
            write_timeout: None,
            connect_timeout: None,
        }]);
        endpoints.close().unwrap();
        match endpoints.acquire() {
            Err(ClientError::Connection { attempts, source }) => {
                assert_eq!(attempts, 1);
                assert!(matches!(source.as_deref(), Some(ClientError::PoolClosed)));
            }
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("acquired from a closed pool"),
        }
    }

    #[test]
    fn exhausted_endpoint_fails_over_to_next() {
        let first = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let second = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let first_addr = first.local_addr().expect("addr").to_string();
        let second_addr = second.local_addr().expect("addr").to_string();
        let config = |addr: &str| PoolConfig {
            addr: addr.to_string(),
            max_idle: 3,
            max_total: Some(1),
            read_timeout: None,
            write_timeout: None,
            connect_timeout: Some(std::time::Duration::from_secs(1)),
        };
        let endpoints = EndpointPool::new(vec![config(&first_addr), config(&second_addr)]);

        let held = match endpoints.acquire() {
            Ok(conn) => conn,
            Err(err) => panic!("first acquire failed: {:?}", err),
        };
        assert_eq!(held.addr(), first_addr);

        let next = match endpoints.acquire() {
            Ok(conn) => conn,
            Err(err) => panic!("second acquire failed: {:?}", err),
        };
        assert_eq!(next.addr(), second_addr);
    }
}
