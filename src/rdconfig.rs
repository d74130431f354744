// src/rdconfig.rs
use std::future::Future;
use std::time::Duration;

use redis::{aio::MultiplexedConnection, Client, ErrorKind, RedisError, RedisResult};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};

/// A Redis client with one lazily opened, shared multiplexed connection.
///
/// The connection is opened on first use, so a process can start while the
/// server is down; every command then fails with the underlying error until
/// it comes back. I/O failures and timeouts drop the cached connection so the
/// next call reconnects.
///
/// Connecting and every command are bounded by `timeout`: a server that
/// accepts connections but never answers surfaces as an I/O error.
pub struct RedisConnector {
    client: Client,
    timeout: Duration,
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl RedisConnector {
    pub fn open(url: &str, timeout: Duration) -> RedisResult<Self> {
        // Client::open will auto-handle rediss:// if TLS feature is enabled
        let client = Client::open(url)?;
        Ok(Self {
            client,
            timeout,
            conn: Mutex::new(None),
        })
    }

    fn timed_out(&self, what: &str) -> RedisError {
        RedisError::from((
            ErrorKind::IoError,
            "redis timed out",
            format!("{what} took longer than {:?}", self.timeout),
        ))
    }

    pub async fn get_redis_conn(&self) -> RedisResult<MultiplexedConnection> {
        if let Some(conn) = self.conn.lock().await.as_ref() {
            return Ok(conn.clone());
        }

        // Connect without the lock held; a concurrent caller may win the race.
        let connect = self
            .client
            .get_multiplexed_async_connection_with_timeouts(self.timeout, self.timeout);
        let conn = timeout(self.timeout, connect)
            .await
            .map_err(|_| self.timed_out("connect"))??;
        debug!("opened redis connection");

        let mut slot = self.conn.lock().await;
        Ok(slot.get_or_insert(conn).clone())
    }

    /// Runs `op` on a connection, forgetting the connection if it broke.
    pub async fn run<T, F, Fut>(&self, op: F) -> RedisResult<T>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let conn = self.get_redis_conn().await?;
        let result = match timeout(self.timeout, op(conn)).await {
            Ok(result) => result,
            Err(_) => Err(self.timed_out("command")),
        };
        if let Err(err) = &result {
            self.reset_on(err).await;
        }
        result
    }

    async fn reset_on(&self, err: &RedisError) {
        if err.is_io_error()
            || err.is_timeout()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
        {
            warn!(error = %err, "dropping broken redis connection");
            *self.conn.lock().await = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    /// Accepts connections and holds them open without ever replying.
    async fn silent_server() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        port
    }

    #[tokio::test]
    async fn silent_server_times_out_instead_of_hanging() {
        let port = silent_server().await;
        let redis = RedisConnector::open(
            &format!("redis://127.0.0.1:{port}/1"),
            Duration::from_millis(200),
        )
        .unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            redis.run(|mut conn| async move {
                redis::cmd("PING").query_async::<_, String>(&mut conn).await
            }),
        )
        .await
        .expect("call should fail within the redis timeout");
        assert!(result.is_err());
    }
}
