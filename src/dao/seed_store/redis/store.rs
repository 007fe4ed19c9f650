use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use futures::{SinkExt, StreamExt, future::BoxFuture};
use redis_protocol::{codec::Resp2, resp2::types::BytesFrame};
use tokio::{net::TcpStream, sync::Mutex, time::timeout};
use tokio_util::codec::Framed;
use tracing::debug;

use crate::dao::{seed_store::SeedStore, storage::StorageResult};

use super::{
    config::RedisConfig,
    error::{RedisDaoError, RedisResult},
};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(3);

type Connection = Framed<TcpStream, Resp2>;

/// Seed store speaking RESP2 to a single Redis server over one connection.
///
/// Commands are serialized through a mutex. Any transport failure drops the
/// connection; the next command or [`SeedStore::try_reconnect`] dials again.
#[derive(Clone)]
pub struct RedisSeedStore {
    config: Arc<RedisConfig>,
    connection: Arc<Mutex<Option<Connection>>>,
}

impl RedisSeedStore {
    /// Connect to Redis, authenticating and selecting the database when configured.
    pub async fn connect(config: RedisConfig) -> RedisResult<Self> {
        let connection = open(&config).await?;
        Ok(Self {
            config: Arc::new(config),
            connection: Arc::new(Mutex::new(Some(connection))),
        })
    }

    async fn command(&self, name: &'static str, args: Vec<Bytes>) -> RedisResult<BytesFrame> {
        let mut guard = self.connection.lock().await;
        if guard.is_none() {
            debug!(address = %self.config.address(), "re-dialing Redis");
            *guard = Some(open(&self.config).await?);
        }
        let Some(connection) = guard.as_mut() else {
            return Err(RedisDaoError::Disconnected { command: name });
        };

        match roundtrip(connection, name, args).await {
            Ok(frame) => Ok(frame),
            Err(err) => {
                guard.take();
                Err(err)
            }
        }
    }

    async fn key_exists(&self, key: String) -> RedisResult<bool> {
        let reply = self.command("EXISTS", vec![Bytes::from(key.clone())]).await?;
        match expect_ok_frame("EXISTS", &key, reply)? {
            BytesFrame::Integer(count) => Ok(count > 0),
            other => Err(unexpected("EXISTS", &other)),
        }
    }

    async fn lrange(&self, key: String, start: i64, end: i64) -> RedisResult<Vec<String>> {
        let reply = self
            .command(
                "LRANGE",
                vec![
                    Bytes::from(key.clone()),
                    Bytes::from(start.to_string()),
                    Bytes::from(end.to_string()),
                ],
            )
            .await?;
        match expect_ok_frame("LRANGE", &key, reply)? {
            BytesFrame::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    BytesFrame::BulkString(bytes) | BytesFrame::SimpleString(bytes) => {
                        Ok(String::from_utf8_lossy(&bytes).into_owned())
                    }
                    other => Err(unexpected("LRANGE", &other)),
                })
                .collect(),
            BytesFrame::Null => Ok(Vec::new()),
            other => Err(unexpected("LRANGE", &other)),
        }
    }

    async fn rpush(&self, key: String, values: Vec<i64>) -> RedisResult<()> {
        if values.is_empty() {
            return Ok(());
        }
        let mut args = Vec::with_capacity(values.len() + 1);
        args.push(Bytes::from(key.clone()));
        args.extend(values.iter().map(|value| Bytes::from(value.to_string())));

        let reply = self.command("RPUSH", args).await?;
        match expect_ok_frame("RPUSH", &key, reply)? {
            BytesFrame::Integer(_) => Ok(()),
            other => Err(unexpected("RPUSH", &other)),
        }
    }

    async fn lset(&self, key: String, index: usize, value: i64) -> RedisResult<()> {
        let reply = self
            .command(
                "LSET",
                vec![
                    Bytes::from(key.clone()),
                    Bytes::from(index.to_string()),
                    Bytes::from(value.to_string()),
                ],
            )
            .await?;
        expect_simple("LSET", &key, reply, b"OK")
    }

    async fn ping(&self) -> RedisResult<()> {
        let reply = self.command("PING", Vec::new()).await?;
        expect_simple("PING", "", reply, b"PONG")
    }

    async fn reconnect(&self) -> RedisResult<()> {
        let fresh = open(&self.config).await?;
        *self.connection.lock().await = Some(fresh);
        Ok(())
    }
}

/// Dial the server and run the connection preamble.
async fn open(config: &RedisConfig) -> RedisResult<Connection> {
    let address = config.address();
    let socket = TcpStream::connect(&address)
        .await
        .map_err(|source| RedisDaoError::Connect {
            address: address.clone(),
            source,
        })?;
    socket.set_nodelay(true).ok();
    let mut connection = Framed::new(socket, Resp2::default());

    if let Some(password) = config.password.as_deref() {
        let mut args = Vec::new();
        if let Some(username) = config.username.as_deref() {
            args.push(Bytes::from(username.to_string()));
        }
        args.push(Bytes::from(password.to_string()));
        let reply = roundtrip(&mut connection, "AUTH", args).await?;
        expect_simple("AUTH", "", reply, b"OK")?;
    }

    if let Some(database) = config.database {
        let reply = roundtrip(
            &mut connection,
            "SELECT",
            vec![Bytes::from(database.to_string())],
        )
        .await?;
        expect_simple("SELECT", "", reply, b"OK")?;
    }

    Ok(connection)
}

/// Send one command and wait for its reply.
async fn roundtrip(
    connection: &mut Connection,
    name: &'static str,
    args: Vec<Bytes>,
) -> RedisResult<BytesFrame> {
    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(BytesFrame::BulkString(Bytes::from_static(name.as_bytes())));
    parts.extend(args.into_iter().map(BytesFrame::BulkString));

    let exchange = async {
        connection
            .send(BytesFrame::Array(parts))
            .await
            .map_err(|err| RedisDaoError::Protocol {
                command: name,
                details: err.to_string(),
            })?;
        match connection.next().await {
            Some(Ok(frame)) => Ok(frame),
            Some(Err(err)) => Err(RedisDaoError::Protocol {
                command: name,
                details: err.to_string(),
            }),
            None => Err(RedisDaoError::Disconnected { command: name }),
        }
    };

    timeout(COMMAND_TIMEOUT, exchange)
        .await
        .map_err(|_| RedisDaoError::Timeout { command: name })?
}

/// Turn an error reply into [`RedisDaoError::Reply`], passing anything else through.
fn expect_ok_frame(command: &'static str, key: &str, frame: BytesFrame) -> RedisResult<BytesFrame> {
    match frame {
        BytesFrame::Error(message) => Err(RedisDaoError::Reply {
            command,
            key: key.to_string(),
            message: message.to_string(),
        }),
        other => Ok(other),
    }
}

fn expect_simple(
    command: &'static str,
    key: &str,
    frame: BytesFrame,
    expected: &[u8],
) -> RedisResult<()> {
    match expect_ok_frame(command, key, frame)? {
        BytesFrame::SimpleString(reply) if reply.as_ref() == expected => Ok(()),
        other => Err(unexpected(command, &other)),
    }
}

fn unexpected(command: &'static str, frame: &BytesFrame) -> RedisDaoError {
    RedisDaoError::UnexpectedReply {
        command,
        frame: format!("{frame:?}"),
    }
}

impl SeedStore for RedisSeedStore {
    fn exists(&self, key: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let key = key.to_string();
        Box::pin(async move { store.key_exists(key).await.map_err(Into::into) })
    }

    fn range_read(
        &self,
        key: &str,
        start: i64,
        end: i64,
    ) -> BoxFuture<'static, StorageResult<Vec<String>>> {
        let store = self.clone();
        let key = key.to_string();
        Box::pin(async move { store.lrange(key, start, end).await.map_err(Into::into) })
    }

    fn append(&self, key: &str, values: Vec<i64>) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let key = key.to_string();
        Box::pin(async move { store.rpush(key, values).await.map_err(Into::into) })
    }

    fn positional_set(
        &self,
        key: &str,
        index: usize,
        value: i64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let key = key.to_string();
        Box::pin(async move { store.lset(key, index, value).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.reconnect().await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_replies_become_reply_errors() {
        let err = expect_ok_frame("LSET", "seedsMatt", BytesFrame::Error("ERR no such key".into()))
            .unwrap_err();
        match err {
            RedisDaoError::Reply { command, key, message } => {
                assert_eq!(command, "LSET");
                assert_eq!(key, "seedsMatt");
                assert_eq!(message, "ERR no such key");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn simple_replies_must_match() {
        let ok = BytesFrame::SimpleString(Bytes::from_static(b"OK"));
        assert!(expect_simple("LSET", "k", ok, b"OK").is_ok());

        let pong = BytesFrame::SimpleString(Bytes::from_static(b"PONG"));
        assert!(matches!(
            expect_simple("LSET", "k", pong, b"OK"),
            Err(RedisDaoError::UnexpectedReply { .. })
        ));

        assert!(matches!(
            expect_simple("PING", "", BytesFrame::Integer(1), b"PONG"),
            Err(RedisDaoError::UnexpectedReply { .. })
        ));
    }
}
