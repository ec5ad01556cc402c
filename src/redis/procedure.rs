use std::sync::Arc;

use dashmap::DashSet;
use redis::{FromRedisValue, RedisError, aio::ConnectionLike};

/// A server-side procedure addressed by the SHA-1 of its body.
#[derive(Clone, Debug)]
pub(crate) struct Procedure {
    body: Arc<str>,
    hash: Arc<str>,
}

impl Procedure {
    pub(crate) fn new(body: &str) -> Self {
        let hash = redis::Script::new(body).get_hash().to_string();

        Self {
            body: Arc::from(body),
            hash: Arc::from(hash),
        }
    }

    pub(crate) fn body(&self) -> &str {
        &self.body
    }

    pub(crate) fn hash(&self) -> &str {
        &self.hash
    }
}

/// Tracks which procedure bodies have been registered on a connection.
///
/// A body is sent with `SCRIPT LOAD` at most once; afterwards it is invoked by
/// hash. If the server has forgotten it (`NOSCRIPT`, e.g. after a restart or
/// `SCRIPT FLUSH`) the call is retried once with the full body, which also
/// registers it again.
#[derive(Debug, Default)]
pub(crate) struct ProcedureCache {
    registered: DashSet<Arc<str>>,
}

impl ProcedureCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_registered(&self, procedure: &Procedure) -> bool {
        self.registered.contains(procedure.hash())
    }

    pub(crate) async fn invoke<T, C>(
        &self,
        connection: &mut C,
        procedure: &Procedure,
        keys: &[String],
        args: &[u64],
    ) -> Result<T, RedisError>
    where
        T: FromRedisValue,
        C: ConnectionLike + Send,
    {
        if !self.is_registered(procedure) {
            let _: String = redis::cmd("SCRIPT")
                .arg("LOAD")
                .arg(procedure.body())
                .query_async(connection)
                .await?;
            self.registered.insert(procedure.hash.clone());
        }

        let result = redis::cmd("EVALSHA")
            .arg(procedure.hash())
            .arg(keys.len())
            .arg(keys)
            .arg(args)
            .query_async(connection)
            .await;

        match result {
            Err(err) if err.kind() == redis::ErrorKind::Server(redis::ServerErrorKind::NoScript) => {
                tracing::debug!(hash = %procedure.hash(), "redis.procedure.noscript, re-sending body");
                self.registered.remove(procedure.hash());

                let value = redis::cmd("EVAL")
                    .arg(procedure.body())
                    .arg(keys.len())
                    .arg(keys)
                    .arg(args)
                    .query_async(connection)
                    .await?;
                self.registered.insert(procedure.hash.clone());

                Ok(value)
            }
            other => other,
        }
    } // end method invoke
}
