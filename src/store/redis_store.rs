//! Redis-backed shared ordered store.
//!
//! Each label maps to one Redis sorted set. The atomic admission unit is a
//! server-side Lua script, so concurrent callers on different processes or
//! hosts never both observe a free slot for the same insert.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{ErrorKind, RedisError, Script};
use tracing::{debug, warn};

use super::{AdmitRequest, ScoreBound, SharedOrderedStore};
use crate::error::{RateWindowError, Result};

/// Prune, count and conditionally insert in one server-side step.
///
/// KEYS[1] = record key
/// ARGV = prune_max, now, member, limit, window_ms
///
/// Scores travel as the caller's decimal strings so no precision is lost to
/// Lua number formatting.
const ADMIT_SCRIPT: &str = r#"
local key = KEYS[1]
redis.call('ZREMRANGEBYSCORE', key, '-inf', ARGV[1])
local count = redis.call('ZCARD', key)
if count < tonumber(ARGV[4]) then
    redis.call('ZADD', key, ARGV[2], ARGV[3])
    redis.call('PEXPIRE', key, ARGV[5])
    return 1
end
return 0
"#;

/// Sorted-set store on a Redis (or protocol-compatible) server.
#[derive(Clone)]
pub struct RedisStore {
    connection_manager: ConnectionManager,
    admit_script: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to `url` and verify the server answers `PING`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            warn!(url = %url, error = %e, "Invalid Redis connection URL");
            RateWindowError::Config(format!("invalid store url {url}: {e}"))
        })?;

        let mut connection_manager = ConnectionManager::new(client).await.map_err(|e| {
            warn!(url = %url, error = %e, "Failed to connect to Redis");
            classify(e)
        })?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut connection_manager)
            .await
            .map_err(classify)?;
        debug!(url = %url, reply = %pong, "Connected to Redis");

        Ok(Self {
            connection_manager,
            admit_script: Script::new(ADMIT_SCRIPT),
        })
    }
}

fn bound_arg(bound: ScoreBound, open: &str) -> String {
    match bound {
        ScoreBound::Unbounded => open.to_string(),
        ScoreBound::Inclusive(score) => score.to_string(),
    }
}

/// Map a client error onto the two store error kinds.
fn classify(err: RedisError) -> RateWindowError {
    let transport = err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
        || matches!(
            err.kind(),
            ErrorKind::IoError
                | ErrorKind::BusyLoadingError
                | ErrorKind::TryAgain
                | ErrorKind::ClusterDown
                | ErrorKind::MasterDown
        );

    if transport {
        RateWindowError::StoreUnavailable(err.to_string())
    } else {
        RateWindowError::StoreProtocol(err.to_string())
    }
}

#[async_trait]
impl SharedOrderedStore for RedisStore {
    async fn remove_range_by_score(
        &self,
        key: &str,
        min: ScoreBound,
        max: ScoreBound,
    ) -> Result<u64> {
        let mut conn = self.connection_manager.clone();
        let removed: u64 = redis::cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg(bound_arg(min, "-inf"))
            .arg(bound_arg(max, "+inf"))
            .query_async(&mut conn)
            .await
            .map_err(classify)?;
        Ok(removed)
    }

    async fn cardinality(&self, key: &str) -> Result<u64> {
        let mut conn = self.connection_manager.clone();
        let count: u64 = redis::cmd("ZCARD")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(classify)?;
        Ok(count)
    }

    async fn add(&self, key: &str, score: i64, member: &str) -> Result<bool> {
        let mut conn = self.connection_manager.clone();
        let added: u64 = redis::cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(classify)?;
        Ok(added == 1)
    }

    async fn try_admit(&self, key: &str, request: &AdmitRequest) -> Result<bool> {
        let mut conn = self.connection_manager.clone();
        let reply: i64 = self
            .admit_script
            .key(key)
            .arg(request.window_begin.saturating_sub(1))
            .arg(request.now)
            .arg(&request.member)
            .arg(request.limit)
            .arg(request.window_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(classify)?;

        match reply {
            1 => Ok(true),
            0 => Ok(false),
            other => Err(RateWindowError::StoreProtocol(format!(
                "admission script returned {other}, expected 0 or 1"
            ))),
        }
    }
}
