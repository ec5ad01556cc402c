use std::{
    future::Future,
    sync::{
        Arc, LazyLock,
        atomic::{AtomicUsize, Ordering},
    },
};

use redis::{Client, aio::ConnectionManager};

use crate::{
    AdmissionResult, Evaluation, RateTiersError, WindowStore,
    redis::procedure::{Procedure, ProcedureCache},
};

/// Window accounting and tier combination, run atomically by Redis.
///
/// Each tier key is a hash of `slice -> count` plus `l`, the last admitted
/// timestamp. Slices at or below `current - bucket_count` are stale and are
/// deleted on touch. Every tier judges the full increment; the mode only
/// decides what each tier records. Returns `{remaining, recorded, wait}`.
pub(crate) const ADMIT_LUA: &str = r#"
    local n = #KEYS
    local mode = tonumber(ARGV[1])
    local increment = tonumber(ARGV[2])
    local now = tonumber(ARGV[3])

    local function charge_for(position)
        if position == 1 or mode == 0 then
            return increment
        elseif mode == 1 then
            return 1
        end
        return math.ceil(increment / position)
    end

    local function delete_fields(key, fields)
        for i = 1, #fields, 1000 do
            redis.call("HDEL", key, unpack(fields, i, math.min(i + 999, #fields)))
        end
    end

    local allowed = true
    local wait = 0
    local capacities = {}
    local slices = {}

    for i = 1, n do
        local key = KEYS[i]
        local min_difference = tonumber(ARGV[3 + i])
        local max_in_interval = tonumber(ARGV[3 + n + i])
        local bucket_width = tonumber(ARGV[3 + 2 * n + i])
        local bucket_count = tonumber(ARGV[3 + 3 * n + i])

        local current = math.floor(now / bucket_width)
        local horizon = current - bucket_count

        -- lazy reset of slices that left the window
        local fields = redis.call("HGETALL", key)
        local buckets = {}
        local stale = {}
        local used = 0
        local last = nil

        for j = 1, #fields, 2 do
            local field = fields[j]
            local value = tonumber(fields[j + 1])

            if field == "l" then
                last = value
            else
                local slice = tonumber(field)
                if slice <= horizon then
                    stale[#stale + 1] = field
                else
                    used = used + value
                    buckets[#buckets + 1] = {slice, value}
                end
            end
        end

        if #stale > 0 then
            delete_fields(key, stale)
        end

        local tier_allowed = used + increment <= max_in_interval
        local tier_wait = 0

        if not tier_allowed then
            table.sort(buckets, function(a, b) return a[1] < b[1] end)

            if increment > max_in_interval then
                if #buckets > 0 then
                    tier_wait = (buckets[#buckets][1] + bucket_count) * bucket_width - now
                else
                    tier_wait = bucket_count * bucket_width
                end
            else
                local to_free = used + increment - max_in_interval
                local freed = 0

                for j = 1, #buckets do
                    freed = freed + buckets[j][2]
                    if freed >= to_free then
                        tier_wait = (buckets[j][1] + bucket_count) * bucket_width - now
                        break
                    end
                end
            end
        end

        if min_difference > 0 and last then
            local spacing_wait = last + min_difference - now
            if spacing_wait > 0 then
                tier_allowed = false
                if spacing_wait > tier_wait then
                    tier_wait = spacing_wait
                end
            end
        end

        if not tier_allowed then
            allowed = false
            if tier_wait > wait then
                wait = tier_wait
            end
        end

        capacities[i] = math.max(max_in_interval - used, 0)
        slices[i] = current
    end

    local remaining = nil
    for i = 1, n do
        local tier_remaining = capacities[i]
        if allowed then
            tier_remaining = math.max(tier_remaining - charge_for(i), 0)
        end
        if remaining == nil or tier_remaining < remaining then
            remaining = tier_remaining
        end
    end

    if not allowed then
        return {remaining, 0, wait}
    end

    for i = 1, n do
        local key = KEYS[i]
        local min_difference = tonumber(ARGV[3 + i])
        local bucket_width = tonumber(ARGV[3 + 2 * n + i])
        local bucket_count = tonumber(ARGV[3 + 3 * n + i])

        redis.call("HINCRBY", key, string.format("%d", slices[i]), charge_for(i))

        local last = tonumber(redis.call("HGET", key, "l"))
        if not last or last < now then
            redis.call("HSET", key, "l", string.format("%d", now))
        end

        local retention = math.max(bucket_width * bucket_count, min_difference)
        redis.call("PEXPIRE", key, math.ceil(retention / 1000))
    end

    return {remaining, increment, 0}
"#;

static ADMIT_PROCEDURE: LazyLock<Procedure> = LazyLock::new(|| Procedure::new(ADMIT_LUA));

/// Redis-backed [`WindowStore`].
///
/// Every evaluation runs as a single Lua procedure, so all tiers of one
/// request are read, decided and committed without any other command
/// interleaving. State is visible to every process pointing at the same Redis.
///
/// # Requirements
///
/// - **Redis version:** >= 6.2.0
/// - **Runtime:** Tokio or Smol (via `redis-tokio` or `redis-smol` features)
///
/// # Data model
///
/// - One hash per tier key (`namespace[:tier][:subject]`)
/// - Field `<slice>` holds the count recorded in that time slice
/// - Field `l` holds the last admitted timestamp in microseconds
/// - Keys expire after `max(bucket_width * buckets, min_difference)` without admissions
///
/// # Examples
///
/// ```ignore
/// use ratetiers::RedisWindowStore;
///
/// let client = redis::Client::open("redis://127.0.0.1:6379/")?;
///
/// // One multiplexed connection
/// let store = RedisWindowStore::new(client.get_connection_manager().await?);
///
/// // Or several, used round-robin
/// let store = RedisWindowStore::from_client(client, 4).await?;
/// ```
#[derive(Clone)]
pub struct RedisWindowStore {
    connection_managers: Arc<Vec<ConnectionManager>>,
    track_index: Arc<AtomicUsize>,
    procedures: Arc<ProcedureCache>,
}

impl RedisWindowStore {
    /// Create a store over a single [`ConnectionManager`].
    pub fn new(connection_manager: ConnectionManager) -> Self {
        Self {
            connection_managers: Arc::new(vec![connection_manager]),
            track_index: Arc::new(AtomicUsize::new(0)),
            procedures: Arc::new(ProcedureCache::new()),
        }
    } // end constructor

    /// Create a store over `connection_count` connection managers of `client`.
    ///
    /// Requests are spread over the connections round-robin.
    pub async fn from_client(
        client: Client,
        connection_count: usize,
    ) -> Result<Self, RateTiersError> {
        if connection_count == 0 {
            return Err(RateTiersError::StoreUnavailable(
                "connection count must be > 0".into(),
            ));
        }

        let mut connection_managers = Vec::with_capacity(connection_count);
        for _ in 0..connection_count {
            connection_managers.push(client.get_connection_manager().await?);
        }

        Ok(Self {
            connection_managers: Arc::new(connection_managers),
            track_index: Arc::new(AtomicUsize::new(0)),
            procedures: Arc::new(ProcedureCache::new()),
        })
    }

    fn connection(&self) -> ConnectionManager {
        let index = self.track_index.fetch_add(1, Ordering::Relaxed);
        self.connection_managers[index % self.connection_managers.len()].clone()
    }

    #[cfg(test)]
    pub(crate) fn procedures(&self) -> &ProcedureCache {
        &self.procedures
    }
}

pub(crate) fn parse_reply(reply: &[i64]) -> Result<AdmissionResult, RateTiersError> {
    let [remaining, recorded, wait] = reply else {
        return Err(RateTiersError::UnexpectedReply(format!(
            "expected 3 values, got {}",
            reply.len()
        )));
    };

    let non_negative = |value: i64| {
        u64::try_from(value)
            .map_err(|_| RateTiersError::UnexpectedReply(format!("negative value {value}")))
    };

    Ok(AdmissionResult {
        actions_remaining: non_negative(*remaining)?,
        actions_recorded: non_negative(*recorded)?,
        wait_micros: non_negative(*wait)?,
    })
}

impl WindowStore for RedisWindowStore {
    fn evaluate(
        &self,
        evaluation: &Evaluation,
    ) -> impl Future<Output = Result<AdmissionResult, RateTiersError>> + Send {
        let mut connection_manager = self.connection();

        async move {
            let reply: Vec<i64> = self
                .procedures
                .invoke(
                    &mut connection_manager,
                    &ADMIT_PROCEDURE,
                    evaluation.keys(),
                    &evaluation.scalar_args(),
                )
                .await?;

            parse_reply(&reply)
        }
    }
}
