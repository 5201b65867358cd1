use crate::coordination::CoordinationStore;
use anyhow::Result;
use redis::aio::MultiplexedConnection;
use parking_lot::Mutex;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;

const UNLOCK_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Idle connections handed out one caller at a time.
struct ConnectionPool<C> {
    idle: Mutex<Vec<C>>,
}

impl<C> ConnectionPool<C> {
    fn new() -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
        }
    }

    fn checkout(&self) -> Option<C> {
        self.idle.lock().pop()
    }

    fn checkin(&self, conn: C) {
        self.idle.lock().push(conn);
    }

    #[cfg(test)]
    fn idle(&self) -> usize {
        self.idle.lock().len()
    }
}

#[derive(Clone)]
pub struct RedisCoordinationStore {
    pub client: redis::Client,
    conn: MultiplexedConnection,
    // BLPOP holds its connection for the whole wait, so it never shares `conn`.
    blocking: Arc<ConnectionPool<MultiplexedConnection>>,
}

impl RedisCoordinationStore {
    /// Opens the shared connection and pings it; the service cannot start without it.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(Self {
            client,
            conn,
            blocking: Arc::new(ConnectionPool::new()),
        })
    }

    fn score_bound(bound: Option<f64>, open: &str, exclusive: bool) -> String {
        match bound {
            None => open.to_string(),
            Some(v) if exclusive => format!("({}", v),
            Some(v) => v.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl CoordinationStore for RedisCoordinationStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: usize = conn.del(key).await?;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.hget(key, field).await?;
        Ok(value)
    }

    async fn hmget(&self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>> {
        // HMGET without fields is a syntax error.
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let values: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(key)
            .arg(fields)
            .query_async(&mut conn)
            .await?;
        Ok(values)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: usize = conn.hset(key, field, value).await?;
        Ok(())
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: usize = redis::cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: Option<f64>,
        max_exclusive: Option<f64>,
    ) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(key)
            .arg(Self::score_bound(min, "-inf", false))
            .arg(Self::score_bound(max_exclusive, "+inf", true))
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: usize = conn.rpush(key, value).await?;
        Ok(())
    }

    async fn blpop(&self, key: &str, wait: Duration) -> Result<Option<String>> {
        let mut conn = match self.blocking.checkout() {
            Some(conn) => conn,
            None => self.client.get_multiplexed_async_connection().await?,
        };
        let popped: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(key)
            // 0 would block forever
            .arg(wait.as_secs_f64().max(0.01))
            .query_async(&mut conn)
            .await?;
        // A failed connection is dropped above; only healthy ones go back.
        self.blocking.checkin(conn);
        Ok(popped.map(|(_, value)| value))
    }

    async fn llen(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.llen(key).await?;
        Ok(len)
    }

    async fn try_lock(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(owner)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn unlock(&self, key: &str, owner: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::Script::new(UNLOCK_SCRIPT)
            .key(key)
            .arg(owner)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }
}
