use {
    super::TimerIndex,
    crate::kernel::{
        entities::AuctionId,
        errors::AuctionError,
    },
    async_trait::async_trait,
    redis::{
        aio::ConnectionManager,
        AsyncCommands,
    },
    time::OffsetDateTime,
};

const EXPIRATIONS_KEY: &str = "auction:expirations";

/// Fleet-shared timer index on a Redis sorted set: members are auction ids,
/// scores are end times in seconds since epoch.
pub struct RedisTimerIndex {
    conn: ConnectionManager,
}

impl RedisTimerIndex {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl TimerIndex for RedisTimerIndex {
    async fn schedule(
        &self,
        auction_id: AuctionId,
        end_time: OffsetDateTime,
    ) -> Result<(), AuctionError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .zadd(
                EXPIRATIONS_KEY,
                auction_id.to_string(),
                end_time.unix_timestamp(),
            )
            .await
            .map_err(AuctionError::transient)?;
        Ok(())
    }

    async fn due(
        &self,
        now: OffsetDateTime,
        limit: usize,
    ) -> Result<Vec<AuctionId>, AuctionError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn
            .zrangebyscore_limit(EXPIRATIONS_KEY, 0, now.unix_timestamp(), 0, limit as isize)
            .await
            .map_err(AuctionError::transient)?;
        Ok(members
            .iter()
            .filter_map(|member| match member.parse() {
                Ok(auction_id) => Some(auction_id),
                Err(err) => {
                    tracing::error!(member = %member, error = %err, "Invalid timer index member");
                    None
                }
            })
            .collect())
    }

    async fn remove(&self, auction_id: AuctionId) -> Result<(), AuctionError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .zrem(EXPIRATIONS_KEY, auction_id.to_string())
            .await
            .map_err(AuctionError::transient)?;
        Ok(())
    }
}
