use super::InterestStore;
use crate::error::EngineResult;
use crate::models::UserInterest;
use ::redis::AsyncCommands;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

/// Interest profiles kept in Redis, one hash per user.
///
/// Field is the topic key, value is the JSON-encoded `UserInterest`. The
/// hash expiry is refreshed on every write so profiles of users who stopped
/// interacting eventually disappear.
pub struct RedisInterestStore {
    client: ::redis::Client,
    ttl_seconds: u64,
}

impl RedisInterestStore {
    pub fn new(client: ::redis::Client, ttl_seconds: u64) -> Self {
        Self { client, ttl_seconds }
    }

    fn key(user_id: Uuid) -> String {
        format!("interests:{}", user_id)
    }
}

#[async_trait]
impl InterestStore for RedisInterestStore {
    async fn upsert(&self, mut interest: UserInterest) -> EngineResult<()> {
        let mut conn = self.client.get_async_connection().await?;
        let key = Self::key(interest.user_id);

        let existing: Option<String> = conn.hget(&key, &interest.topic).await?;
        if let Some(raw) = existing {
            if let Ok(previous) = serde_json::from_str::<UserInterest>(&raw) {
                interest.created_at = previous.created_at;
            }
        }

        let payload = serde_json::to_string(&interest)?;
        let _: () = conn.hset(&key, &interest.topic, payload).await?;
        let _: () = ::redis::cmd("EXPIRE")
            .arg(&key)
            .arg(self.ttl_seconds)
            .query_async(&mut conn)
            .await?;

        debug!("Stored interest {} for user {}", interest.topic, interest.user_id);
        Ok(())
    }

    async fn list(&self, user_id: Uuid) -> EngineResult<Vec<UserInterest>> {
        let mut conn = self.client.get_async_connection().await?;
        let raw: HashMap<String, String> = conn.hgetall(Self::key(user_id)).await?;

        let mut interests = Vec::with_capacity(raw.len());
        for (topic, payload) in raw {
            match serde_json::from_str::<UserInterest>(&payload) {
                Ok(interest) => interests.push(interest),
                Err(e) => warn!("Skipping undecodable interest {} for user {}: {}", topic, user_id, e),
            }
        }
        interests.sort_by(|a, b| {
            crate::algorithms::by_score_desc(a.weight, b.weight).then_with(|| a.topic.cmp(&b.topic))
        });
        Ok(interests)
    }

    async fn delete_topics(&self, user_id: Uuid, topics: &[String]) -> EngineResult<usize> {
        if topics.is_empty() {
            return Ok(0);
        }
        let mut conn = self.client.get_async_connection().await?;
        let removed: usize = conn.hdel(Self::key(user_id), topics).await?;
        Ok(removed)
    }
}
