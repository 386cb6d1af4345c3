use crate::algorithms::time_decay;
use crate::config::Config;
use crate::error::EngineResult;
use crate::models::*;
use crate::services::store::{BehaviorStore, ContentReader, InterestStore};
use crate::utils::validation::validate_id;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// What a refresh changed in the stored profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterestRefresh {
    pub written: usize,
    pub removed: usize,
}

/// Turns a user's recent behavior into normalized, decayed topic weights.
pub struct InterestProfiler {
    behaviors: Arc<dyn BehaviorStore>,
    content: Arc<dyn ContentReader>,
    interests: Arc<dyn InterestStore>,
    config: Arc<Config>,
}

impl InterestProfiler {
    pub fn new(
        behaviors: Arc<dyn BehaviorStore>,
        content: Arc<dyn ContentReader>,
        interests: Arc<dyn InterestStore>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            behaviors,
            content,
            interests,
            config,
        }
    }

    pub async fn refresh(&self, user_id: Uuid) -> EngineResult<InterestRefresh> {
        self.refresh_at(user_id, Utc::now()).await
    }

    /// Recomputes the profile as of `now`.
    ///
    /// Topics that fall under the threshold, or that no longer appear in the
    /// behavior window, are deleted from the store.
    pub async fn refresh_at(&self, user_id: Uuid, now: DateTime<Utc>) -> EngineResult<InterestRefresh> {
        validate_id(user_id, "User ID")?;
        let settings = &self.config.recommendation;

        let actions = self
            .behaviors
            .list_recent(user_id, settings.behavior_window)
            .await?;

        let mut mass: HashMap<String, f64> = HashMap::new();
        let mut total = 0.0;

        for action in &actions {
            let item = match self.content.get_by_id(action.content_id).await? {
                Some(item) => item,
                None => {
                    debug!("Skipping action on missing content {}", action.content_id);
                    continue;
                }
            };

            let adjusted = action.weight
                * time_decay(action.occurred_at, now, settings.decay_half_life_days);

            let tags: HashSet<&String> = item.tags.iter().collect();
            for tag in tags {
                *mass.entry(tag.clone()).or_insert(0.0) += adjusted;
                total += adjusted;
            }
            *mass.entry(item.author_topic()).or_insert(0.0) += adjusted;
            total += adjusted;
        }

        if total <= 0.0 {
            debug!("No decayed behavior mass for user {}, profile left as is", user_id);
            return Ok(InterestRefresh::default());
        }

        let mut kept = HashSet::new();
        let mut refresh = InterestRefresh::default();
        for (topic, weight) in mass {
            let normalized = weight / total;
            if normalized < settings.interest_threshold {
                continue;
            }
            kept.insert(topic.clone());
            self.interests
                .upsert(UserInterest::new(user_id, topic, normalized, now))
                .await?;
            refresh.written += 1;
        }

        let stale: Vec<String> = self
            .interests
            .list(user_id)
            .await?
            .into_iter()
            .map(|interest| interest.topic)
            .filter(|topic| !kept.contains(topic))
            .collect();
        refresh.removed = self.interests.delete_topics(user_id, &stale).await?;

        info!(
            "Refreshed interests for user {}: {} written, {} removed",
            user_id, refresh.written, refresh.removed
        );
        Ok(refresh)
    }

    /// Stored interests, strongest first.
    pub async fn interest_profile(&self, user_id: Uuid) -> EngineResult<Vec<UserInterest>> {
        validate_id(user_id, "User ID")?;
        self.interests.list(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::MemoryStore;
    use chrono::Duration;

    fn profiler(store: &Arc<MemoryStore>) -> InterestProfiler {
        InterestProfiler::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(Config::default()),
        )
    }

    fn post(author: Uuid, tags: &[&str]) -> ContentItem {
        ContentItem::new("t", "b", author, tags.iter().map(|t| t.to_string()).collect())
    }

    #[tokio::test]
    async fn weights_sum_to_one_without_pruning() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let a = post(Uuid::new_v4(), &["go", "web"]);
        let b = post(Uuid::new_v4(), &["rust"]);
        store.insert_item(a.clone());
        store.insert_item(b.clone());
        store.append(&UserAction::new(user, a.id, "like")).await.unwrap();
        store.append(&UserAction::new(user, b.id, "view")).await.unwrap();

        let refresh = profiler(&store).refresh(user).await.unwrap();
        assert_eq!(refresh.written, 5);

        let interests = store.list(user).await.unwrap();
        let sum: f64 = interests.iter().map(|i| i.weight).sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(interests[0].weight >= interests[interests.len() - 1].weight);
    }

    #[tokio::test]
    async fn topics_under_one_percent_are_not_written() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let now = Utc::now();
        let loved = post(Uuid::new_v4(), &["go"]);
        let faded = post(Uuid::new_v4(), &["niche"]);
        store.insert_item(loved.clone());
        store.insert_item(faded.clone());
        for _ in 0..5 {
            store.append(&UserAction::new(user, loved.id, "like").at(now)).await.unwrap();
        }
        store
            .append(&UserAction::new(user, faded.id, "view").at(now - Duration::days(200)))
            .await
            .unwrap();

        let refresh = profiler(&store).refresh_at(user, now).await.unwrap();
        assert_eq!(refresh.written, 2);

        let interests = store.list(user).await.unwrap();
        assert!(interests.iter().all(|i| i.topic != "niche"));
        assert!(interests.iter().all(|i| i.topic != faded.author_topic()));

        let sum: f64 = interests.iter().map(|i| i.weight).sum();
        assert!(sum < 1.0);
        assert!(sum > 0.99);
    }

    #[tokio::test]
    async fn older_actions_weigh_less() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let author = Uuid::new_v4();
        let fresh = post(author, &["fresh"]);
        let stale = post(author, &["stale"]);
        store.insert_item(fresh.clone());
        store.insert_item(stale.clone());
        store.append(&UserAction::new(user, fresh.id, "like")).await.unwrap();
        store
            .append(&UserAction::new(user, stale.id, "like").at(Utc::now() - Duration::days(30)))
            .await
            .unwrap();

        profiler(&store).refresh(user).await.unwrap();
        let interests = store.list(user).await.unwrap();
        let weight_of = |topic: &str| {
            interests
                .iter()
                .find(|i| i.topic == topic)
                .map(|i| i.weight)
                .unwrap_or(0.0)
        };
        assert!((weight_of("fresh") / weight_of("stale") - 2.0).abs() < 1e-3);
    }

    #[tokio::test]
    async fn topics_that_drop_out_are_deleted() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let item = post(Uuid::new_v4(), &["go"]);
        store.insert_item(item.clone());
        store
            .upsert(UserInterest::new(user, "cobol".to_string(), 0.9, Utc::now()))
            .await
            .unwrap();
        store.append(&UserAction::new(user, item.id, "view")).await.unwrap();

        let refresh = profiler(&store).refresh(user).await.unwrap();
        assert_eq!(refresh.removed, 1);
        assert!(store.list(user).await.unwrap().iter().all(|i| i.topic != "cobol"));
    }

    #[tokio::test]
    async fn missing_content_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        store.append(&UserAction::new(user, Uuid::new_v4(), "like")).await.unwrap();

        let refresh = profiler(&store).refresh(user).await.unwrap();
        assert_eq!(refresh, InterestRefresh::default());
        assert!(store.list(user).await.unwrap().is_empty());
    }
}
