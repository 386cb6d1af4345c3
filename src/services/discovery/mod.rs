use crate::config::Config;
use crate::error::EngineResult;
use crate::models::{BranchOutcome, ContentItem, DiscoveryResult};
use crate::services::store::{ContentQuery, ContentReader};
use crate::utils::validation::validate_limit;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Feed {
    Trending,
    Popular,
    New,
}

/// Trending, popular and new feeds computed side by side.
pub struct DiscoveryService {
    content: Arc<dyn ContentReader>,
    config: Arc<Config>,
}

impl DiscoveryService {
    pub fn new(content: Arc<dyn ContentReader>, config: Arc<Config>) -> Self {
        Self { content, config }
    }

    pub async fn trending(&self, limit: usize) -> EngineResult<Vec<ContentItem>> {
        validate_limit(limit)?;
        fetch(self.content.as_ref(), self.trending_query(), limit).await
    }

    pub async fn popular(&self, limit: usize) -> EngineResult<Vec<ContentItem>> {
        validate_limit(limit)?;
        fetch(self.content.as_ref(), ContentQuery::Popular, limit).await
    }

    pub async fn new_content(&self, limit: usize) -> EngineResult<Vec<ContentItem>> {
        validate_limit(limit)?;
        fetch(self.content.as_ref(), ContentQuery::Newest, limit).await
    }

    /// Runs the three feeds concurrently and waits for all three.
    ///
    /// A failing feed is reported in its own slot; it never fails the call.
    pub async fn discover(&self, limit: usize) -> EngineResult<DiscoveryResult> {
        validate_limit(limit)?;

        let (tx, mut rx) = mpsc::channel(3);
        let feeds = [
            (Feed::Trending, self.trending_query()),
            (Feed::Popular, ContentQuery::Popular),
            (Feed::New, ContentQuery::Newest),
        ];

        for (feed, query) in feeds {
            let content = self.content.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = match fetch(content.as_ref(), query, limit).await {
                    Ok(items) => BranchOutcome::Ok { items },
                    Err(e) => {
                        warn!("Discovery feed {:?} failed: {}", feed, e);
                        BranchOutcome::Failed {
                            reason: e.to_string(),
                        }
                    }
                };
                let _ = tx.send((feed, outcome)).await;
            });
        }
        drop(tx);

        let mut trending = None;
        let mut popular = None;
        let mut new = None;
        for _ in 0..feeds.len() {
            match rx.recv().await {
                Some((Feed::Trending, outcome)) => trending = Some(outcome),
                Some((Feed::Popular, outcome)) => popular = Some(outcome),
                Some((Feed::New, outcome)) => new = Some(outcome),
                None => break,
            }
        }

        let result = DiscoveryResult {
            trending: trending.unwrap_or_else(missing_report),
            popular: popular.unwrap_or_else(missing_report),
            new: new.unwrap_or_else(missing_report),
        };
        info!("Discovery assembled with limit {}", limit);
        Ok(result)
    }

    fn trending_query(&self) -> ContentQuery {
        ContentQuery::Trending {
            since: Utc::now() - Duration::days(self.config.recommendation.trending_window_days),
        }
    }
}

async fn fetch(content: &dyn ContentReader, query: ContentQuery, limit: usize) -> EngineResult<Vec<ContentItem>> {
    let mut items = content.query(query, limit).await?;
    query.rank(&mut items);
    items.truncate(limit);
    Ok(items)
}

fn missing_report() -> BranchOutcome {
    BranchOutcome::Failed {
        reason: "branch did not report".to_string(),
    }
}
