use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const AUTHOR_TOPIC_PREFIX: &str = "author:";

/// A published post as seen by the engine. Owned by the content store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub author_id: Uuid,
    pub tags: Vec<String>,
    pub published: bool,
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    View,
    Like,
    Comment,
    Share,
    Bookmark,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAction {
    pub user_id: Uuid,
    pub content_id: Uuid,
    pub action_kind: String,
    pub weight: f64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSimilarityEdge {
    pub item_a: Uuid,
    pub item_b: Uuid,
    pub score: f64,
    pub factors: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

/// What an interest points at: a tag or an author.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Tag(String),
    Author(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInterest {
    pub user_id: Uuid,
    pub topic: String,
    pub weight: f64,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationCategory {
    BasedOnLikes,
    SimilarContent,
    Trending,
    Popular,
    New,
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecommendation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content_id: Uuid,
    pub score: f64,
    pub reason: String,
    pub category: RecommendationCategory,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_viewed: bool,
    pub viewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationStats {
    pub user_id: Uuid,
    pub total: u64,
    pub viewed: u64,
    pub clicked: u64,
    pub average_score: f64,
    pub last_generated_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedItem {
    pub recommendation_id: Uuid,
    pub item: ContentItem,
    pub score: f64,
    pub reason: String,
    pub category: RecommendationCategory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub user_id: Uuid,
    pub recommendations: Vec<RecommendedItem>,
    pub generated_at: DateTime<Utc>,
    pub total_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarContent {
    pub item: ContentItem,
    pub score: f64,
    pub factors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BehaviorSummary {
    pub user_id: Uuid,
    pub total_actions: usize,
    pub actions: BTreeMap<String, usize>,
    pub recent_content: Vec<Uuid>,
    pub top_tags: Vec<String>,
}

/// Outcome of one discovery branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BranchOutcome {
    Ok { items: Vec<ContentItem> },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub trending: BranchOutcome,
    pub popular: BranchOutcome,
    pub new: BranchOutcome,
}

impl ContentItem {
    pub fn new(title: &str, body: &str, author_id: Uuid, tags: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.to_string(),
            body: body.to_string(),
            author_id,
            tags,
            published: true,
            views: 0,
            likes: 0,
            comments: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_engagement(mut self, views: u64, likes: u64, comments: u64) -> Self {
        self.views = views;
        self.likes = likes;
        self.comments = comments;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn unpublished(mut self) -> Self {
        self.published = false;
        self
    }

    pub fn author_topic(&self) -> String {
        Topic::Author(self.author_id).key()
    }
}

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        ActionKind::View,
        ActionKind::Like,
        ActionKind::Comment,
        ActionKind::Share,
        ActionKind::Bookmark,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::View => "view",
            ActionKind::Like => "like",
            ActionKind::Comment => "comment",
            ActionKind::Share => "share",
            ActionKind::Bookmark => "bookmark",
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            ActionKind::View => 1.0,
            ActionKind::Bookmark => 2.0,
            ActionKind::Comment => 3.0,
            ActionKind::Share => 4.0,
            ActionKind::Like => 5.0,
        }
    }

    /// Weight for a raw action name. Unknown names count as a view.
    pub fn weight_for(action: &str) -> f64 {
        action
            .parse::<ActionKind>()
            .map(|kind| kind.weight())
            .unwrap_or(1.0)
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown action kind: {}", s))
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl UserAction {
    pub fn new(user_id: Uuid, content_id: Uuid, action_kind: &str) -> Self {
        Self {
            user_id,
            content_id,
            action_kind: action_kind.to_string(),
            weight: ActionKind::weight_for(action_kind),
            occurred_at: Utc::now(),
        }
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }
}

impl ContentSimilarityEdge {
    /// Stores the pair in canonical order so swapped arguments hit the same edge.
    pub fn new(a: Uuid, b: Uuid, score: f64, factors: Vec<String>) -> Self {
        let (item_a, item_b) = Self::pair_key(a, b);
        Self {
            item_a,
            item_b,
            score,
            factors,
            last_updated: Utc::now(),
        }
    }

    pub fn pair_key(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn other(&self, id: Uuid) -> Option<Uuid> {
        if self.item_a == id {
            Some(self.item_b)
        } else if self.item_b == id {
            Some(self.item_a)
        } else {
            None
        }
    }
}

impl Topic {
    pub fn parse(key: &str) -> Topic {
        match key.strip_prefix(AUTHOR_TOPIC_PREFIX) {
            Some(rest) => match Uuid::parse_str(rest) {
                Ok(author_id) => Topic::Author(author_id),
                Err(_) => Topic::Tag(key.to_string()),
            },
            None => Topic::Tag(key.to_string()),
        }
    }

    pub fn key(&self) -> String {
        match self {
            Topic::Tag(tag) => tag.clone(),
            Topic::Author(author_id) => format!("{}{}", AUTHOR_TOPIC_PREFIX, author_id),
        }
    }
}

impl UserInterest {
    pub fn new(user_id: Uuid, topic: String, weight: f64, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            topic,
            weight,
            last_seen: now,
            created_at: now,
            updated_at: now,
        }
    }
}

impl RecommendationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationCategory::BasedOnLikes => "based_on_likes",
            RecommendationCategory::SimilarContent => "similar_content",
            RecommendationCategory::Trending => "trending",
            RecommendationCategory::Popular => "popular",
            RecommendationCategory::New => "new",
            RecommendationCategory::All => "all",
        }
    }

    /// `All` matches every category.
    pub fn matches(&self, other: RecommendationCategory) -> bool {
        *self == RecommendationCategory::All || *self == other
    }
}

impl FromStr for RecommendationCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "based_on_likes" => Ok(RecommendationCategory::BasedOnLikes),
            "similar_content" => Ok(RecommendationCategory::SimilarContent),
            "trending" => Ok(RecommendationCategory::Trending),
            "popular" => Ok(RecommendationCategory::Popular),
            "new" => Ok(RecommendationCategory::New),
            "all" | "" => Ok(RecommendationCategory::All),
            other => Err(format!("unknown recommendation category: {}", other)),
        }
    }
}

impl UserRecommendation {
    pub fn new(
        user_id: Uuid,
        content_id: Uuid,
        score: f64,
        reason: String,
        category: RecommendationCategory,
        generated_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            content_id,
            score,
            reason,
            category,
            generated_at,
            expires_at: generated_at + ttl,
            is_viewed: false,
            viewed_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl RecommendationStats {
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            total: 0,
            viewed: 0,
            clicked: 0,
            average_score: 0.0,
            last_generated_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Folds a freshly generated batch into the running average.
    pub fn record_batch(&mut self, count: u64, score_sum: f64, at: DateTime<Utc>) {
        let previous_mass = self.average_score * self.total as f64;
        self.total += count;
        if self.total > 0 {
            self.average_score = (previous_mass + score_sum) / self.total as f64;
        }
        self.last_generated_at = Some(at);
        self.updated_at = at;
    }
}
