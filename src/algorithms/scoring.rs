use super::decay::days_since;
use crate::models::{ContentItem, RecommendationCategory, Topic, UserInterest};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

pub const AUTHOR_INTEREST_MULTIPLIER: f64 = 2.0;
pub const TAG_INTEREST_MULTIPLIER: f64 = 1.5;
pub const POPULARITY_WEIGHT: f64 = 0.3;
pub const RECENCY_WEIGHT: f64 = 0.2;
/// Popularity above this marks a recommendation as `popular`.
pub const POPULAR_CATEGORY_THRESHOLD: f64 = 0.5;
const RECENCY_WINDOW_DAYS: f64 = 30.0;

pub const DEFAULT_REASON: &str = "Recommended based on your interests";

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub score: f64,
    pub reason: String,
    pub category: RecommendationCategory,
}

/// `(views + likes * 2) / 100`
pub fn popularity_signal(item: &ContentItem) -> f64 {
    (item.views as f64 + item.likes as f64 * 2.0) / 100.0
}

/// Linear falloff to zero over thirty days.
pub fn recency_signal(item: &ContentItem, now: DateTime<Utc>) -> f64 {
    (1.0 - days_since(item.created_at, now) / RECENCY_WINDOW_DAYS).max(0.0)
}

/// Engagement used to rank the popular discovery feed.
pub fn engagement_score(item: &ContentItem) -> u64 {
    item.views + item.likes * 2 + item.comments * 3
}

/// Scores one candidate against a user's interests.
///
/// `interests` is expected strongest first, so the first matching interest
/// supplies the explanation.
pub fn score_candidate(
    item: &ContentItem,
    interests: &[UserInterest],
    now: DateTime<Utc>,
) -> CandidateScore {
    let mut score = 0.0;
    let mut reasons = Vec::new();

    for interest in interests {
        match Topic::parse(&interest.topic) {
            Topic::Author(author_id) => {
                if item.author_id == author_id {
                    score += interest.weight * AUTHOR_INTEREST_MULTIPLIER;
                    reasons.push("Based on your interest in this author".to_string());
                }
            }
            Topic::Tag(tag) => {
                if item.tags.iter().any(|t| *t == tag) {
                    score += interest.weight * TAG_INTEREST_MULTIPLIER;
                    reasons.push(format!("Based on your interest in {}", tag));
                }
            }
        }
    }

    let popularity = popularity_signal(item);
    score += popularity * POPULARITY_WEIGHT;
    score += recency_signal(item, now) * RECENCY_WEIGHT;

    let category = if popularity > POPULAR_CATEGORY_THRESHOLD {
        RecommendationCategory::Popular
    } else {
        RecommendationCategory::BasedOnLikes
    };

    CandidateScore {
        score,
        reason: reasons
            .into_iter()
            .next()
            .unwrap_or_else(|| DEFAULT_REASON.to_string()),
        category,
    }
}

pub fn by_score_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn interest(topic: String, weight: f64) -> UserInterest {
        UserInterest::new(Uuid::new_v4(), topic, weight, Utc::now())
    }

    fn old_item(author: Uuid, tags: &[&str]) -> ContentItem {
        ContentItem::new("t", "b", author, tags.iter().map(|t| t.to_string()).collect())
            .with_created_at(Utc::now() - Duration::days(60))
    }

    #[test]
    fn author_and_tag_interests_accumulate() {
        let author = Uuid::new_v4();
        let item = old_item(author, &["go", "web"]);
        let interests = vec![
            interest(Topic::Author(author).key(), 0.5),
            interest("go".to_string(), 0.4),
            interest("rust".to_string(), 0.1),
        ];
        let scored = score_candidate(&item, &interests, Utc::now());
        assert!((scored.score - (0.5 * 2.0 + 0.4 * 1.5)).abs() < 1e-9);
        assert_eq!(scored.reason, "Based on your interest in this author");
        assert_eq!(scored.category, RecommendationCategory::BasedOnLikes);
    }

    #[test]
    fn duplicate_tags_count_once_per_interest() {
        let item = old_item(Uuid::new_v4(), &["go", "go"]);
        let scored = score_candidate(&item, &[interest("go".to_string(), 0.4)], Utc::now());
        assert!((scored.score - 0.6).abs() < 1e-9);
        assert_eq!(scored.reason, "Based on your interest in go");
    }

    #[test]
    fn popularity_drives_category() {
        let item = old_item(Uuid::new_v4(), &[]).with_engagement(40, 10, 0);
        let scored = score_candidate(&item, &[], Utc::now());
        assert!((popularity_signal(&item) - 0.6).abs() < 1e-9);
        assert_eq!(scored.category, RecommendationCategory::Popular);
        assert_eq!(scored.reason, DEFAULT_REASON);
    }

    #[test]
    fn brand_new_item_gets_full_recency_bonus() {
        let now = Utc::now();
        let item = ContentItem::new("t", "b", Uuid::new_v4(), vec![]).with_created_at(now);
        assert!((recency_signal(&item, now) - 1.0).abs() < 1e-9);
        assert!((score_candidate(&item, &[], now).score - RECENCY_WEIGHT).abs() < 1e-9);
    }

    #[test]
    fn engagement_weights_comments_highest() {
        let item = old_item(Uuid::new_v4(), &[]).with_engagement(10, 2, 3);
        assert_eq!(engagement_score(&item), 10 + 4 + 9);
    }
}
