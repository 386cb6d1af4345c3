use crate::models::ContentItem;
use std::collections::HashSet;
use std::hash::Hash;

pub const TAG_WEIGHT: f64 = 0.4;
pub const AUTHOR_WEIGHT: f64 = 0.3;
pub const CONTENT_WEIGHT: f64 = 0.2;
pub const TITLE_WEIGHT: f64 = 0.1;

/// Words of this length or shorter are ignored in text overlap.
const MIN_WORD_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityBreakdown {
    pub score: f64,
    pub factors: Vec<String>,
}

/// Jaccard index. Two empty sets are identical, one empty set shares nothing.
pub fn jaccard<T: Eq + Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let intersection = a.iter().filter(|x| b.contains(*x)).count();
    let union = a.len() + b.len() - intersection;

    intersection as f64 / union as f64
}

pub fn tag_set(tags: &[String]) -> HashSet<&str> {
    tags.iter().map(String::as_str).collect()
}

pub fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(str::to_lowercase)
        .filter(|word| word.chars().count() > MIN_WORD_LEN)
        .collect()
}

pub fn text_overlap(a: &str, b: &str) -> f64 {
    jaccard(&word_set(a), &word_set(b))
}

/// Weighted blend of tag, author, body and title overlap.
///
/// The result is divided by the weight of the signals that were actually
/// evaluated, so an item compared with itself scores 1.0. The tag signal is
/// only evaluated when both items carry tags.
pub fn content_similarity(a: &ContentItem, b: &ContentItem) -> SimilarityBreakdown {
    let mut weighted = 0.0;
    let mut active = 0.0;
    let mut factors = Vec::new();

    if !a.tags.is_empty() && !b.tags.is_empty() {
        let overlap = jaccard(&tag_set(&a.tags), &tag_set(&b.tags));
        weighted += overlap * TAG_WEIGHT;
        active += TAG_WEIGHT;
        if overlap > 0.0 {
            factors.push("tags".to_string());
        }
    }

    let same_author = a.author_id == b.author_id;
    if same_author {
        weighted += AUTHOR_WEIGHT;
        factors.push("author".to_string());
    }
    active += AUTHOR_WEIGHT;

    let body = text_overlap(&a.body, &b.body);
    weighted += body * CONTENT_WEIGHT;
    active += CONTENT_WEIGHT;
    if body > 0.0 {
        factors.push("content".to_string());
    }

    let title = text_overlap(&a.title, &b.title);
    weighted += title * TITLE_WEIGHT;
    active += TITLE_WEIGHT;
    if title > 0.0 {
        factors.push("title".to_string());
    }

    let score = if active > 0.0 {
        (weighted / active).clamp(0.0, 1.0)
    } else {
        0.0
    };

    SimilarityBreakdown { score, factors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn item(title: &str, body: &str, author: Uuid, tags: &[&str]) -> ContentItem {
        ContentItem::new(title, body, author, tags.iter().map(|t| t.to_string()).collect())
    }

    #[test]
    fn jaccard_empty_rules() {
        let empty: HashSet<&str> = HashSet::new();
        let one: HashSet<&str> = ["go"].into_iter().collect();
        assert_eq!(jaccard(&empty, &empty), 1.0);
        assert_eq!(jaccard(&empty, &one), 0.0);
        assert_eq!(jaccard(&one, &empty), 0.0);
    }

    #[test]
    fn jaccard_partial_overlap() {
        let a: HashSet<&str> = ["go", "web", "api"].into_iter().collect();
        let b: HashSet<&str> = ["go", "web", "db"].into_iter().collect();
        assert!((jaccard(&a, &b) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn word_set_drops_short_words_and_lowercases() {
        let words = word_set("The Quick fox JUMPS over");
        assert!(words.contains("quick"));
        assert!(words.contains("jumps"));
        assert!(words.contains("over"));
        assert!(!words.contains("the"));
        assert!(!words.contains("fox"));
    }

    #[test]
    fn self_similarity_is_one() {
        let x = item("Writing async servers", "tokio makes async servers pleasant", Uuid::new_v4(), &["rust", "async"]);
        let breakdown = content_similarity(&x, &x);
        assert!((breakdown.score - 1.0).abs() < 1e-9);
        assert_eq!(breakdown.factors, vec!["tags", "author", "content", "title"]);
    }

    #[test]
    fn similarity_is_symmetric() {
        let a = item("Parsing with nom", "combinators build parsers quickly", Uuid::new_v4(), &["rust", "parsing"]);
        let b = item("Parsing JSON fast", "simd parsers beat combinators", Uuid::new_v4(), &["parsing", "json", "simd"]);
        assert_eq!(content_similarity(&a, &b).score, content_similarity(&b, &a).score);
    }

    #[test]
    fn shared_tags_only_scores_tag_share() {
        let a = item("alpha", "lorem ipsum dolor", Uuid::new_v4(), &["go", "web"]);
        let b = item("omega", "sphinx quartz judge", Uuid::new_v4(), &["web", "go"]);
        let breakdown = content_similarity(&a, &b);
        assert!((breakdown.score - TAG_WEIGHT).abs() < 1e-9);
        assert_eq!(breakdown.factors, vec!["tags"]);
    }

    #[test]
    fn untagged_item_drops_tag_signal() {
        let author = Uuid::new_v4();
        let a = item("alpha", "lorem ipsum dolor", author, &[]);
        let b = item("omega", "sphinx quartz judge", author, &["go"]);
        let breakdown = content_similarity(&a, &b);
        let expected = AUTHOR_WEIGHT / (AUTHOR_WEIGHT + CONTENT_WEIGHT + TITLE_WEIGHT);
        assert!((breakdown.score - expected).abs() < 1e-9);
    }
}
