pub mod decay;
pub mod scoring;
pub mod similarity;

pub use decay::{days_since, time_decay};
pub use scoring::{by_score_desc, engagement_score, popularity_signal, recency_signal, score_candidate, CandidateScore};
pub use similarity::{content_similarity, jaccard, text_overlap, word_set, SimilarityBreakdown};
