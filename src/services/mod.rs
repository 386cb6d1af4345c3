pub mod discovery;
pub mod interest;
pub mod recommendation;
pub mod similarity;
pub mod store;
pub mod tracker;
pub mod worker;
