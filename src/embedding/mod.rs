pub mod cache;
pub mod fetcher;
pub mod transport;
pub mod types;
pub mod user_skills;
