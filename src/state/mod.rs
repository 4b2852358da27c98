pub mod rate_cache;
pub mod store;
