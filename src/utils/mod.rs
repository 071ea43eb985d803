pub mod key_filter;
pub mod ttl_cache;
