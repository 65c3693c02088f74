//! Deterministic cache key construction for analytics query results.
//!
//! Keys are namespaced by query type (`funnel:`, `retention:`, `metrics:`,
//! `user_journey:`, `event_summary:`) and built by sorting the parameter set
//! and joining with `:`, so the same logical query always produces the same
//! key regardless of the order its parameters were supplied in.

pub struct CacheKeyBuilder {
    namespace: &'static str,
    params: Vec<(String, String)>,
}

impl CacheKeyBuilder {
    pub fn new(namespace: &'static str) -> Self {
        Self { namespace, params: Vec::new() }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl std::fmt::Display) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    pub fn build(mut self) -> String {
        self.params.sort_by(|a, b| a.0.cmp(&b.0));
        let joined = self
            .params
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(":");
        format!("{}:{}", self.namespace, joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_order_independent() {
        let a = CacheKeyBuilder::new("funnel")
            .with("org", "o1")
            .with("funnel_id", "f1")
            .build();
        let b = CacheKeyBuilder::new("funnel")
            .with("funnel_id", "f1")
            .with("org", "o1")
            .build();
        assert_eq!(a, b);
    }

    #[test]
    fn key_includes_namespace_prefix() {
        let key = CacheKeyBuilder::new("retention").with("org", "o1").build();
        assert!(key.starts_with("retention:"));
    }
}
