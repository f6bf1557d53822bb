//! Query path parsing and the handler registry.
//!
//! Paths are matched with any single leading `/` removed, so
//! `/app/simulate` and `app/simulate` are the same route.

use crate::ConsensusError;
use indexmap::IndexMap;
use std::sync::Arc;

/// Handles a registered query. Receives the request data, returns the value.
pub type QueryHandler = Arc<dyn Fn(&[u8]) -> Result<Vec<u8>, ConsensusError> + Send + Sync>;

/// Built-in route a query path resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Route<'a> {
    /// `store/<name>/...`: read a key from a committed store.
    Store { name: &'a str },
    /// `p2p/filter/addr/<addr>`
    FilterAddr(&'a str),
    /// `p2p/filter/id/<id>`
    FilterId(&'a str),
    /// `app/simulate`
    Simulate,
    /// `app/version`
    Version,
    /// Anything else: looked up in the handler registry.
    Custom(&'a str),
}

/// Strip one leading `/`.
pub(crate) fn normalize(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

impl<'a> Route<'a> {
    /// Resolve a non-empty, normalized path.
    pub(crate) fn parse(path: &'a str) -> Result<Self, ConsensusError> {
        let mut segments = path.splitn(4, '/');
        let route = match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some("store"), Some(name), ..) if !name.is_empty() => Route::Store { name },
            (Some("store"), ..) => return Err(ConsensusError::NoQueryHandler(path.to_string())),
            (Some("p2p"), Some("filter"), Some("addr"), Some(addr)) => Route::FilterAddr(addr),
            (Some("p2p"), Some("filter"), Some("id"), Some(id)) => Route::FilterId(id),
            (Some("app"), Some("simulate"), None, None) => Route::Simulate,
            (Some("app"), Some("version"), None, None) => Route::Version,
            _ => Route::Custom(path),
        };
        Ok(route)
    }
}

/// Registry of query handlers keyed by exact (normalized) path.
#[derive(Default, Clone)]
pub struct QueryRouter {
    handlers: IndexMap<String, QueryHandler>,
}

impl std::fmt::Debug for QueryRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryRouter")
            .field("paths", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl QueryRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `path`, replacing any previous handler.
    /// Returns true if one was replaced.
    pub fn register(&mut self, path: &str, handler: QueryHandler) -> bool {
        self.handlers
            .insert(normalize(path).to_string(), handler)
            .is_some()
    }

    /// Handler for an exact path.
    pub fn route(&self, path: &str) -> Option<&QueryHandler> {
        self.handlers.get(normalize(path))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_builtin_routes() {
        assert_eq!(
            Route::parse("store/cookies/key").unwrap(),
            Route::Store { name: "cookies" }
        );
        assert_eq!(
            Route::parse("store/cookies/").unwrap(),
            Route::Store { name: "cookies" }
        );
        assert_eq!(
            Route::parse("p2p/filter/addr/1.1.1.1:8000").unwrap(),
            Route::FilterAddr("1.1.1.1:8000")
        );
        assert_eq!(Route::parse("p2p/filter/id/abc").unwrap(), Route::FilterId("abc"));
        assert_eq!(Route::parse("app/simulate").unwrap(), Route::Simulate);
        assert_eq!(Route::parse("app/version").unwrap(), Route::Version);
        assert_eq!(
            Route::parse("cadence.bank.Query/Balance").unwrap(),
            Route::Custom("cadence.bank.Query/Balance")
        );
        assert!(matches!(
            Route::parse("store/"),
            Err(ConsensusError::NoQueryHandler(_))
        ));
    }

    #[test]
    fn test_normalize_strips_one_slash() {
        assert_eq!(normalize("/app/version"), "app/version");
        assert_eq!(normalize("app/version"), "app/version");
        assert_eq!(normalize("//x"), "/x");
    }

    #[test]
    fn test_router_matches_exact_paths() {
        let mut router = QueryRouter::new();
        let handler: QueryHandler = Arc::new(|data: &[u8]| -> Result<Vec<u8>, ConsensusError> {
            Ok(data.to_vec())
        });
        assert!(!router.register("/cadence.bank.Query/Balance", Arc::clone(&handler)));
        assert!(router.register("cadence.bank.Query/Balance", handler));

        assert_eq!(router.len(), 1);
        let found = router.route("/cadence.bank.Query/Balance").unwrap();
        assert_eq!(found(b"abc").unwrap(), b"abc".to_vec());
        assert!(router.route("cadence.bank.Query").is_none());
    }
}
