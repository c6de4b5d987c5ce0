//! SafeQueryGuard - static text filter for mutating statements
//!
//! Defense-in-depth, not a parser. The guard runs once on the model's raw
//! output and again on any string that is about to be sent to the execution
//! engine, including strings produced by an intermediate rewrite step.

/// Keywords that mark a query as mutating/DDL.
const MUTATING_KEYWORDS: [&str; 7] = [
    "drop", "delete", "truncate", "insert", "update", "create", "append",
];

/// Static safety check for generated queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafeQueryGuard;

impl SafeQueryGuard {
    pub fn new() -> Self {
        Self
    }

    /// Returns `false` for empty input and for any query containing a
    /// mutating keyword as a standalone word (case-insensitive). Matching is
    /// token-based so identifiers like `created_at` do not trip the filter.
    pub fn is_safe(&self, query: &str) -> bool {
        if query.trim().is_empty() {
            return false;
        }
        let lowered = query.to_lowercase();
        !lowered
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|token| !token.is_empty())
            .any(|token| MUTATING_KEYWORDS.contains(&token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_mutating_keywords_in_any_case() {
        let guard = SafeQueryGuard::new();
        for query in [
            "DROP TABLE orders",
            "delete from orders",
            "Truncate orders",
            "INSERT INTO orders VALUES (1)",
            "update orders set amount = 0",
            "CREATE TABLE t (id int)",
            "append into t select * from s",
        ] {
            assert!(!guard.is_safe(query), "expected rejection: {}", query);
        }
    }

    #[test]
    fn test_accepts_plain_select() {
        let guard = SafeQueryGuard::new();
        assert!(guard.is_safe("SELECT amount, order_date FROM orders"));
        assert!(guard.is_safe(
            "select date_trunc('month', order_date) as month, sum(amount) \
             from orders group by 1 order by 1"
        ));
    }

    #[test]
    fn test_keyword_inside_identifier_does_not_trip() {
        let guard = SafeQueryGuard::new();
        assert!(guard.is_safe("SELECT created_at, updated_count FROM audit_log"));
    }

    #[test]
    fn test_empty_input_is_unsafe() {
        let guard = SafeQueryGuard::new();
        assert!(!guard.is_safe(""));
        assert!(!guard.is_safe("   \n\t"));
    }
}
