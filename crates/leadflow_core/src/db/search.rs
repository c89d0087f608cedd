//! `lead_contains(haystack, needle)`: Unicode case-insensitive substring
//! match used by the lead list and count predicates.

use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;

pub(crate) const SEARCH_FUNCTION: &str = "lead_contains";

pub(super) fn register_search_function(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        SEARCH_FUNCTION,
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let haystack = ctx.get::<Option<String>>(0)?;
            let needle = ctx.get::<String>(1)?;
            Ok(haystack.is_some_and(|value| contains_ignoring_case(&value, &needle)))
        },
    )
}

/// Literal substring test after lowercasing both sides.
fn contains_ignoring_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::contains_ignoring_case;

    #[test]
    fn folds_non_ascii_case() {
        assert!(contains_ignoring_case("Jürgen MÜLLER", "müller"));
        assert!(contains_ignoring_case("Ärzte GmbH", "ÄRZTE"));
        assert!(contains_ignoring_case("Σοφία", "ΣΟΦ"));
        assert!(!contains_ignoring_case("Mueller", "müller"));
    }

    #[test]
    fn wildcards_are_literal() {
        assert!(contains_ignoring_case("100% Leads", "0%"));
        assert!(!contains_ignoring_case("1000 Leads", "0%"));
        assert!(!contains_ignoring_case("ab", "a_b"));
    }
}
