use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashSet;

/// Keywords of the SQLite dialect.
pub const SQLITE_KEYWORDS: &[&str] = &[
    "ABORT", "ACTION", "ADD", "AFTER", "ALL", "ALTER", "ALWAYS", "ANALYZE", "AND", "AS", "ASC",
    "ATTACH", "AUTOINCREMENT", "BEFORE", "BEGIN", "BETWEEN", "BY", "CASCADE", "CASE", "CAST",
    "CHECK", "COLLATE", "COLUMN", "COMMIT", "CONFLICT", "CONSTRAINT", "CREATE", "CROSS",
    "CURRENT", "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "DATABASE", "DEFAULT",
    "DEFERRABLE", "DEFERRED", "DELETE", "DESC", "DETACH", "DISTINCT", "DO", "DROP", "EACH",
    "ELSE", "END", "ESCAPE", "EXCEPT", "EXCLUDE", "EXCLUSIVE", "EXISTS", "EXPLAIN", "FAIL",
    "FILTER", "FIRST", "FOLLOWING", "FOR", "FOREIGN", "FROM", "FULL", "GENERATED", "GLOB",
    "GROUP", "GROUPS", "HAVING", "IF", "IGNORE", "IMMEDIATE", "IN", "INDEX", "INDEXED",
    "INITIALLY", "INNER", "INSERT", "INSTEAD", "INTERSECT", "INTO", "IS", "ISNULL", "JOIN", "KEY",
    "LAST", "LEFT", "LIKE", "LIMIT", "MATCH", "MATERIALIZED", "NATURAL", "NO", "NOT", "NOTHING",
    "NOTNULL", "NULL", "NULLS", "OF", "OFFSET", "ON", "OR", "ORDER", "OTHERS", "OUTER", "OVER",
    "PARTITION", "PLAN", "PRAGMA", "PRECEDING", "PRIMARY", "QUERY", "RAISE", "RANGE",
    "RECURSIVE", "REFERENCES", "REGEXP", "REINDEX", "RELEASE", "RENAME", "REPLACE", "RESTRICT",
    "RETURNING", "RIGHT", "ROLLBACK", "ROW", "ROWS", "SAVEPOINT", "SELECT", "SET", "TABLE",
    "TEMP", "TEMPORARY", "THEN", "TIES", "TO", "TRANSACTION", "TRIGGER", "UNBOUNDED", "UNION",
    "UNIQUE", "UPDATE", "USING", "VACUUM", "VALUES", "VIEW", "VIRTUAL", "WHEN", "WHERE",
    "WINDOW", "WITH", "WITHOUT",
];

static PLAIN_IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").unwrap());

/// Reserved-word table, built once and shared read-only.
#[derive(Debug, Clone)]
pub struct ReservedWords {
    words: HashSet<String>,
}

impl ReservedWords {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words
                .into_iter()
                .map(|w| w.as_ref().to_ascii_uppercase())
                .collect(),
        }
    }

    pub fn sqlite() -> Self {
        Self::new(SQLITE_KEYWORDS)
    }

    pub fn is_reserved(&self, identifier: &str) -> bool {
        self.words.contains(&identifier.to_ascii_uppercase())
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Quote `identifier` if it is reserved or not a plain identifier.
    pub fn quote<'a>(&self, identifier: &'a str) -> Cow<'a, str> {
        if self.is_reserved(identifier) || !PLAIN_IDENTIFIER.is_match(identifier) {
            Cow::Owned(format!("\"{}\"", identifier.replace('"', "\"\"")))
        } else {
            Cow::Borrowed(identifier)
        }
    }
}

impl Default for ReservedWords {
    fn default() -> Self {
        Self::sqlite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_words_are_quoted() {
        let words = ReservedWords::sqlite();
        assert_eq!(words.quote("Order"), "\"Order\"");
        assert_eq!(words.quote("select"), "\"select\"");
        assert_eq!(words.quote("GROUP"), "\"GROUP\"");
    }

    #[test]
    fn test_plain_identifiers_are_not_quoted() {
        let words = ReservedWords::sqlite();
        assert_eq!(words.quote("title"), "title");
        assert_eq!(words.quote("author_ID"), "author_ID");
        assert!(matches!(words.quote("Books"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_odd_identifiers_are_quoted_and_escaped() {
        let words = ReservedWords::sqlite();
        assert_eq!(words.quote("first name"), "\"first name\"");
        assert_eq!(words.quote("a\"b"), "\"a\"\"b\"");
        assert_eq!(words.quote("1st"), "\"1st\"");
    }

    #[test]
    fn test_keyword_table_size() {
        let words = ReservedWords::sqlite();
        assert_eq!(words.len(), SQLITE_KEYWORDS.len());
        assert!(!words.is_empty());
    }
}
