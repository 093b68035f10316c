//! Dialect hooks used by the clause visitors and statement builders.

/// Trait for dialect-specific SQL generation.
pub trait SqlGenerator {
    /// Quote an identifier (table, column or output name).
    fn quote_identifier(&self, name: &str) -> String;
    /// Generate the named parameter placeholder for a 1-based index.
    fn placeholder(&self, index: usize) -> String;
    /// Get the boolean literal (true/false vs 1/0).
    fn bool_literal(&self, val: bool) -> String {
        if val { "1".to_string() } else { "0".to_string() }
    }
    /// Quote a string literal.
    fn string_literal(&self, val: &str, unicode: bool) -> String;
    /// Generate string concatenation expression.
    fn string_concat(&self, parts: &[&str]) -> String;
    /// Trailing pagination clause.
    fn limit_offset(&self, limit: Option<usize>, offset: Option<usize>) -> String;
    /// Leading row limit placed after SELECT (`TOP(n) `), if the dialect has one.
    fn top(&self, _limit: usize) -> Option<String> {
        None
    }
    /// True when `limit_offset(None, Some(n))` is valid SQL.
    fn offset_without_limit(&self) -> bool {
        false
    }
    /// Escape LIKE wildcards inside a pattern fragment.
    fn like_escape(&self, pattern: &str) -> String;
    /// Null-coalescing function name.
    fn isnull_function(&self) -> &str;
    /// Existence test over `body` (`FROM ... WHERE ...`) yielding a single 1/0 row.
    fn any_query(&self, body: &str) -> String;
    /// Expression returning the last generated identity value.
    fn last_identity(&self) -> &str;
    /// Qualify SET targets with the table alias in `UPDATE ... SET`.
    fn qualify_update_target(&self) -> bool {
        false
    }
    /// True when the SET list of a joined UPDATE precedes its joins.
    fn update_set_first(&self) -> bool {
        true
    }
    /// Assemble a joined UPDATE.
    fn update_statement(&self, table: &str, alias: &str, set: &str, joins: &str, filter: &str) -> String {
        format!("UPDATE {} SET {} FROM {} {}{}{}", alias, set, table, alias, joins, filter)
    }

    // Intrinsics used by the method translator

    fn length_function(&self) -> &str;
    fn string_cast(&self, expr: &str) -> String;
    fn substring(&self, expr: &str, start: &str, length: Option<&str>) -> String {
        match length {
            Some(len) => format!("SUBSTRING({}, {}, {})", expr, start, len),
            None => format!("SUBSTRING({}, {})", expr, start),
        }
    }
    fn trim(&self, expr: &str) -> String {
        format!("TRIM({})", expr)
    }
    /// `HOUR`, `MINUTE`, `SECOND` and friends.
    fn date_part(&self, part: &str, expr: &str) -> String;
    /// Date portion of a datetime.
    fn date_only(&self, expr: &str) -> String;
    fn now(&self, utc: bool) -> &str;
    fn round(&self, expr: &str, digits: Option<&str>) -> String {
        match digits {
            Some(d) => format!("ROUND({}, {})", expr, d),
            None => format!("ROUND({})", expr),
        }
    }
}
