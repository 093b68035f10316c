use super::super::traits::SqlGenerator;

pub struct SqlServerGenerator;

impl SqlGenerator for SqlServerGenerator {
    fn quote_identifier(&self, id: &str) -> String {
        format!("[{}]", id.replace(']', "]]"))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("@p{}", index)
    }

    fn string_literal(&self, val: &str, unicode: bool) -> String {
        let prefix = if unicode { "N" } else { "" };
        format!("{}'{}'", prefix, val.replace('\'', "''"))
    }

    fn string_concat(&self, parts: &[&str]) -> String {
        parts.join(" + ")
    }

    fn limit_offset(&self, limit: Option<usize>, offset: Option<usize>) -> String {
        // OFFSET/FETCH needs an ORDER BY; the select builder guarantees one
        let mut sql = String::new();
        if limit.is_some() || offset.is_some() {
            sql.push_str(&format!(" OFFSET {} ROWS", offset.unwrap_or(0)));
            if let Some(lim) = limit {
                sql.push_str(&format!(" FETCH NEXT {} ROWS ONLY", lim));
            }
        }
        sql
    }

    fn top(&self, limit: usize) -> Option<String> {
        Some(format!("TOP({}) ", limit))
    }

    fn offset_without_limit(&self) -> bool {
        true
    }

    fn like_escape(&self, pattern: &str) -> String {
        let mut out = String::with_capacity(pattern.len());
        for c in pattern.chars() {
            match c {
                '[' => out.push_str("[[]"),
                '%' => out.push_str("[%]"),
                '_' => out.push_str("[_]"),
                c => out.push(c),
            }
        }
        out
    }

    fn isnull_function(&self) -> &str {
        "ISNULL"
    }

    fn any_query(&self, body: &str) -> String {
        format!("IF EXISTS(SELECT TOP(1) 1 {}) SELECT 1 ELSE SELECT 0", body)
    }

    fn last_identity(&self) -> &str {
        "SCOPE_IDENTITY()"
    }

    fn length_function(&self) -> &str {
        "LEN"
    }

    fn string_cast(&self, expr: &str) -> String {
        format!("CAST({} AS NVARCHAR(MAX))", expr)
    }

    fn substring(&self, expr: &str, start: &str, length: Option<&str>) -> String {
        // SUBSTRING requires a length; LEN covers the rest of the string
        let len = length.map_or_else(|| format!("LEN({})", expr), str::to_string);
        format!("SUBSTRING({}, {}, {})", expr, start, len)
    }

    fn trim(&self, expr: &str) -> String {
        format!("LTRIM(RTRIM({}))", expr)
    }

    fn date_part(&self, part: &str, expr: &str) -> String {
        format!("DATEPART({}, {})", part, expr)
    }

    fn date_only(&self, expr: &str) -> String {
        format!("CAST({} AS DATE)", expr)
    }

    fn now(&self, utc: bool) -> &str {
        if utc { "GETUTCDATE()" } else { "GETDATE()" }
    }

    fn round(&self, expr: &str, digits: Option<&str>) -> String {
        format!("ROUND({}, {})", expr, digits.unwrap_or("0"))
    }
}
