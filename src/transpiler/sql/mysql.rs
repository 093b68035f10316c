use crate::transpiler::traits::SqlGenerator;

/// MySQL Generator.
pub struct MysqlGenerator;

impl SqlGenerator for MysqlGenerator {
    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("?p{}", index)
    }

    fn string_literal(&self, val: &str, _unicode: bool) -> String {
        format!("'{}'", val.replace('\\', "\\\\").replace('\'', "''"))
    }

    fn string_concat(&self, parts: &[&str]) -> String {
        format!("CONCAT({})", parts.join(", "))
    }

    fn limit_offset(&self, limit: Option<usize>, offset: Option<usize>) -> String {
        let mut sql = String::new();
        if let Some(n) = limit {
            sql.push_str(&format!(" LIMIT {}", n));
        }
        if let Some(n) = offset {
            sql.push_str(&format!(" OFFSET {}", n));
        }
        sql
    }

    fn like_escape(&self, pattern: &str) -> String {
        let mut out = String::with_capacity(pattern.len());
        for c in pattern.chars() {
            if matches!(c, '\\' | '%' | '_') {
                out.push('\\');
            }
            out.push(c);
        }
        out
    }

    fn isnull_function(&self) -> &str {
        "IFNULL"
    }

    fn any_query(&self, body: &str) -> String {
        format!(
            "SELECT CASE WHEN COUNT(1) = 1 THEN 1 ELSE 0 END FROM (SELECT 1 {} LIMIT 1) t0",
            body
        )
    }

    fn last_identity(&self) -> &str {
        "LAST_INSERT_ID()"
    }

    fn qualify_update_target(&self) -> bool {
        true
    }

    fn update_set_first(&self) -> bool {
        false
    }

    fn update_statement(&self, table: &str, alias: &str, set: &str, joins: &str, filter: &str) -> String {
        format!("UPDATE {} {}{} SET {}{}", table, alias, joins, set, filter)
    }

    fn length_function(&self) -> &str {
        "CHAR_LENGTH"
    }

    fn string_cast(&self, expr: &str) -> String {
        format!("CAST({} AS CHAR)", expr)
    }

    fn date_part(&self, part: &str, expr: &str) -> String {
        format!("{}({})", part, expr)
    }

    fn date_only(&self, expr: &str) -> String {
        format!("DATE({})", expr)
    }

    fn now(&self, utc: bool) -> &str {
        if utc { "UTC_TIMESTAMP()" } else { "NOW()" }
    }
}
