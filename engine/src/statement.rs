use chrono::NaiveDate;

/// Quotes an SQL identifier for the lakehouse engine.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quotes a string literal for the lakehouse engine.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Fully qualified, quoted table reference.
pub fn qualified_table(catalog: &str, database: &str, table: &str) -> String {
    format!(
        "{}.{}.{}",
        quote_ident(catalog),
        quote_ident(database),
        quote_ident(table)
    )
}

pub fn expire_snapshots_statement(
    catalog: &str,
    database: &str,
    table: &str,
    retention_days: i32,
    retain_last: i32,
) -> String {
    format!(
        "ALTER TABLE {} EXECUTE expire_snapshots(retention_threshold => {}, retain_last => {}, clean_expired_metadata => true)",
        qualified_table(catalog, database, table),
        quote_literal(&format!("{retention_days}d")),
        retain_last
    )
}

pub fn remove_orphan_files_statement(
    catalog: &str,
    database: &str,
    table: &str,
    retention_days: i32,
) -> String {
    format!(
        "ALTER TABLE {} EXECUTE remove_orphan_files(retention_threshold => {})",
        qualified_table(catalog, database, table),
        quote_literal(&format!("{retention_days}d"))
    )
}

pub fn optimize_statement(
    catalog: &str,
    database: &str,
    table: &str,
    file_size_threshold_mb: i64,
    day_column: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> String {
    format!(
        "ALTER TABLE {} EXECUTE optimize(file_size_threshold => {}) WHERE date({}) >= date {} AND date({}) <= date {}",
        qualified_table(catalog, database, table),
        quote_literal(&format!("{file_size_threshold_mb}MB")),
        quote_ident(day_column),
        quote_literal(&from.format("%Y-%m-%d").to_string()),
        quote_ident(day_column),
        quote_literal(&to.format("%Y-%m-%d").to_string())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoting() {
        assert_eq!(quote_ident("events"), "\"events\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_literal("7d"), "'7d'");
        assert_eq!(quote_literal("o'clock"), "'o''clock'");
    }

    #[test]
    fn test_expire_snapshots_statement() {
        assert_eq!(
            expire_snapshots_statement("lakehouse", "main", "events", 7, 10),
            "ALTER TABLE \"lakehouse\".\"main\".\"events\" EXECUTE expire_snapshots(retention_threshold => '7d', retain_last => 10, clean_expired_metadata => true)"
        );
    }

    #[test]
    fn test_remove_orphan_files_statement() {
        assert_eq!(
            remove_orphan_files_statement("lakehouse", "main", "events", 14),
            "ALTER TABLE \"lakehouse\".\"main\".\"events\" EXECUTE remove_orphan_files(retention_threshold => '14d')"
        );
    }

    #[test]
    fn test_optimize_statement() {
        let from = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        assert_eq!(
            optimize_statement("lakehouse", "main", "events", 128, "event_time", from, from),
            "ALTER TABLE \"lakehouse\".\"main\".\"events\" EXECUTE optimize(file_size_threshold => '128MB') WHERE date(\"event_time\") >= date '2026-01-02' AND date(\"event_time\") <= date '2026-01-02'"
        );
    }
}
