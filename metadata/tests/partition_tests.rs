//! Partition storage, aggregation and planner-query behavior against a live
//! PostgreSQL instance. Skipped when `FLOE_SQL_CONNECTION_STRING` is unset.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use serial_test::serial;
use sqlx::PgPool;

use floe_metadata::metadata_connection::connect_and_migrate;
use floe_metadata::partition::PartitionStats;
use floe_metadata::sql_partitions;

async fn test_pool() -> Result<Option<PgPool>> {
    let Ok(connection_string) = std::env::var("FLOE_SQL_CONNECTION_STRING") else {
        eprintln!("FLOE_SQL_CONNECTION_STRING not set, skipping database test");
        return Ok(None);
    };
    Ok(Some(connect_and_migrate(&connection_string).await?))
}

fn day_partition(year: &str, month: &str, day: &str, needs_optimize: bool) -> PartitionStats {
    PartitionStats {
        partition: BTreeMap::from([
            (String::from("year"), year.to_string()),
            (String::from("month"), month.to_string()),
            (String::from("day"), day.to_string()),
        ]),
        spec_id: 0,
        record_count: 1000,
        file_count: 4,
        total_data_file_size_in_bytes: 512 * 1024 * 1024,
        needs_optimize,
        needs_optimize_count: if needs_optimize { 2 } else { 0 },
        last_updated_at: Utc::now(),
        last_updated_snapshot_id: Some(42),
    }
}

async fn replace(pool: &PgPool, table: &str, partitions: &[PartitionStats]) -> Result<()> {
    let mut tr = pool.begin().await?;
    sql_partitions::replace_partitions(&mut tr, table, partitions).await?;
    tr.commit().await?;
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_replace_partitions_is_idempotent() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let partitions = vec![
        day_partition("2026", "01", "02", true),
        day_partition("2026", "01", "05", false),
    ];
    replace(&pool, "idempotence_check", &partitions).await?;
    let first = sql_partitions::list_partitions(&pool, "idempotence_check").await?;
    replace(&pool, "idempotence_check", &partitions).await?;
    let second = sql_partitions::list_partitions(&pool, "idempotence_check").await?;
    assert_eq!(first.len(), 2);
    let keys = |set: &[PartitionStats]| {
        set.iter().map(|p| p.partition.clone()).collect::<Vec<_>>()
    };
    assert_eq!(keys(&first), keys(&second));

    // a smaller refresh replaces, never accumulates
    replace(
        &pool,
        "idempotence_check",
        &[day_partition("2026", "02", "01", false)],
    )
    .await?;
    let third = sql_partitions::list_partitions(&pool, "idempotence_check").await?;
    assert_eq!(third.len(), 1);
    assert_eq!(third[0].partition["month"], "02");
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_table_totals() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    replace(
        &pool,
        "totals_check",
        &[
            day_partition("2026", "01", "02", true),
            day_partition("2026", "01", "03", true),
            day_partition("2026", "01", "04", false),
        ],
    )
    .await?;
    let totals = sql_partitions::fetch_table_totals(&pool, "totals_check").await?;
    assert_eq!(totals.partition_count, 3);
    assert_eq!(totals.record_count, 3000);
    assert_eq!(totals.file_count, 12);
    assert_eq!(totals.partitions_needing_optimize, 2);
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_drill_down_aggregates_next_level() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    replace(
        &pool,
        "drill_check",
        &[
            day_partition("2026", "01", "02", true),
            day_partition("2026", "01", "05", false),
            day_partition("2026", "02", "01", false),
        ],
    )
    .await?;

    let years =
        sql_partitions::drill_down_partitions(&pool, "drill_check", &BTreeMap::new(), "year")
            .await?;
    assert_eq!(years.len(), 1);
    assert_eq!(years[0].value, "2026");
    assert_eq!(years[0].partition_count, 3);
    assert!(years[0].needs_optimize);

    let selected = BTreeMap::from([(String::from("year"), String::from("2026"))]);
    let months =
        sql_partitions::drill_down_partitions(&pool, "drill_check", &selected, "month").await?;
    assert_eq!(
        months.iter().map(|m| m.value.as_str()).collect::<Vec<_>>(),
        vec!["01", "02"]
    );
    assert_eq!(months[0].partition_count, 2);
    assert!(months[0].needs_optimize);
    assert!(!months[1].needs_optimize);

    let selected = BTreeMap::from([
        (String::from("year"), String::from("2026")),
        (String::from("month"), String::from("01")),
    ]);
    let days =
        sql_partitions::drill_down_partitions(&pool, "drill_check", &selected, "day").await?;
    assert_eq!(
        days.iter().map(|d| d.value.as_str()).collect::<Vec<_>>(),
        vec!["02", "05"]
    );
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_optimizable_dates_normalize_unpadded_values() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    replace(
        &pool,
        "lpad_check",
        &[
            // written by an older refresh that did not pad values
            day_partition("2026", "1", "2", true),
            day_partition("2026", "01", "05", true),
            day_partition("2026", "01", "07", false),
            day_partition("2026", "02", "01", true),
        ],
    )
    .await?;
    let dates = sql_partitions::list_optimizable_partition_dates(
        &pool,
        "lpad_check",
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
    )
    .await?;
    assert_eq!(
        dates,
        vec![
            NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
        ]
    );
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_identity_partitions_never_qualify_for_optimize() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let identity = PartitionStats {
        partition: BTreeMap::from([(String::from("region"), String::from("eu-west-1"))]),
        spec_id: 0,
        record_count: 10,
        file_count: 1,
        total_data_file_size_in_bytes: 1024,
        needs_optimize: true,
        needs_optimize_count: 1,
        last_updated_at: Utc::now(),
        last_updated_snapshot_id: None,
    };
    replace(&pool, "identity_check", &[identity]).await?;
    let dates = sql_partitions::list_optimizable_partition_dates(
        &pool,
        "identity_check",
        NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2100, 1, 1).unwrap(),
    )
    .await?;
    assert!(dates.is_empty(), "no calendar levels, no derived date");
    Ok(())
}
