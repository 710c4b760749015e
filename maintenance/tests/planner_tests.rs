//! Planner behavior against a live PostgreSQL instance, covering the
//! optimize fan-out and argument clamping. Skipped when
//! `FLOE_SQL_CONNECTION_STRING` is unset.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use serial_test::serial;
use sqlx::PgPool;

use floe_maintenance::planner::TaskPlanner;
use floe_metadata::metadata_connection::connect_and_migrate;
use floe_metadata::partition::PartitionStats;
use floe_metadata::sql_partitions;
use floe_metadata::sql_task_queue::{self, TaskFilter};
use floe_metadata::task::{OptimizeInput, TaskStatus};

async fn test_pool() -> Result<Option<PgPool>> {
    let Ok(connection_string) = std::env::var("FLOE_SQL_CONNECTION_STRING") else {
        eprintln!("FLOE_SQL_CONNECTION_STRING not set, skipping database test");
        return Ok(None);
    };
    let pool = connect_and_migrate(&connection_string).await?;
    sql_task_queue::flush(&pool).await?;
    Ok(Some(pool))
}

fn day_partition(day: u32, needs_optimize: bool) -> PartitionStats {
    PartitionStats {
        partition: BTreeMap::from([
            (String::from("year"), String::from("2026")),
            (String::from("month"), String::from("01")),
            (String::from("day"), format!("{day:02}")),
        ]),
        spec_id: 0,
        record_count: 500,
        file_count: 8,
        total_data_file_size_in_bytes: 256 * 1024 * 1024,
        needs_optimize,
        needs_optimize_count: if needs_optimize { 3 } else { 0 },
        last_updated_at: Utc::now(),
        last_updated_snapshot_id: Some(7),
    }
}

async fn seed_partitions(pool: &PgPool, table: &str, partitions: &[PartitionStats]) -> Result<()> {
    let mut tr = pool.begin().await?;
    sql_partitions::replace_partitions(&mut tr, table, partitions).await?;
    tr.commit().await?;
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_optimize_fan_out_one_task_per_flagged_partition() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    seed_partitions(
        &pool,
        "events",
        &[
            day_partition(5, true),
            day_partition(2, true),
            day_partition(10, false),
        ],
    )
    .await?;

    let planner = TaskPlanner::new(pool.clone());
    let ids = planner
        .enqueue_optimize(
            "events",
            128,
            Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()),
            Some(NaiveDate::from_ymd_opt(2026, 1, 31).unwrap()),
        )
        .await?;
    assert_eq!(ids.len(), 2);
    assert!(ids[0] < ids[1], "ids follow ascending partition date");

    let page = sql_task_queue::list(
        &pool,
        &TaskFilter {
            table_name: Some(String::from("events")),
            ..TaskFilter::default()
        },
    )
    .await?;
    assert_eq!(page.total, 2);
    let mut windows = vec![];
    for id in &ids {
        let task = page.items.iter().find(|t| t.id == *id).expect("task row");
        assert_eq!(task.status, TaskStatus::Queued);
        let input: OptimizeInput = serde_json::from_value(task.input.clone())?;
        assert_eq!(input.from, input.to, "single-day window");
        assert_eq!(input.file_size_threshold_mb, 128);
        windows.push(input.from);
    }
    assert_eq!(
        windows,
        vec![
            NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
        ]
    );
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_optimize_reenqueue_produces_disjoint_ids() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    seed_partitions(&pool, "events", &[day_partition(2, true)]).await?;
    let planner = TaskPlanner::new(pool.clone());
    let window = (
        Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()),
        Some(NaiveDate::from_ymd_opt(2026, 1, 31).unwrap()),
    );
    let first = planner
        .enqueue_optimize("events", 128, window.0, window.1)
        .await?;
    let second = planner
        .enqueue_optimize("events", 128, window.0, window.1)
        .await?;
    assert!(first.iter().all(|id| !second.contains(id)));
    let page = sql_task_queue::list(&pool, &TaskFilter::default()).await?;
    assert_eq!(page.total, 2, "existing tasks unaffected");
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_optimize_with_no_matching_partitions_is_empty_success() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    seed_partitions(&pool, "events", &[day_partition(2, false)]).await?;
    let planner = TaskPlanner::new(pool.clone());
    let ids = planner
        .enqueue_optimize(
            "events",
            128,
            Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()),
            Some(NaiveDate::from_ymd_opt(2026, 1, 31).unwrap()),
        )
        .await?;
    assert!(ids.is_empty());
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_default_threshold_lands_in_stored_input() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    seed_partitions(&pool, "events", &[day_partition(2, true)]).await?;
    let planner = TaskPlanner::new(pool.clone());
    let ids = planner
        .enqueue_optimize(
            "events",
            0,
            Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()),
            Some(NaiveDate::from_ymd_opt(2026, 1, 31).unwrap()),
        )
        .await?;
    let page = sql_task_queue::list(&pool, &TaskFilter::default()).await?;
    let task = page.items.iter().find(|t| t.id == ids[0]).expect("task row");
    let input: OptimizeInput = serde_json::from_value(task.input.clone())?;
    assert_eq!(input.file_size_threshold_mb, 128);
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_retention_clamps_visible_in_stored_input() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let planner = TaskPlanner::new(pool.clone());
    let expire_id = planner.enqueue_expire_snapshots("events", 3, 2).await?;
    let orphan_id = planner.enqueue_remove_orphan_files("events", 6).await?;

    let page = sql_task_queue::list(&pool, &TaskFilter::default()).await?;
    let expire = page.items.iter().find(|t| t.id == expire_id).expect("row");
    assert_eq!(
        expire.input,
        serde_json::json!({"retention_days": 7, "retain_last": 10})
    );
    let orphan = page.items.iter().find(|t| t.id == orphan_id).expect("row");
    assert_eq!(orphan.input, serde_json::json!({"retention_days": 7}));
    Ok(())
}
