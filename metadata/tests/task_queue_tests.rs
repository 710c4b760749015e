//! Task queue behavior against a live PostgreSQL instance. These tests skip
//! when `FLOE_SQL_CONNECTION_STRING` is not set.

use anyhow::Result;
use serial_test::serial;
use sqlx::PgPool;

use floe_metadata::metadata_connection::connect_and_migrate;
use floe_metadata::sql_task_queue::{self, TaskFilter};
use floe_metadata::task::{TaskKind, TaskStatus};

async fn test_pool() -> Result<Option<PgPool>> {
    let Ok(connection_string) = std::env::var("FLOE_SQL_CONNECTION_STRING") else {
        eprintln!("FLOE_SQL_CONNECTION_STRING not set, skipping database test");
        return Ok(None);
    };
    let pool = connect_and_migrate(&connection_string).await?;
    sql_task_queue::flush(&pool).await?;
    Ok(Some(pool))
}

fn empty_input() -> serde_json::Value {
    serde_json::json!({})
}

#[tokio::test]
#[serial]
async fn test_enqueue_then_list_includes_id() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let id = sql_task_queue::enqueue(&pool, "events", TaskKind::ExpireSnapshots, empty_input())
        .await?;
    let page = sql_task_queue::list(
        &pool,
        &TaskFilter {
            table_name: Some(String::from("events")),
            ..TaskFilter::default()
        },
    )
    .await?;
    assert_eq!(page.total, 1);
    let task = page.items.iter().find(|t| t.id == id).expect("task listed");
    assert_eq!(task.status, TaskStatus::Queued);
    assert_eq!(task.kind, "expire_snapshots");
    assert!(task.picked_up_at.is_none());
    assert!(task.finished_at.is_none());
    assert!(task.error_message.is_none());
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_claim_respects_per_table_mutual_exclusion() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let first = sql_task_queue::enqueue(&pool, "events", TaskKind::Optimize, empty_input()).await?;
    let second =
        sql_task_queue::enqueue(&pool, "events", TaskKind::Optimize, empty_input()).await?;
    let other =
        sql_task_queue::enqueue(&pool, "metrics", TaskKind::Optimize, empty_input()).await?;

    let claimed = sql_task_queue::claim(&pool).await?.expect("oldest task");
    assert_eq!(claimed.id, first);
    assert_eq!(claimed.status, TaskStatus::Running);
    assert!(claimed.picked_up_at.is_some());

    // the second events task is shadowed by the running one; metrics is free
    let claimed = sql_task_queue::claim(&pool).await?.expect("other table");
    assert_eq!(claimed.id, other);

    assert!(sql_task_queue::claim(&pool).await?.is_none());

    sql_task_queue::complete(&pool, first, None, None).await?;
    let claimed = sql_task_queue::claim(&pool).await?.expect("unblocked task");
    assert_eq!(claimed.id, second);
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_claim_race_yields_single_winner() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let id = sql_task_queue::enqueue(&pool, "events", TaskKind::Optimize, empty_input()).await?;

    let (a, b) = tokio::join!(sql_task_queue::claim(&pool), sql_task_queue::claim(&pool));
    let (a, b) = (a?, b?);
    let winners: Vec<_> = [a, b].into_iter().flatten().collect();
    assert_eq!(winners.len(), 1, "exactly one claimer wins");
    assert_eq!(winners[0].id, id);
    assert_eq!(winners[0].status, TaskStatus::Running);

    let counts = sql_task_queue::counts(&pool).await?;
    assert_eq!(counts.running, 1);
    assert_eq!(counts.queued, 0);
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_terminal_states_are_sticky() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let id = sql_task_queue::enqueue(&pool, "events", TaskKind::RemoveOrphanFiles, empty_input())
        .await?;
    let claimed = sql_task_queue::claim(&pool).await?.expect("claimed");
    sql_task_queue::complete(
        &pool,
        id,
        Some(serde_json::json!({"deleted_files_count": 3})),
        None,
    )
    .await?;

    let page = sql_task_queue::list(&pool, &TaskFilter::default()).await?;
    let task = page.items.iter().find(|t| t.id == id).expect("listed");
    assert_eq!(task.status, TaskStatus::Success);
    assert!(task.error_message.is_none());
    let finished_at = task.finished_at.expect("finished");
    assert!(finished_at >= claimed.picked_up_at.expect("picked up"));

    // a second completion must not rewrite the terminal row
    sql_task_queue::complete(&pool, id, None, Some("late failure")).await?;
    let page = sql_task_queue::list(&pool, &TaskFilter::default()).await?;
    let task = page.items.iter().find(|t| t.id == id).expect("listed");
    assert_eq!(task.status, TaskStatus::Success);
    assert_eq!(task.finished_at, Some(finished_at));
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_failed_task_records_error_message() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let id = sql_task_queue::enqueue(&pool, "events", TaskKind::Optimize, empty_input()).await?;
    sql_task_queue::claim(&pool).await?.expect("claimed");
    sql_task_queue::complete(&pool, id, None, Some("no suitable day-partition column")).await?;

    let page = sql_task_queue::list(
        &pool,
        &TaskFilter {
            statuses: vec![TaskStatus::Error],
            ..TaskFilter::default()
        },
    )
    .await?;
    assert_eq!(page.total, 1);
    assert_eq!(
        page.items[0].error_message.as_deref(),
        Some("no suitable day-partition column")
    );
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_list_pagination_and_filters() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    for i in 0..5 {
        let table = if i % 2 == 0 { "events" } else { "metrics" };
        let kind = if i < 3 {
            TaskKind::Optimize
        } else {
            TaskKind::ExpireSnapshots
        };
        sql_task_queue::enqueue(&pool, table, kind, empty_input()).await?;
    }

    let page = sql_task_queue::list(
        &pool,
        &TaskFilter {
            limit: Some(2),
            ..TaskFilter::default()
        },
    )
    .await?;
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total, 5);
    for window in page.items.windows(2) {
        assert!(window[0].started_at >= window[1].started_at, "newest first");
    }

    let page = sql_task_queue::list(
        &pool,
        &TaskFilter {
            limit: Some(2),
            offset: 4,
            ..TaskFilter::default()
        },
    )
    .await?;
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.total, 5);

    let page = sql_task_queue::list(
        &pool,
        &TaskFilter {
            kinds: vec![TaskKind::Optimize],
            ..TaskFilter::default()
        },
    )
    .await?;
    assert_eq!(page.total, 3);

    let page = sql_task_queue::list(
        &pool,
        &TaskFilter {
            table_name: Some(String::from("events")),
            kinds: vec![TaskKind::ExpireSnapshots, TaskKind::Optimize],
            statuses: vec![TaskStatus::Queued],
            ..TaskFilter::default()
        },
    )
    .await?;
    assert_eq!(page.total, 3);
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_flush_then_counts_is_zero() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    sql_task_queue::enqueue(&pool, "events", TaskKind::Optimize, empty_input()).await?;
    sql_task_queue::enqueue(&pool, "metrics", TaskKind::Optimize, empty_input()).await?;
    sql_task_queue::claim(&pool).await?.expect("claimed");

    let deleted = sql_task_queue::flush(&pool).await?;
    assert_eq!(deleted, 2);
    let counts = sql_task_queue::counts(&pool).await?;
    assert_eq!((counts.running, counts.queued), (0, 0));
    Ok(())
}
