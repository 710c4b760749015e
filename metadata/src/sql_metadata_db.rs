use anyhow::{Context, Result};
use sqlx::Executor;

async fn create_tables_table(tr: &mut sqlx::Transaction<'_, sqlx::Postgres>) -> Result<()> {
    let sql = "
         CREATE TABLE tables(
                  name VARCHAR(255) PRIMARY KEY,
                  columns JSONB NOT NULL,
                  partitions JSONB NOT NULL,
                  updated_at TIMESTAMPTZ NOT NULL
                  );";
    tr.execute(sql)
        .await
        .with_context(|| String::from("Creating table tables"))?;
    Ok(())
}

async fn create_partitions_table(tr: &mut sqlx::Transaction<'_, sqlx::Postgres>) -> Result<()> {
    let sql = "
         CREATE TABLE partitions(
                  table_name VARCHAR(255) NOT NULL,
                  partition JSONB NOT NULL,
                  spec_id INT NOT NULL,
                  record_count BIGINT NOT NULL,
                  file_count BIGINT NOT NULL,
                  total_data_file_size_in_bytes BIGINT NOT NULL,
                  needs_optimize BOOLEAN NOT NULL,
                  needs_optimize_count BIGINT NOT NULL,
                  last_updated_at TIMESTAMPTZ NOT NULL,
                  last_updated_snapshot_id BIGINT
                  );
         CREATE INDEX partition_table_name on partitions(table_name);";
    tr.execute(sql)
        .await
        .with_context(|| String::from("Creating table partitions and its indices"))?;
    Ok(())
}

async fn create_snapshots_table(tr: &mut sqlx::Transaction<'_, sqlx::Postgres>) -> Result<()> {
    let sql = "
         CREATE TABLE snapshots(
                  table_name VARCHAR(255) NOT NULL,
                  snapshot_id BIGINT NOT NULL,
                  parent_id BIGINT,
                  committed_at TIMESTAMPTZ NOT NULL,
                  operation VARCHAR(255) NOT NULL,
                  manifest_list VARCHAR(2047) NOT NULL,
                  summary JSONB NOT NULL
                  );
         CREATE INDEX snapshot_table_name_id on snapshots(table_name, snapshot_id);";
    tr.execute(sql)
        .await
        .with_context(|| String::from("Creating table snapshots and its indices"))?;
    Ok(())
}

async fn create_tasks_table(tr: &mut sqlx::Transaction<'_, sqlx::Postgres>) -> Result<()> {
    // task_claim serves the oldest-queued candidate scan, task_table_started
    // the per-table history listing.
    let sql = "
         CREATE TABLE tasks(
                  id BIGSERIAL PRIMARY KEY,
                  table_name VARCHAR(255) NOT NULL,
                  kind VARCHAR(64) NOT NULL,
                  status VARCHAR(32) NOT NULL,
                  started_at TIMESTAMPTZ NOT NULL,
                  picked_up_at TIMESTAMPTZ,
                  finished_at TIMESTAMPTZ,
                  error_message TEXT,
                  input JSONB NOT NULL,
                  result JSONB
                  );
         CREATE INDEX task_claim on tasks(status, started_at);
         CREATE INDEX task_table_started on tasks(table_name, started_at DESC);
         CREATE INDEX task_kind on tasks(kind);
         CREATE INDEX task_status on tasks(status);";
    tr.execute(sql)
        .await
        .with_context(|| String::from("Creating table tasks and its indices"))?;
    Ok(())
}

async fn create_settings_table(tr: &mut sqlx::Transaction<'_, sqlx::Postgres>) -> Result<()> {
    let sql = "
         CREATE TABLE settings(
                  key VARCHAR(255) PRIMARY KEY,
                  value VARCHAR(1023) NOT NULL,
                  updated_at TIMESTAMPTZ NOT NULL
                  );";
    tr.execute(sql)
        .await
        .with_context(|| String::from("Creating table settings"))?;
    Ok(())
}

async fn create_migration_table(tr: &mut sqlx::Transaction<'_, sqlx::Postgres>) -> Result<()> {
    sqlx::query("CREATE table floe_migration(version integer);")
        .execute(&mut **tr)
        .await
        .with_context(|| "Creating table floe_migration")?;
    sqlx::query("INSERT INTO floe_migration VALUES(1);")
        .execute(&mut **tr)
        .await
        .with_context(|| "Recording the initial schema version")?;
    Ok(())
}

pub async fn create_tables(tr: &mut sqlx::Transaction<'_, sqlx::Postgres>) -> Result<()> {
    create_tables_table(tr).await?;
    create_partitions_table(tr).await?;
    create_snapshots_table(tr).await?;
    create_tasks_table(tr).await?;
    create_settings_table(tr).await?;
    create_migration_table(tr).await?;
    Ok(())
}
