use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::refresh::RefreshService;

/// Timer-driven full refresh across all catalog tables. One failing cycle is
/// logged and the ticker keeps going; cancellation exits between tables.
pub async fn run_periodic_refresh(
    refresh: Arc<RefreshService>,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("periodic refresh started, interval {interval:?}");
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("periodic refresh stopping");
                return;
            }
            _ = ticker.tick() => {}
        }
        if let Err(e) = refresh.refresh_all_tables(&token).await {
            error!("refresh cycle failed: {e:?}");
        }
    }
}
