use crate::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// How often goal pools are rebuilt in the background
pub const POOL_REFRESH_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Spawn a background task that warms every tier's goal pool at startup and
/// rebuilds them every `interval`
pub fn spawn_goal_pool_refresher(state: Arc<AppState>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tracing::debug!("Refreshing goal pools");
            state.challenges.refresh_pools().await;
            tokio::time::sleep(interval).await;
        }
    })
}
