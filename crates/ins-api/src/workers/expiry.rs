//! Periodic contract expiry sweep

use crate::AppState;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

pub async fn run_expiry_sweep(state: Arc<AppState>, every: Duration) {
    info!("Expiry sweep running every {}s", every.as_secs());

    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match state.contracts.expire_due(Utc::now()).await {
            Ok(0) => debug!("Expiry sweep found nothing to expire"),
            Ok(_) => {}
            Err(e) => error!("Expiry sweep failed: {}", e),
        }
    }
}
