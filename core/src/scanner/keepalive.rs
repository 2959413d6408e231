use std::future::Future;
use std::time::Duration;

use scanbox_common::progress::Progress;
use tokio::time::{Instant, MissedTickBehavior};

/// Drives `fut` to completion, notifying `progress` every `every` while it is pending.
///
/// The first notification fires one full interval after the call starts.
/// A zero interval disables notifications.
pub async fn with_keepalive<F>(every: Duration, progress: &Progress, fut: F) -> F::Output
where
    F: Future,
{
    if every.is_zero() {
        return fut.await;
    }

    // An interval too long to represent never fires.
    let Some(first_tick) = Instant::now().checked_add(every) else {
        return fut.await;
    };

    tokio::pin!(fut);
    let mut ticker = tokio::time::interval_at(first_tick, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            out = &mut fut => return out,
            _ = ticker.tick() => progress.notify(),
        }
    }
}
