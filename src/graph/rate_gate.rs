use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
struct GateState {
    /// Earliest time the next request may go out
    next_permitted: Instant,
    /// Set by a 429; applies to every caller
    blocked_until: Option<Instant>,
}

/// Process-wide token dispenser for outbound graph requests.
///
/// Every caller reserves its slot under the lock and then sleeps outside it,
/// so concurrent callers are spaced at least `min_spacing` apart.
#[derive(Debug)]
pub struct RateGate {
    min_spacing: Duration,
    state: Mutex<GateState>,
}

impl RateGate {
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            state: Mutex::new(GateState {
                next_permitted: Instant::now(),
                blocked_until: None,
            }),
        }
    }

    /// Wait until this caller may send a request
    pub async fn acquire(&self) {
        let slot = {
            let mut state = self.state.lock().await;
            let mut slot = state.next_permitted.max(Instant::now());
            if let Some(blocked_until) = state.blocked_until {
                slot = slot.max(blocked_until);
            }
            state.next_permitted = slot + self.min_spacing;
            slot
        };

        tokio::time::sleep_until(slot).await;
    }

    /// Hold back all callers for at least `duration` from now
    pub async fn block_for(&self, duration: Duration) {
        let until = Instant::now() + duration;
        let mut state = self.state.lock().await;
        if state.blocked_until.map_or(true, |current| current < until) {
            tracing::warn!(?duration, "Graph source rate limited us, blocking all requests");
            state.blocked_until = Some(until);
        }
    }

    /// Most recent block deadline; may already be in the past
    pub async fn blocked_until(&self) -> Option<Instant> {
        self.state.lock().await.blocked_until
    }
}
