use gs_portal_core::PortalSession;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::info;
use uuid::Uuid;

struct Tracked {
    session: Arc<PortalSession>,
    last_seen: Instant,
}

/// Open portal sessions. A session idle for `idle_ttl` is evicted by [`SessionRegistry::sweep`].
pub(crate) struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Tracked>>,
    idle_ttl: Duration,
}

impl SessionRegistry {
    pub(crate) fn new(idle_ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_ttl,
        }
    }

    pub(crate) async fn insert(&self, session: Arc<PortalSession>) {
        let id = session.id();
        let tracked = Tracked {
            session,
            last_seen: Instant::now(),
        };
        self.sessions.write().await.insert(id, tracked);
    }

    /// Looks up a session and marks it as active.
    pub(crate) async fn touch(&self, id: &Uuid) -> Option<Arc<PortalSession>> {
        let mut sessions = self.sessions.write().await;
        let tracked = sessions.get_mut(id)?;
        tracked.last_seen = Instant::now();
        Some(tracked.session.clone())
    }

    pub(crate) async fn remove(&self, id: &Uuid) -> Option<Arc<PortalSession>> {
        self.sessions.write().await.remove(id).map(|tracked| tracked.session)
    }

    /// Drops and closes every session last seen `idle_ttl` or more before `now`.
    pub(crate) async fn sweep(&self, now: Instant) -> usize {
        let expired: Vec<Arc<PortalSession>> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<Uuid> = sessions
                .iter()
                .filter(|(_, tracked)| now.saturating_duration_since(tracked.last_seen) >= self.idle_ttl)
                .map(|(id, _)| *id)
                .collect();
            ids.iter()
                .filter_map(|id| sessions.remove(id))
                .map(|tracked| tracked.session)
                .collect()
        };

        for session in &expired {
            session.close().await;
        }
        expired.len()
    }
}

/// Runs [`SessionRegistry::sweep`] on a fixed interval; never returns.
pub(crate) async fn reap_idle(registry: Arc<SessionRegistry>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let evicted = registry.sweep(Instant::now()).await;
        if evicted > 0 {
            info!(evicted, "idle sessions evicted");
        }
    }
}
