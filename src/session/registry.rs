use crate::classify::Classifier;
use crate::error::{Error, ErrorType, Result};
use crate::model::{PostBatch, PostMode, PostStatus, RawFragment};
use crate::session::{Edit, EditField, Session, SessionKey, SessionSettings, SessionState};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info};

type Handle = Arc<Mutex<Session>>;

/// All live sessions, keyed by (user, session key).
///
/// The registry map has one coarse lock that is only held to look up, insert or remove a
/// session handle, never across an await on a session. Each session has its own lock, held for
/// the whole of one operation, so fragments for one session are applied strictly in arrival
/// order while different sessions proceed independently.
pub struct SessionRegistry {
    classifier: Classifier,
    settings: SessionSettings,
    sessions: Mutex<HashMap<SessionKey, Handle>>,
}

impl SessionRegistry {
    pub fn new(classifier: Classifier, settings: SessionSettings) -> Self {
        Self {
            classifier,
            settings,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Explicitly starts collecting. An existing open session keeps its contents and takes the
    /// new mode.
    pub async fn start(&self, key: &SessionKey, mode: PostMode) -> Result<Session> {
        let mut session = self.lock_or_create(key, mode).await;
        session.set_mode(mode)?;
        Ok(session.clone())
    }

    /// Classifies `fragment` into the session `(user_id, fragment.session_key)`, creating the
    /// session on its first fragment.
    pub async fn submit(&self, user_id: i64, fragment: &RawFragment) -> Result<SessionState> {
        let key = SessionKey::new(user_id, fragment.session_key.clone());
        let mut session = self.lock_or_create(&key, PostMode::default()).await;
        session.absorb(fragment, &self.classifier)
    }

    pub async fn add_row(&self, key: &SessionKey) -> Result<usize> {
        self.lock(key).await?.add_row()
    }

    pub async fn remove_row(&self, key: &SessionKey, row: usize) -> Result<()> {
        self.lock(key).await?.remove_row(row)
    }

    pub async fn set_mode(&self, key: &SessionKey, mode: PostMode) -> Result<()> {
        self.lock(key).await?.set_mode(mode)
    }

    pub async fn begin_edit(&self, key: &SessionKey, row: usize, field: EditField) -> Result<()> {
        self.lock(key).await?.begin_edit(row, field)
    }

    pub async fn cancel_edit(&self, key: &SessionKey) -> Result<()> {
        self.lock(key).await?.cancel_edit();
        Ok(())
    }

    pub async fn edit(&self, key: &SessionKey, row: usize, edit: Edit) -> Result<()> {
        self.lock(key).await?.edit(row, edit)
    }

    /// Validates and locks the session, returning what should be posted.
    pub async fn confirm(&self, key: &SessionKey) -> Result<PostBatch> {
        self.lock(key).await?.confirm()
    }

    /// Moves a confirmed session into `Posting`. From here on it cannot be cancelled.
    pub async fn begin_posting(&self, key: &SessionKey) -> Result<()> {
        self.lock(key).await?.begin_posting()
    }

    /// Records how posting ended and discards the session.
    pub async fn finish_posting(&self, key: &SessionKey, status: PostStatus) -> Result<Session> {
        let mut session = self.lock(key).await?;
        session.finish_posting(status);
        self.remove(key, &mut session).await;
        info!("Session {key} finished: {status}");
        Ok(session.clone())
    }

    /// Discards a session. Rejected once posting has started.
    pub async fn cancel(&self, key: &SessionKey) -> Result<()> {
        let mut session = self.lock(key).await?;
        if session.phase() == super::Phase::Posting {
            return Err(Error::msg(
                ErrorType::SessionState,
                format!("Session {key} is posting and cannot be cancelled"),
            ));
        }
        self.remove(key, &mut session).await;
        info!("Session {key} cancelled");
        Ok(())
    }

    /// A copy of the session, if it exists.
    pub async fn snapshot(&self, key: &SessionKey) -> Option<Session> {
        let handle = self.sessions.lock().await.get(key).cloned()?;
        let session = handle.lock().await;
        (!session.is_discarded()).then(|| session.clone())
    }

    /// Evicts sessions idle for longer than the idle timeout as of `now`. Sessions that are
    /// posting, or busy with an operation right now, are left alone. Returns the number evicted.
    pub async fn sweep_idle(&self, now: Instant) -> usize {
        let timeout = self.settings.idle_timeout();
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|key, handle| {
            let Ok(mut session) = handle.try_lock() else {
                return true;
            };
            let idle = now.saturating_duration_since(session.last_activity());
            let evict = idle > timeout && session.phase() != super::Phase::Posting;
            if evict {
                debug!("Evicting session {key} after {}s idle", idle.as_secs());
                session.discard();
            }
            !evict
        });
        before - sessions.len()
    }

    async fn lock_or_create(&self, key: &SessionKey, mode: PostMode) -> OwnedMutexGuard<Session> {
        loop {
            let handle = {
                let mut sessions = self.sessions.lock().await;
                sessions
                    .entry(key.clone())
                    .or_insert_with(|| {
                        debug!("Starting session {key}");
                        Arc::new(Mutex::new(Session::new(
                            key.clone(),
                            mode,
                            self.settings.clone(),
                        )))
                    })
                    .clone()
            };
            let session = handle.lock_owned().await;
            // Removed while we waited; go round and create a fresh one
            if !session.is_discarded() {
                return session;
            }
        }
    }

    async fn lock(&self, key: &SessionKey) -> Result<OwnedMutexGuard<Session>> {
        let handle = self.sessions.lock().await.get(key).cloned();
        let missing = || Error::msg(ErrorType::SessionState, format!("No session {key}"));
        let handle = handle.ok_or_else(missing)?;
        let session = handle.lock_owned().await;
        if session.is_discarded() {
            return Err(missing());
        }
        Ok(session)
    }

    /// Removes `key` from the map. The caller holds the session's lock.
    async fn remove(&self, key: &SessionKey, session: &mut Session) {
        session.discard();
        self.sessions.lock().await.remove(key);
    }
}

/// Runs `sweep_idle` every `period` until the returned task is aborted.
pub fn spawn_sweeper(registry: Arc<SessionRegistry>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let evicted = registry.sweep_idle(Instant::now()).await;
            if evicted > 0 {
                info!("Evicted {evicted} idle session(s)");
            }
        }
    })
}
