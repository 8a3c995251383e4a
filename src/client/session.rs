use tokio::sync::RwLock;

/// The signed-in user as seen by the client. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub username: String,
    pub access_token: String,
}

/// Session value together with the generation it was read at.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub session: Option<Session>,
    pub generation: u64,
}

/// Single owner of the current session.
///
/// Every write bumps the generation, so a caller holding an old snapshot can
/// tell that someone else already replaced the token it saw rejected.
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: RwLock<SessionSnapshot>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn current(&self) -> Option<Session> {
        self.inner.read().await.session.clone()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.inner.read().await.clone()
    }

    /// Replace the session. Returns the new generation.
    pub async fn set(&self, session: Session) -> u64 {
        let mut inner = self.inner.write().await;
        inner.session = Some(session);
        inner.generation += 1;
        inner.generation
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.session = None;
        inner.generation += 1;
    }
}
