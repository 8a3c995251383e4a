use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use super::error::ClientError;
use super::session::{Session, SessionStore};
use super::transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
use crate::api::TokenResponse;
use crate::db::{Job, JobFields};

/// Result of the silent refresh performed at application start.
#[derive(Debug)]
pub enum StartupOutcome {
    /// The refresh cookie was valid; no login form needed
    Established(Session),
    /// No usable cookie. Show the login form without an error
    SignedOut,
    /// Server or network fault. Show the login form with this error
    Unavailable(ClientError),
}

/// Where a protected request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    /// First send with the token current at send time
    Initial,
    /// Second and last send, after a refresh
    Retried,
}

/// What a single send produced.
enum Outcome {
    Success(ApiResponse),
    AuthFailure,
    OtherFailure(ClientError),
}

#[derive(Deserialize)]
struct RegisterResponse {
    success: String,
}

/// Client half of the session protocol.
///
/// Holds the access token in memory only. Protected calls go through
/// [`AuthClient::send`], which renews an expired token once and retries.
/// Clones share one session.
pub struct AuthClient<T = HttpTransport> {
    inner: Arc<Shared<T>>,
}

impl<T> Clone for AuthClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// State shared between clones and with spawned refresh tasks.
struct Shared<T> {
    transport: T,
    session: SessionStore,
    /// Serialises refreshes so concurrent 401s consume one refresh token
    refresh_lock: Mutex<()>,
}

impl AuthClient<HttpTransport> {
    pub fn connect(base_url: &str) -> Result<Self, ClientError> {
        let base = Url::parse(base_url)
            .map_err(|e| ClientError::NoResponse(format!("Invalid server URL {base_url}: {e}")))?;
        Ok(Self::new(HttpTransport::new(base)?))
    }
}

fn require_credentials(user: &str, pwd: &str) -> Result<(), ClientError> {
    if user.trim().is_empty() || pwd.is_empty() {
        return Err(ClientError::MissingField(
            "Username and password are required.".to_string(),
        ));
    }
    Ok(())
}

fn to_json<S: serde::Serialize>(value: &S) -> Result<serde_json::Value, ClientError> {
    serde_json::to_value(value).map_err(|e| ClientError::Decode(e.to_string()))
}

impl<T: Transport + 'static> AuthClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            inner: Arc::new(Shared {
                transport,
                session: SessionStore::new(),
                refresh_lock: Mutex::new(()),
            }),
        }
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn session_store(&self) -> &SessionStore {
        &self.inner.session
    }

    /// The current session, read at call time.
    pub async fn session(&self) -> Option<Session> {
        self.inner.session.current().await
    }

    /// Try to resume a session from the refresh cookie.
    pub async fn start(&self) -> StartupOutcome {
        match self.refresh(None).await {
            Ok(session) => {
                debug!(username = %session.username, "Session resumed");
                StartupOutcome::Established(session)
            }
            Err(ClientError::Unauthenticated) => StartupOutcome::SignedOut,
            Err(e) => {
                warn!(error = %e, "Could not reach server at startup");
                StartupOutcome::Unavailable(e)
            }
        }
    }

    /// Create an account. Does not sign in. Returns the server's message.
    pub async fn register(&self, user: &str, pwd: &str) -> Result<String, ClientError> {
        require_credentials(user, pwd)?;

        let request = ApiRequest::post("/register", json!({ "user": user, "pwd": pwd }));
        let response = self.inner.call(&request, None).await?;
        Ok(response.json::<RegisterResponse>()?.success)
    }

    pub async fn login(&self, user: &str, pwd: &str) -> Result<Session, ClientError> {
        require_credentials(user, pwd)?;

        let request = ApiRequest::post("/auth", json!({ "user": user, "pwd": pwd }));
        let response = self.inner.call(&request, None).await.map_err(|e| match e {
            ClientError::Unauthenticated => ClientError::InvalidCredentials,
            e => e,
        })?;

        let session = session_from(&response)?;
        self.inner.session.set(session.clone()).await;
        Ok(session)
    }

    /// Revoke the refresh cookie server-side. The local session is dropped
    /// even if the server cannot be reached.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let result = self
            .inner
            .call(&ApiRequest::delete("/refresh", None), None)
            .await;
        self.inner.session.clear().await;
        result.map(|_| ())
    }

    /// Send a protected request.
    ///
    /// An authorization failure triggers one refresh and one retry. Any
    /// other failure, a failed refresh, or a second authorization failure
    /// is returned to the caller.
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError> {
        let mut attempt = Attempt::Initial;

        loop {
            let snapshot = self.inner.session.snapshot().await;
            let bearer = snapshot.session.as_ref().map(|s| s.access_token.as_str());

            debug!(?attempt, method = %request.method, path = %request.path, "Sending");
            let outcome = match self.inner.transport.execute(request, bearer).await {
                Ok(response) if response.status.is_success() => Outcome::Success(response),
                Ok(response) if response.status == reqwest::StatusCode::UNAUTHORIZED => {
                    Outcome::AuthFailure
                }
                Ok(response) => Outcome::OtherFailure(ClientError::from_response(&response)),
                Err(e) => Outcome::OtherFailure(e.into()),
            };

            match (attempt, outcome) {
                (_, Outcome::Success(response)) => return Ok(response),
                (_, Outcome::OtherFailure(e)) => {
                    debug!(?attempt, error = %e, "Request failed");
                    return Err(e);
                }
                (Attempt::Initial, Outcome::AuthFailure) => {
                    debug!(path = %request.path, "Access token rejected, refreshing");
                    self.refresh(Some(snapshot.generation)).await?;
                    attempt = Attempt::Retried;
                }
                (Attempt::Retried, Outcome::AuthFailure) => {
                    debug!(path = %request.path, "Retry rejected");
                    return Err(ClientError::Unauthenticated);
                }
            }
        }
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>, ClientError> {
        self.send(&ApiRequest::get("/jobs")).await?.json()
    }

    pub async fn create_job(&self, fields: &JobFields) -> Result<Job, ClientError> {
        self.send(&ApiRequest::post("/jobs", to_json(fields)?))
            .await?
            .json()
    }

    pub async fn update_job(&self, job: &Job) -> Result<Job, ClientError> {
        self.send(&ApiRequest::put("/jobs", to_json(job)?))
            .await?
            .json()
    }

    pub async fn delete_job(&self, id: i64) -> Result<(), ClientError> {
        self.send(&ApiRequest::delete("/jobs", Some(json!({ "id": id }))))
            .await
            .map(|_| ())
    }

    /// Exchange the refresh cookie for a new session on a task of its own.
    ///
    /// The server consumes the refresh token as soon as it sees it, so the
    /// exchange runs to completion and stores its result even if the caller
    /// is dropped mid-way. With `seen` set, the refresh is skipped when the
    /// session changed since that generation was read.
    async fn refresh(&self, seen: Option<u64>) -> Result<Session, ClientError> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.refresh(seen).await })
            .await
            .map_err(|e| ClientError::NoResponse(format!("Refresh task failed: {e}")))?
    }
}

impl<T: Transport> Shared<T> {
    /// Concurrent callers queue on the lock; the first one refreshes and the
    /// rest reuse its result.
    async fn refresh(&self, seen: Option<u64>) -> Result<Session, ClientError> {
        let _guard = self.refresh_lock.lock().await;

        if let Some(generation) = seen {
            let snapshot = self.session.snapshot().await;
            if snapshot.generation != generation {
                debug!("Session already replaced, skipping refresh");
                return snapshot.session.ok_or(ClientError::Unauthenticated);
            }
        }

        match self.call(&ApiRequest::get("/refresh"), None).await {
            Ok(response) => {
                let session = session_from(&response)?;
                self.session.set(session.clone()).await;
                Ok(session)
            }
            Err(ClientError::Unauthenticated) => {
                debug!("Refresh rejected, clearing session");
                self.session.clear().await;
                Err(ClientError::Unauthenticated)
            }
            Err(e) => Err(e),
        }
    }

    /// Send without auth handling.
    async fn call(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, ClientError> {
        let response = self.transport.execute(request, bearer).await?;
        if response.status.is_success() {
            Ok(response)
        } else {
            Err(ClientError::from_response(&response))
        }
    }
}

fn session_from(response: &ApiResponse) -> Result<Session, ClientError> {
    let tokens: TokenResponse = response.json()?;
    Ok(Session {
        username: tokens.user,
        access_token: tokens.access_token,
    })
}
