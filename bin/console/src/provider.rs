//! OAuth2-backed identity provider.
//!
//! Persists the current session to a JSON file and renews it with the
//! refresh-token grant. Authentication events are published on a local
//! broadcast channel and forwarded to subscribers.

use async_trait::async_trait;
use atelier_session::{
    AccessCredential, AuthEvent, AuthListener, Identity, IdentityId, IdentityProvider,
    ProviderError, Session, Subscription,
};
use chrono::{DateTime, Utc};
use oauth2::basic::{BasicClient, BasicErrorResponse};
use oauth2::{ClientId, ClientSecret, RefreshToken, RequestTokenError, TokenResponse, TokenUrl};
use rootcause::prelude::Report;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, instrument, warn};

use crate::config::ProviderConfig;

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Capacity of the local event channel.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Identity provider speaking OAuth2 to a remote authorization server.
pub struct HttpIdentityProvider {
    config: ProviderConfig,
    http: reqwest::Client,
    events: broadcast::Sender<AuthEvent>,
}

impl HttpIdentityProvider {
    /// Creates a provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the token URL is invalid or the HTTP client cannot
    /// be built.
    pub fn new(config: ProviderConfig) -> Result<Self, Report<ProviderError>> {
        TokenUrl::new(config.token_url.clone()).map_err(|e| ProviderError::InvalidResponse {
            reason: format!("invalid token URL: {e}"),
        })?;

        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(config.request_timeout_seconds.max(1)))
            .build()
            .map_err(|e| ProviderError::Unavailable {
                reason: format!("failed to create HTTP client: {e}"),
            })?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config,
            http,
            events,
        })
    }

    /// Signs in by redeeming a refresh token obtained out of band.
    ///
    /// # Errors
    ///
    /// Returns an error if the token endpoint rejects the token or the
    /// session cannot be persisted.
    #[instrument(skip_all)]
    pub async fn sign_in_with_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Session, Report<ProviderError>> {
        let tokens = self.refresh(refresh_token).await?;
        let identity = self.resolve_identity(&tokens.access_token).await?;
        let session = tokens.into_session(Some(refresh_token), identity, Utc::now());

        write_session(&self.config.session_file, &session)?;
        info!(identity = %session.identity().id(), "signed in");
        self.publish(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    fn publish(&self, event: AuthEvent) {
        let kind = event.kind();
        if self.events.send(event).is_err() {
            debug!(event = kind, "no subscribers for authentication event");
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<IssuedTokens, Report<ProviderError>> {
        let token_url = TokenUrl::new(self.config.token_url.clone()).map_err(|e| {
            ProviderError::InvalidResponse {
                reason: format!("invalid token URL: {e}"),
            }
        })?;

        let mut client =
            BasicClient::new(ClientId::new(self.config.client_id.clone())).set_token_uri(token_url);
        if let Some(secret) = &self.config.client_secret {
            client = client.set_client_secret(ClientSecret::new(secret.clone()));
        }

        let response = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(response) => grant_denied(&response),
                other => ProviderError::Unavailable {
                    reason: format!("refresh-token grant failed: {other}"),
                },
            })?;

        Ok(IssuedTokens {
            access_token: response.access_token().secret().clone(),
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
            expires_in: response.expires_in(),
        })
    }

    async fn resolve_identity(&self, access_token: &str) -> Result<Identity, Report<ProviderError>> {
        let Some(userinfo_url) = &self.config.userinfo_url else {
            return Ok(Identity::new(IdentityId::new(self.config.client_id.clone())));
        };

        let response = self
            .http
            .get(userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable {
                reason: format!("userinfo request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                reason: "userinfo request rejected".to_string(),
            }
            .into());
        }

        let info: UserInfo = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse {
                reason: format!("malformed userinfo response: {e}"),
            })?;
        Ok(info.into_identity())
    }

    async fn revoke(&self, revocation_url: &str, refresh_token: &str) -> Result<(), Report<ProviderError>> {
        let mut form = vec![
            ("token", refresh_token),
            ("token_type_hint", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self
            .http
            .post(revocation_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable {
                reason: format!("revocation request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                reason: "token revocation rejected".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

fn grant_denied(response: &BasicErrorResponse) -> ProviderError {
    ProviderError::Denied {
        code: response.error().to_string(),
        reason: response
            .error_description()
            .cloned()
            .unwrap_or_else(|| "no description".to_string()),
    }
}

impl std::fmt::Debug for HttpIdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpIdentityProvider")
            .field("token_url", &self.config.token_url)
            .field("client_id", &self.config.client_id)
            .field("session_file", &self.config.session_file)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    #[instrument(skip(self))]
    async fn current_session(&self) -> Result<Option<Session>, Report<ProviderError>> {
        let session = read_session(&self.config.session_file)?;
        debug!(found = session.is_some(), "loaded persisted session");
        Ok(session)
    }

    async fn subscribe(&self, listener: AuthListener) -> Result<Subscription, Report<ProviderError>> {
        let mut receiver = self.events.subscribe();
        let forwarder = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => listener(Ok(event)),
                    Err(RecvError::Lagged(skipped)) => listener(Err(ProviderError::Channel {
                        reason: format!("subscriber lagged, {skipped} events dropped"),
                    })),
                    Err(RecvError::Closed) => return,
                }
            }
        });
        Ok(Subscription::new(move || forwarder.abort()))
    }

    #[instrument(skip_all, fields(identity = %session.identity().id()))]
    async fn renew(&self, session: &Session) -> Result<Session, Report<ProviderError>> {
        let refresh_token = session
            .credential()
            .refresh_token()
            .ok_or(ProviderError::NotRenewable)?;

        let tokens = self.refresh(refresh_token).await?;
        let renewed = tokens.into_session(Some(refresh_token), session.identity().clone(), Utc::now());

        write_session(&self.config.session_file, &renewed)?;
        debug!(expires_at = %renewed.expires_at(), "session renewed");
        self.publish(AuthEvent::TokenRefreshed(renewed.clone()));
        Ok(renewed)
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), Report<ProviderError>> {
        let persisted = read_session(&self.config.session_file).unwrap_or_else(|e| {
            warn!(error = %e, "could not read persisted session before sign-out");
            None
        });

        if let (Some(url), Some(session)) = (&self.config.revocation_url, &persisted) {
            if let Some(refresh_token) = session.credential().refresh_token() {
                if let Err(e) = self.revoke(url, refresh_token).await {
                    warn!(error = %e, "token revocation failed, continuing sign-out");
                }
            }
        }

        remove_session(&self.config.session_file)?;
        info!("signed out");
        self.publish(AuthEvent::SignedOut);
        Ok(())
    }
}

/// Token endpoint output, before it becomes a session.
#[derive(Debug)]
struct IssuedTokens {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<Duration>,
}

impl IssuedTokens {
    /// Builds the superseding session. Servers that do not rotate refresh
    /// tokens omit one, in which case `previous_refresh` is kept.
    fn into_session(
        self,
        previous_refresh: Option<&str>,
        identity: Identity,
        now: DateTime<Utc>,
    ) -> Session {
        let lifetime = self.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME);
        let lifetime = chrono::Duration::from_std(lifetime).unwrap_or(chrono::Duration::MAX);
        let refresh_token = self
            .refresh_token
            .or_else(|| previous_refresh.map(str::to_string));

        Session::new(
            AccessCredential::new(self.access_token, refresh_token),
            now,
            now + lifetime,
            identity,
        )
    }
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

impl UserInfo {
    fn into_identity(self) -> Identity {
        let display_name = self.name.or(self.preferred_username);
        Identity::with_profile(IdentityId::new(self.sub), display_name, self.email)
    }
}

fn read_session(path: &Path) -> Result<Option<Session>, ProviderError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(ProviderError::Persistence {
                reason: format!("failed to read {}: {e}", path.display()),
            });
        }
    };

    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|e| ProviderError::Persistence {
            reason: format!("corrupt session file {}: {e}", path.display()),
        })
}

fn write_session(path: &Path, session: &Session) -> Result<(), ProviderError> {
    let persistence = |reason: String| ProviderError::Persistence { reason };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| persistence(e.to_string()))?;
        }
    }

    let json = serde_json::to_string_pretty(session).map_err(|e| persistence(e.to_string()))?;
    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, json).map_err(|e| persistence(e.to_string()))?;
    std::fs::rename(&temp_path, path).map_err(|e| persistence(e.to_string()))?;
    Ok(())
}

fn remove_session(path: &Path) -> Result<(), ProviderError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ProviderError::Persistence {
            reason: format!("failed to remove {}: {e}", path.display()),
        }),
    }
}
