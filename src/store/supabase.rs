//! Hosted backend over HTTP: GoTrue for credentials, PostgREST for the
//! profiles/banks tables. Implements exactly the store contracts; schema is
//! treated as a given external surface.

use crate::config::AppConfig;
use crate::error::{AuthError, AuthResult};
use crate::model::{BankRow, ProfileRow, Session, SignupMetadata};
use crate::store::{AuthEvent, BankDirectory, CredentialStore, ProfilePatch, ProfileStore};
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Url;
use serde::Deserialize;
use tokio::sync::broadcast;

const PROFILE_SELECT: &str = "*,credit_scores(score,risk_level,created_at)";

/// `eq.` filter for a PostgREST query string, value percent-encoded.
fn eq_filter(value: &str) -> String {
    format!("eq.{}", urlencoding::encode(value))
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        Session {
            user_id: self.user.id,
            email: self.user.email.unwrap_or_default(),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
        }
    }
}

pub struct SupabaseBackend {
    base: Url,
    anon_key: String,
    client: reqwest::Client,
    session: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
}

impl SupabaseBackend {
    pub fn new(cfg: &AppConfig) -> AuthResult<Self> {
        let base = Url::parse(&cfg.supabase_url)
            .map_err(|e| AuthError::Backend(format!("invalid backend URL: {}", e)))?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AuthError::Backend(e.to_string()))?;
        let (events, _) = broadcast::channel(16);
        Ok(Self {
            base,
            anon_key: cfg.supabase_anon_key.clone(),
            client,
            session: RwLock::new(None),
            events,
        })
    }

    fn bearer(&self) -> String {
        self.session
            .read()
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.anon_key.clone())
    }

    fn headers(&self) -> AuthResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.anon_key)
                .map_err(|e| AuthError::Backend(e.to_string()))?,
        );
        headers.insert(
            reqwest::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.bearer()))
                .map_err(|e| AuthError::Backend(e.to_string()))?,
        );
        Ok(headers)
    }

    fn url(&self, path: &str) -> AuthResult<Url> {
        self.base
            .join(path)
            .map_err(|e| AuthError::Backend(e.to_string()))
    }

    fn store_session(&self, session: Session) {
        *self.session.write() = Some(session);
    }

    /// Pull the most useful message out of a GoTrue error body.
    async fn error_message(resp: reqwest::Response) -> String {
        let status = resp.status();
        let body: serde_json::Value = resp.json().await.unwrap_or(serde_json::json!({}));
        for key in ["error_description", "msg", "message"] {
            if let Some(m) = body.get(key).and_then(|v| v.as_str()) {
                return m.to_string();
            }
        }
        format!("HTTP {}", status)
    }

    async fn rest_rows<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        query: &str,
    ) -> AuthResult<Vec<T>> {
        let mut url = self.url(&format!("/rest/v1/{}", table))?;
        url.set_query(Some(query));
        let resp = self.client.get(url).headers(self.headers()?).send().await?;
        if !resp.status().is_success() {
            return Err(AuthError::Backend(format!(
                "{} query failed: HTTP {}",
                table,
                resp.status()
            )));
        }
        Ok(resp.json::<Vec<T>>().await?)
    }

    /// Active banks, name ascending, for the login form's selector.
    pub async fn active_banks(&self) -> AuthResult<Vec<BankRow>> {
        self.rest_rows("banks", "select=*&is_active=eq.true&order=name.asc")
            .await
    }
}

#[async_trait::async_trait]
impl CredentialStore for SupabaseBackend {
    async fn current_session(&self) -> AuthResult<Option<Session>> {
        Ok(self.session.read().clone())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session> {
        let url = self.url("/auth/v1/token?grant_type=password")?;
        let resp = self
            .client
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AuthError::InvalidCredentials(Self::error_message(resp).await));
        }
        let session = resp.json::<TokenResponse>().await?.into_session();
        self.store_session(session.clone());
        let _ = self.events.send(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &SignupMetadata,
    ) -> AuthResult<Session> {
        let url = self.url("/auth/v1/signup")?;
        let resp = self
            .client
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "data": metadata,
            }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AuthError::Signup(Self::error_message(resp).await));
        }
        // With auto-confirm the session comes back top-level; without it only
        // the user stub does, and password sign-in has to wait for the email.
        let body: serde_json::Value = resp.json().await?;
        let token: TokenResponse = match serde_json::from_value(body.clone()) {
            Ok(t) => t,
            Err(_) => serde_json::from_value(body.get("session").cloned().unwrap_or_default())
                .map_err(|_| AuthError::Signup("email confirmation required before sign-in".into()))?,
        };
        let session = token.into_session();
        self.store_session(session.clone());
        let _ = self.events.send(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> AuthResult<()> {
        let url = self.url("/auth/v1/logout")?;
        let resp = self.client.post(url).headers(self.headers()?).send().await?;
        *self.session.write() = None;
        let _ = self.events.send(AuthEvent::SignedOut);
        if !resp.status().is_success() {
            return Err(AuthError::Backend(format!("sign out failed: HTTP {}", resp.status())));
        }
        Ok(())
    }

    async fn refresh_session(&self) -> AuthResult<()> {
        let refresh_token = match self.session.read().as_ref() {
            Some(s) => s.refresh_token.clone(),
            None => return Ok(()),
        };
        let url = self.url("/auth/v1/token?grant_type=refresh_token")?;
        let resp = self
            .client
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AuthError::Backend(format!("refresh failed: HTTP {}", resp.status())));
        }
        let session = resp.json::<TokenResponse>().await?.into_session();
        self.store_session(session.clone());
        let _ = self.events.send(AuthEvent::TokenRefreshed(session));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[async_trait::async_trait]
impl ProfileStore for SupabaseBackend {
    async fn profile_by_id(&self, id: &str) -> AuthResult<Option<ProfileRow>> {
        let query = format!("select={}&id={}", PROFILE_SELECT, eq_filter(id));
        let rows: Vec<ProfileRow> = self.rest_rows("profiles", &query).await?;
        Ok(rows.into_iter().next())
    }

    async fn client_by_account_number(&self, account_number: &str)
        -> AuthResult<Option<ProfileRow>> {
        let query = format!(
            "select={}&account_number={}&user_type=eq.client",
            PROFILE_SELECT,
            eq_filter(account_number)
        );
        let rows: Vec<ProfileRow> = self.rest_rows("profiles", &query).await?;
        Ok(rows.into_iter().next())
    }

    async fn update_profile(&self, id: &str, patch: &ProfilePatch) -> AuthResult<usize> {
        let mut url = self.url("/rest/v1/profiles")?;
        url.set_query(Some(&format!("id={}", eq_filter(id))));
        let resp = self
            .client
            .patch(url)
            .headers(self.headers()?)
            // representation echo is how we observe the affected row count
            .header("Prefer", "return=representation")
            .json(patch)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AuthError::Backend(format!("profile update failed: HTTP {}", resp.status())));
        }
        let rows: Vec<serde_json::Value> = resp.json().await?;
        Ok(rows.len())
    }

    async fn insert_profile(
        &self,
        id: &str,
        email: &str,
        name: &str,
        patch: &ProfilePatch,
    ) -> AuthResult<()> {
        let mut body = match serde_json::to_value(patch) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        body.insert("id".into(), serde_json::Value::String(id.into()));
        body.insert("email".into(), serde_json::Value::String(email.into()));
        body.insert("name".into(), serde_json::Value::String(name.into()));

        let url = self.url("/rest/v1/profiles")?;
        let resp = self
            .client
            .post(url)
            .headers(self.headers()?)
            .header("Prefer", "return=minimal")
            .json(&serde_json::Value::Object(body))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AuthError::Backend(format!("profile insert failed: HTTP {}", resp.status())));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl BankDirectory for SupabaseBackend {
    async fn bank_id_by_name(&self, name: &str) -> AuthResult<Option<String>> {
        #[derive(Deserialize)]
        struct IdRow {
            id: String,
        }
        let query = format!("select=id&name={}", eq_filter(name));
        let rows: Vec<IdRow> = self.rest_rows("banks", &query).await?;
        Ok(rows.into_iter().next().map(|r| r.id))
    }
}
