//! Authenticated HTTP client for the chat service
//!
//! Every remote call in the application funnels through [`ApiClient`]. One
//! request helper implements the credential contract: attach the bearer
//! token when one exists, fail fast without touching the network when an
//! authenticated call has no token, and on a 401 response invalidate the
//! shared session (at most once per rejected credential) before surfacing
//! [`ConfabError::Unauthorized`]. The client never retries and never
//! refreshes tokens; the service has no refresh protocol.

use std::time::Duration;

use reqwest::{header, Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ServerConfig;
use crate::error::{ConfabError, Result};
use crate::session::SessionHandle;

/// Whether a request must carry the bearer credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Auth {
    /// Attach `Authorization: Bearer <token>`; fail fast when absent
    Required,
    /// Never attach a credential (login, register)
    Anonymous,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Response to `POST /login`
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    /// Bearer token for subsequent authenticated calls
    pub access_token: String,
    /// Id of the authenticated user
    #[serde(deserialize_with = "wire::id_string")]
    pub user_id: String,
    /// Username of the authenticated user
    pub username: String,
}

/// Response to `GET /user`
#[derive(Debug, Deserialize)]
pub struct ProfileResponse {
    /// Server-side user id
    #[serde(deserialize_with = "wire::id_string")]
    pub id: String,
    /// Username
    pub username: String,
    /// Email address
    #[serde(default)]
    pub email: String,
}

/// Request body for `POST /get_response`
#[derive(Debug, Serialize)]
pub struct SendRequest {
    /// The user's message text
    pub message: String,
    /// Active conversation id, or `null` to start a new one server-side
    pub history_id: Option<i64>,
    /// Username of the sender
    pub username: String,
}

/// Response to `POST /get_response`
#[derive(Debug, Deserialize)]
pub struct SendResponse {
    /// The assistant's reply text
    pub response: String,
    /// Conversation id, newly assigned or echoed back
    #[serde(deserialize_with = "wire::history_id")]
    pub history_id: i64,
}

/// One user/assistant exchange inside a stored conversation
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ChatPair {
    /// The user's turn
    pub user: String,
    /// The assistant's reply
    pub ai: String,
}

/// One stored conversation in the `GET /history` listing
#[derive(Debug, Deserialize)]
pub struct HistoryEntryDto {
    /// Server-assigned conversation id
    #[serde(deserialize_with = "wire::history_id")]
    pub history_id: i64,
    /// All exchanges, chronological
    pub chat: Vec<ChatPair>,
}

#[derive(Debug, Deserialize)]
struct HistoryListResponse {
    chat_history: Vec<HistoryEntryDto>,
}

#[derive(Debug, Deserialize)]
struct ChatTranscriptResponse {
    chat: Vec<ChatPair>,
}

#[derive(Debug, Deserialize)]
struct DeleteChatResponse {
    success: bool,
}

/// Deserializers tolerating the service's loose id typing: ids arrive as
/// JSON numbers or strings depending on the endpoint.
mod wire {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    pub(super) fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(n) => n.to_string(),
            RawId::Text(s) => s,
        })
    }

    pub(super) fn history_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawId::deserialize(deserializer)? {
            RawId::Number(n) => Ok(n),
            RawId::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
        }
    }
}

// ---------------------------------------------------------------------------
// ApiClient
// ---------------------------------------------------------------------------

/// HTTP client bound to one chat service and one shared session
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use confab::client::ApiClient;
/// use confab::config::ServerConfig;
/// use confab::credentials::MemoryCredentialStore;
/// use confab::session::SessionHandle;
///
/// # fn example() -> confab::error::Result<()> {
/// let session = SessionHandle::new(Arc::new(MemoryCredentialStore::new()));
/// let client = ApiClient::new(&ServerConfig::default(), session)?;
/// # Ok(())
/// # }
/// ```
pub struct ApiClient {
    http: Client,
    base_url: String,
    session: SessionHandle,
}

impl ApiClient {
    /// Create a client for the configured service endpoint
    ///
    /// # Errors
    ///
    /// Returns [`ConfabError::Network`] if HTTP client initialization fails.
    pub fn new(config: &ServerConfig, session: SessionHandle) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("confab/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfabError::Network(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = config.api_url.trim_end_matches('/').to_string();
        tracing::info!(base_url = %base_url, "Initialized API client");

        Ok(Self {
            http,
            base_url,
            session,
        })
    }

    /// Authenticate; the only call that legitimately sees a 401 without an
    /// attached credential (mapped to a plain server error for the session
    /// manager to interpret)
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let body = serde_json::json!({ "email": email, "password": password });
        self.request(Method::POST, "/login", Auth::Anonymous, Some(body))
            .await
    }

    /// Create a new account
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<()> {
        let body = serde_json::json!({
            "username": username,
            "email": email,
            "password": password,
        });
        let _: Value = self
            .request(Method::POST, "/register", Auth::Anonymous, Some(body))
            .await?;
        Ok(())
    }

    /// Fetch the authenticated user's profile
    pub async fn fetch_profile(&self) -> Result<ProfileResponse> {
        self.request(Method::GET, "/user", Auth::Required, None)
            .await
    }

    /// Delete the authenticated user's account
    pub async fn delete_account(&self) -> Result<()> {
        let _: Value = self
            .request(Method::DELETE, "/delete_account", Auth::Required, None)
            .await?;
        Ok(())
    }

    /// Send one conversation turn and receive the assistant's reply
    pub async fn send_message(&self, request: &SendRequest) -> Result<SendResponse> {
        let body = serde_json::to_value(request)?;
        self.request(Method::POST, "/get_response", Auth::Required, Some(body))
            .await
    }

    /// List all stored conversations for the authenticated user
    pub async fn list_history(&self) -> Result<Vec<HistoryEntryDto>> {
        let response: HistoryListResponse = self
            .request(Method::GET, "/history", Auth::Required, None)
            .await?;
        Ok(response.chat_history)
    }

    /// Load the transcript of one stored conversation
    pub async fn load_chat(&self, history_id: i64) -> Result<Vec<ChatPair>> {
        let path = format!("/history/{}", history_id);
        let response: ChatTranscriptResponse = self
            .request(Method::GET, &path, Auth::Required, None)
            .await?;
        Ok(response.chat)
    }

    /// Delete one stored conversation; returns the server's confirmation flag
    pub async fn delete_chat(&self, history_id: i64) -> Result<bool> {
        let path = format!("/delete_chat/{}", history_id);
        let response: DeleteChatResponse = self
            .request(Method::DELETE, &path, Auth::Required, None)
            .await?;
        Ok(response.success)
    }

    /// Single request path implementing the credential contract
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        auth: Auth,
        body: Option<Value>,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);

        let mut builder = self.http.request(method, &url);
        if auth == Auth::Required {
            match self.session.token() {
                Some(token) => {
                    builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
                }
                None => return Err(ConfabError::AuthRequired.into()),
            }
        }
        if let Some(body) = &body {
            builder = builder.json(body);
        }

        tracing::debug!(url = %url, "Sending request");
        let response = builder.send().await.map_err(|e| {
            tracing::warn!(url = %url, "Transport failure: {}", e);
            ConfabError::Network(e.to_string())
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED && auth == Auth::Required {
            self.session.invalidate().await;
            return Err(ConfabError::Unauthorized.into());
        }

        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let message = extract_error_message(status, &body_text);
            tracing::warn!(url = %url, status = status.as_u16(), message = %message, "Request failed");
            return Err(ConfabError::Server {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        response.json::<T>().await.map_err(|e| {
            ConfabError::Server {
                status: status.as_u16(),
                message: format!("Invalid response body: {}", e),
            }
            .into()
        })
    }
}

/// Pull a human-readable message out of an error response body
///
/// The service reports failures as `{"error": ...}` or
/// `{"success": false, "message": ...}`; fall back to the raw body or the
/// status reason when neither field is present.
fn extract_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for field in ["error", "message"] {
            if let Some(message) = value.get(field).and_then(Value::as_str) {
                return message.to_string();
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}
