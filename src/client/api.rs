use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::session::{Session, SessionContext, SessionUser};
use super::ClientError;

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SignupBody {
    pub message: String,
    pub user: SessionUser,
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    token: String,
    user: SessionUser,
}

#[derive(Debug, Deserialize)]
struct ParsedResumeBody {
    #[serde(rename = "parsedResume")]
    parsed_resume: serde_json::Value,
}

/// Typed client for the `/api/auth` endpoints. Signed-in calls use the
/// bearer token held by the session context.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    session: SessionContext,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, session: SessionContext) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    async fn read<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<MessageBody>(&body)
            .map(|m| m.message)
            .unwrap_or(body);
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, ClientError> {
        let response = self.http.post(self.url(path)).json(&body).send().await?;
        Self::read(response).await
    }

    /// Attaches the token; a 401 means the server no longer accepts it.
    async fn authorized<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let token = match self.session.current().await {
            Some(s) if s.is_expired_at(OffsetDateTime::now_utc()) => {
                self.session.clear().await?;
                return Err(ClientError::SessionExpired);
            }
            Some(s) => s.token,
            None => return Err(ClientError::NotAuthenticated),
        };

        let response = req.bearer_auth(token).send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("server rejected session token; clearing session");
            self.session.clear().await?;
            return Err(ClientError::SessionExpired);
        }
        Self::read(response).await
    }

    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<SignupBody, ClientError> {
        self.post(
            "/auth/signup",
            json!({ "name": name, "email": email, "password": password }),
        )
        .await
    }

    pub async fn send_otp(&self, email: &str) -> Result<MessageBody, ClientError> {
        self.post("/auth/send-otp", json!({ "email": email })).await
    }

    pub async fn verify_otp(&self, email: &str, otp: &str) -> Result<MessageBody, ClientError> {
        self.post("/auth/verify-otp", json!({ "email": email, "otp": otp }))
            .await
    }

    /// Logs in and stores the resulting session.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ClientError> {
        let body: LoginBody = self
            .post("/auth/login", json!({ "email": email, "password": password }))
            .await?;
        let session = Session::from_token(body.token, body.user)?;
        self.session.set(session.clone()).await?;
        info!(user_id = %session.user.id, "logged in");
        Ok(session)
    }

    pub async fn me(&self) -> Result<SessionUser, ClientError> {
        self.authorized(self.http.get(self.url("/auth/me"))).await
    }

    pub async fn forget_password(&self, email: &str) -> Result<MessageBody, ClientError> {
        self.post("/auth/forget-password", json!({ "email": email }))
            .await
    }

    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<MessageBody, ClientError> {
        self.post(
            &format!("/auth/reset-password/{token}"),
            json!({ "new_password": new_password }),
        )
        .await
    }

    pub async fn parse_resume(&self, text: &str) -> Result<serde_json::Value, ClientError> {
        let body: ParsedResumeBody = self.post("/auth/parse", json!({ "text": text })).await?;
        Ok(body.parsed_resume)
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        self.session.clear().await?;
        debug!("logged out");
        Ok(())
    }
}
