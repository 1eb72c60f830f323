use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        claims::TokenKind,
        dto::{
            EmailRequest, LoginRequest, LoginResponse, MessageResponse, PublicUser,
            ResetPasswordRequest, SignupRequest, SignupResponse, VerifyOtpRequest,
        },
        extractors::AuthUser,
        jwt::{JwtKeys, TokenError},
        otp,
        password::{
            hash_password_blocking, is_strong_password, is_valid_email,
            verify_password_blocking, PASSWORD_RULES,
        },
        repo::CreateUserError,
        repo_types::NewUser,
    },
    error::{AppError, AppJson},
    mail::{self, templates},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/register", post(signup))
        .route("/auth/send-otp", post(send_otp))
        .route("/auth/verify-otp", post(verify_otp))
        .route("/auth/login", post(login))
        .route("/auth/forget-password", post(forget_password))
        .route("/auth/reset-password/:token", post(reset_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/auth/me", get(get_me))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    AppJson(mut payload): AppJson<SignupRequest>,
) -> Result<(StatusCode, Json<SignupResponse>), AppError> {
    payload.email = normalize_email(&payload.email);
    let name = payload.name.trim().to_string();

    if name.is_empty() {
        warn!("missing name");
        return Err(AppError::validation("Name is required"));
    }

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AppError::validation("Invalid email"));
    }

    if !is_strong_password(&payload.password) {
        warn!("weak password");
        return Err(AppError::validation(PASSWORD_RULES));
    }

    if state.users.find_by_email(&payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(AppError::Conflict("User already exists".into()));
    }

    let password_hash = hash_password_blocking(payload.password).await?;
    let code = otp::generate_otp();

    let user = match state
        .users
        .create(NewUser {
            name,
            email: payload.email,
            password_hash,
            otp: code.clone(),
            otp_issued_at: OffsetDateTime::now_utc(),
        })
        .await
    {
        Ok(u) => u,
        Err(CreateUserError::EmailTaken) => {
            warn!("email registered concurrently");
            return Err(AppError::Conflict("User already exists".into()));
        }
        Err(CreateUserError::Other(e)) => {
            error!(error = %e, "create user failed");
            return Err(e.into());
        }
    };

    mail::send_detached(
        state.mailer.clone(),
        user.email.clone(),
        templates::otp_email(&code, state.config.otp_ttl_minutes),
    );

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            message: "OTP sent to your email".into(),
            user: user.into(),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn send_otp(
    State(state): State<AppState>,
    AppJson(payload): AppJson<EmailRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let email = normalize_email(&payload.email);
    if !is_valid_email(&email) {
        return Err(AppError::validation("Invalid email"));
    }

    let user = state
        .users
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    if user.is_verified {
        warn!(user_id = %user.id, "otp requested for verified user");
        return Err(AppError::validation("Email already verified"));
    }

    let code = otp::generate_otp();
    state
        .users
        .set_otp(user.id, &code, OffsetDateTime::now_utc())
        .await?;

    state
        .mailer
        .send(&user.email, templates::otp_email(&code, state.config.otp_ttl_minutes))
        .await
        .map_err(|e| {
            error!(error = ?e, user_id = %user.id, "sending otp failed");
            AppError::Mail("Failed to send OTP".into())
        })?;

    info!(user_id = %user.id, "otp re-issued");
    Ok(Json(MessageResponse::new("OTP sent successfully")))
}

#[instrument(skip(state, payload))]
pub async fn verify_otp(
    State(state): State<AppState>,
    AppJson(payload): AppJson<VerifyOtpRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let email = normalize_email(&payload.email);
    let code = payload.otp.trim();

    let user = state
        .users
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    if user.is_verified {
        return Err(AppError::validation("Email already verified"));
    }

    let (stored, issued_at) = match (user.otp.as_deref(), user.otp_issued_at) {
        (Some(stored), Some(issued_at)) => (stored, issued_at),
        _ => {
            warn!(user_id = %user.id, "no pending otp");
            return Err(AppError::validation("Invalid OTP"));
        }
    };

    if !otp::is_well_formed(code) || stored != code {
        warn!(user_id = %user.id, "otp mismatch");
        return Err(AppError::validation("Invalid OTP"));
    }

    if otp::is_expired(issued_at, state.config.otp_ttl_minutes, OffsetDateTime::now_utc()) {
        warn!(user_id = %user.id, "otp expired");
        return Err(AppError::validation("OTP expired"));
    }

    if !state.users.mark_verified(user.id, code).await? {
        warn!(user_id = %user.id, "otp consumed concurrently");
        return Err(AppError::validation("Invalid OTP"));
    }

    mail::send_detached(state.mailer.clone(), user.email.clone(), templates::verified_email());

    info!(user_id = %user.id, "email verified");
    Ok(Json(MessageResponse::new("Email verified successfully")))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let email = normalize_email(&payload.email);

    let user = match state.users.find_by_email(&email).await? {
        Some(u) => u,
        None => {
            warn!(email = %email, "login unknown email");
            return Err(AppError::validation("Invalid credentials"));
        }
    };

    let ok = verify_password_blocking(payload.password, user.password_hash.clone()).await?;
    if !ok {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err(AppError::validation("Invalid credentials"));
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign_access(user.id)?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(LoginResponse {
        message: "Login successful".into(),
        token,
        user: user.into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn forget_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<EmailRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let email = normalize_email(&payload.email);

    let user = state
        .users
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign_reset(user.id)?;
    let link = templates::reset_link(&state.config.frontend_url, &token);

    state
        .mailer
        .send(
            &user.email,
            templates::reset_email(&link, state.config.jwt.reset_ttl_minutes),
        )
        .await
        .map_err(|e| {
            error!(error = ?e, user_id = %user.id, "sending reset email failed");
            AppError::Mail("Failed to send password reset email".into())
        })?;

    info!(user_id = %user.id, "password reset requested");
    Ok(Json(MessageResponse::new(
        "Password reset email sent successfully",
    )))
}

#[instrument(skip(state, token, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    AppJson(payload): AppJson<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_kind(&token, TokenKind::PasswordReset)
        .map_err(|e| {
            warn!(error = %e, "reset token rejected");
            match e {
                TokenError::Expired => AppError::validation("Token expired"),
                TokenError::Invalid | TokenError::WrongKind => {
                    AppError::validation("Invalid token")
                }
            }
        })?;

    let user = state
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    if !is_strong_password(&payload.new_password) {
        return Err(AppError::validation(PASSWORD_RULES));
    }

    let hash = hash_password_blocking(payload.new_password).await?;
    if !state.users.update_password(user.id, &hash).await? {
        return Err(AppError::not_found("User not found"));
    }

    info!(user_id = %user.id, "password updated");
    Ok(Json(MessageResponse::new("Password updated successfully")))
}

#[instrument(skip_all)]
pub async fn get_me(AuthUser(user): AuthUser) -> Json<PublicUser> {
    Json(user.into())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::{
        app::build_app,
        auth::{claims::TokenKind, jwt::JwtKeys},
        mail::RecordingMailer,
        state::AppState,
    };

    const PASSWORD: &str = "Str0ng!pass";
    const OTP_SUBJECT: &str = "Your JobLoop verification code";

    struct Harness {
        app: Router,
        state: AppState,
        mailer: Arc<RecordingMailer>,
    }

    impl Harness {
        fn new() -> Self {
            let mailer = Arc::new(RecordingMailer::default());
            let state = AppState::fake_with(mailer.clone());
            Self {
                app: build_app(state.clone()),
                state,
                mailer,
            }
        }

        async fn call(
            &self,
            method: &str,
            uri: &str,
            body: Option<Value>,
            token: Option<&str>,
        ) -> (StatusCode, Value) {
            let mut req = Request::builder().method(method).uri(uri);
            if let Some(t) = token {
                req = req.header("authorization", format!("Bearer {t}"));
            }
            let req = match body {
                Some(b) => req
                    .header("content-type", "application/json")
                    .body(Body::from(b.to_string()))
                    .unwrap(),
                None => req.body(Body::empty()).unwrap(),
            };
            let res = self.app.clone().oneshot(req).await.unwrap();
            let status = res.status();
            let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
            let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, value)
        }

        async fn signup(&self, email: &str) -> (StatusCode, Value) {
            self.call(
                "POST",
                "/api/auth/signup",
                Some(json!({ "name": "Jane", "email": email, "password": PASSWORD })),
                None,
            )
            .await
        }

        async fn stored_otp(&self, email: &str) -> String {
            self.state
                .users
                .find_by_email(email)
                .await
                .unwrap()
                .unwrap()
                .otp
                .unwrap()
        }

        async fn verified_user(&self, email: &str) -> String {
            assert_eq!(self.signup(email).await.0, StatusCode::CREATED);
            let otp = self.stored_otp(email).await;
            let (status, _) = self
                .call(
                    "POST",
                    "/api/auth/verify-otp",
                    Some(json!({ "email": email, "otp": otp })),
                    None,
                )
                .await;
            assert_eq!(status, StatusCode::OK);
            let (status, body) = self
                .call(
                    "POST",
                    "/api/auth/login",
                    Some(json!({ "email": email, "password": PASSWORD })),
                    None,
                )
                .await;
            assert_eq!(status, StatusCode::OK);
            body["token"].as_str().unwrap().to_string()
        }
    }

    #[tokio::test]
    async fn duplicate_signup_conflicts() {
        let h = Harness::new();
        let (status, body) = h.signup("jane@jobloop.app").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["is_verified"], false);
        assert!(body["user"].get("password_hash").is_none());

        let (status, body) = h.signup("  JANE@jobloop.app ").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "User already exists");
    }

    #[tokio::test]
    async fn signup_validates_input() {
        let h = Harness::new();
        let (status, _) = h
            .call(
                "POST",
                "/api/auth/signup",
                Some(json!({ "name": "Jane", "email": "nope", "password": PASSWORD })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = h
            .call(
                "POST",
                "/api/auth/register",
                Some(json!({ "username": "Jane", "email": "a@b.co", "password": "weakpass" })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("at least 8"));
    }

    #[tokio::test]
    async fn signup_stores_hash_and_emails_otp() {
        let h = Harness::new();
        h.signup("jane@jobloop.app").await;
        let user = h
            .state
            .users
            .find_by_email("jane@jobloop.app")
            .await
            .unwrap()
            .unwrap();
        assert_ne!(user.password_hash, PASSWORD);
        assert!(user.password_hash.starts_with("$argon2"));

        let otp = user.otp.unwrap();
        let email = h
            .mailer
            .wait_for("jane@jobloop.app", OTP_SUBJECT)
            .await
            .expect("otp email");
        assert!(email.text.contains(&otp));
    }

    #[tokio::test]
    async fn wrong_otp_leaves_user_unverified() {
        let h = Harness::new();
        h.signup("jane@jobloop.app").await;
        let otp = h.stored_otp("jane@jobloop.app").await;
        let wrong = if otp == "111111" { "222222" } else { "111111" };

        let (status, body) = h
            .call(
                "POST",
                "/api/auth/verify-otp",
                Some(json!({ "email": "jane@jobloop.app", "otp": wrong })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid OTP");

        let user = h.state.users.find_by_email("jane@jobloop.app").await.unwrap().unwrap();
        assert!(!user.is_verified);
        assert_eq!(user.otp.as_deref(), Some(otp.as_str()));
    }

    #[tokio::test]
    async fn correct_otp_verifies_exactly_once() {
        let h = Harness::new();
        h.signup("jane@jobloop.app").await;
        let otp = h.stored_otp("jane@jobloop.app").await;
        let body = json!({ "email": "jane@jobloop.app", "otp": otp });

        let (status, _) = h.call("POST", "/api/auth/verify-otp", Some(body.clone()), None).await;
        assert_eq!(status, StatusCode::OK);

        let user = h.state.users.find_by_email("jane@jobloop.app").await.unwrap().unwrap();
        assert!(user.is_verified);
        assert!(user.otp.is_none());

        let (status, body) = h.call("POST", "/api/auth/verify-otp", Some(body), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Email already verified");
    }

    #[tokio::test]
    async fn verify_otp_unknown_email_is_not_found() {
        let h = Harness::new();
        let (status, _) = h
            .call(
                "POST",
                "/api/auth/verify-otp",
                Some(json!({ "email": "ghost@jobloop.app", "otp": "123456" })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn send_otp_replaces_code() {
        let h = Harness::new();
        h.signup("jane@jobloop.app").await;
        let first = h.stored_otp("jane@jobloop.app").await;

        let (status, _) = h
            .call(
                "POST",
                "/api/auth/send-otp",
                Some(json!({ "email": "jane@jobloop.app" })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let second = h.stored_otp("jane@jobloop.app").await;
        let mails = h.mailer.all_to("jane@jobloop.app").await;
        assert!(mails.iter().any(|m| m.text.contains(&second)));

        if first != second {
            let (status, _) = h
                .call(
                    "POST",
                    "/api/auth/verify-otp",
                    Some(json!({ "email": "jane@jobloop.app", "otp": first })),
                    None,
                )
                .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let h = Harness::new();
        h.verified_user("jane@jobloop.app").await;
        let (status, body) = h
            .call(
                "POST",
                "/api/auth/login",
                Some(json!({ "email": "jane@jobloop.app", "password": "Wr0ng!pass" })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid credentials");

        let (status, body) = h
            .call(
                "POST",
                "/api/auth/login",
                Some(json!({ "email": "ghost@jobloop.app", "password": PASSWORD })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid credentials");
    }

    #[tokio::test]
    async fn fresh_token_is_accepted_by_me() {
        let h = Harness::new();
        let token = h.verified_user("jane@jobloop.app").await;
        let (status, body) = h.call("GET", "/api/auth/me", None, Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "jane@jobloop.app");
        assert_eq!(body["is_verified"], true);
    }

    #[tokio::test]
    async fn me_accepts_legacy_header() {
        let h = Harness::new();
        let token = h.verified_user("jane@jobloop.app").await;
        let req = Request::builder()
            .uri("/api/auth/me")
            .header("auth-token", token)
            .body(Body::empty())
            .unwrap();
        let res = h.app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn me_rejects_missing_tampered_and_expired_tokens() {
        let h = Harness::new();
        let token = h.verified_user("jane@jobloop.app").await;

        let (status, body) = h.call("GET", "/api/auth/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Access token is required");

        let tampered = format!("{token}x");
        let (status, body) = h.call("GET", "/api/auth/me", None, Some(&tampered)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid token");

        let user = h.state.users.find_by_email("jane@jobloop.app").await.unwrap().unwrap();
        let keys = JwtKeys::from(&h.state.config.jwt);
        let expired = keys
            .sign_at(
                user.id,
                TokenKind::Access,
                time::OffsetDateTime::now_utc() - time::Duration::hours(1),
            )
            .unwrap();
        let (status, body) = h.call("GET", "/api/auth/me", None, Some(&expired)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Token expired");

        let reset = keys.sign_reset(user.id).unwrap();
        let (status, _) = h.call("GET", "/api/auth/me", None, Some(&reset)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn me_rejects_unverified_and_unknown_subjects() {
        let h = Harness::new();
        h.signup("jane@jobloop.app").await;
        let user = h.state.users.find_by_email("jane@jobloop.app").await.unwrap().unwrap();
        let keys = JwtKeys::from(&h.state.config.jwt);

        let token = keys.sign_access(user.id).unwrap();
        let (status, body) = h.call("GET", "/api/auth/me", None, Some(&token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Email not verified");

        let ghost = keys.sign_access(uuid::Uuid::new_v4()).unwrap();
        let (status, body) = h.call("GET", "/api/auth/me", None, Some(&ghost)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid token - user not found");
    }

    #[tokio::test]
    async fn password_reset_flow() {
        let h = Harness::new();
        let access = h.verified_user("jane@jobloop.app").await;

        let (status, _) = h
            .call(
                "POST",
                "/api/auth/forget-password",
                Some(json!({ "email": "jane@jobloop.app" })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let email = h
            .mailer
            .wait_for("jane@jobloop.app", "Reset Password")
            .await
            .unwrap();
        let token = email
            .text
            .rsplit("/reset-password/")
            .next()
            .unwrap()
            .to_string();

        // an access token is not a reset token
        let (status, body) = h
            .call(
                "POST",
                &format!("/api/auth/reset-password/{access}"),
                Some(json!({ "new_password": "N3w!password" })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid token");

        let (status, _) = h
            .call(
                "POST",
                &format!("/api/auth/reset-password/{token}"),
                Some(json!({ "newPassword": "weak" })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = h
            .call(
                "POST",
                &format!("/api/auth/reset-password/{token}"),
                Some(json!({ "newPassword": "N3w!password" })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = h
            .call(
                "POST",
                "/api/auth/login",
                Some(json!({ "email": "jane@jobloop.app", "password": PASSWORD })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = h
            .call(
                "POST",
                "/api/auth/login",
                Some(json!({ "email": "jane@jobloop.app", "password": "N3w!password" })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn forget_password_unknown_email_is_not_found() {
        let h = Harness::new();
        let (status, _) = h
            .call(
                "POST",
                "/api/auth/forget-password",
                Some(json!({ "email": "ghost@jobloop.app" })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn expired_reset_token_is_reported() {
        let h = Harness::new();
        h.verified_user("jane@jobloop.app").await;
        let user = h.state.users.find_by_email("jane@jobloop.app").await.unwrap().unwrap();
        let keys = JwtKeys::from(&h.state.config.jwt);
        let expired = keys
            .sign_at(
                user.id,
                TokenKind::PasswordReset,
                time::OffsetDateTime::now_utc() - time::Duration::hours(1),
            )
            .unwrap();
        let (status, body) = h
            .call(
                "POST",
                &format!("/api/auth/reset-password/{expired}"),
                Some(json!({ "new_password": "N3w!password" })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Token expired");
    }

    #[tokio::test]
    async fn garbage_reset_token_is_invalid() {
        let h = Harness::new();
        let (status, body) = h
            .call(
                "POST",
                "/api/auth/reset-password/not-a-jwt",
                Some(json!({ "new_password": "N3w!password" })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid token");
    }

    #[tokio::test]
    async fn stale_otp_is_expired_and_leaves_user_unverified() {
        let h = Harness::new();
        h.signup("jane@jobloop.app").await;
        let user = h.state.users.find_by_email("jane@jobloop.app").await.unwrap().unwrap();
        let issued = time::OffsetDateTime::now_utc() - time::Duration::minutes(10);
        h.state.users.set_otp(user.id, "424242", issued).await.unwrap();

        let (status, body) = h
            .call(
                "POST",
                "/api/auth/verify-otp",
                Some(json!({ "email": "jane@jobloop.app", "otp": "424242" })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "OTP expired");

        let after = h.state.users.find_by_email("jane@jobloop.app").await.unwrap().unwrap();
        assert!(!after.is_verified);
        assert_eq!(after.otp.as_deref(), Some("424242"));
    }

    #[tokio::test]
    async fn send_otp_unknown_email_is_not_found() {
        let h = Harness::new();
        let (status, body) = h
            .call(
                "POST",
                "/api/auth/send-otp",
                Some(json!({ "email": "ghost@jobloop.app" })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "User not found");
    }

    #[tokio::test]
    async fn send_otp_to_verified_user_is_rejected() {
        let h = Harness::new();
        h.verified_user("jane@jobloop.app").await;
        let (status, body) = h
            .call(
                "POST",
                "/api/auth/send-otp",
                Some(json!({ "email": "jane@jobloop.app" })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Email already verified");
    }

    #[tokio::test]
    async fn incomplete_or_malformed_bodies_are_json_bad_requests() {
        let h = Harness::new();
        for (uri, body) in [
            ("/api/auth/login", r#"{"email":"jane@jobloop.app"}"#),
            ("/api/auth/signup", r#"{"email":"jane@jobloop.app""#),
            ("/api/auth/verify-otp", r#"{"otp":"123456"}"#),
        ] {
            let req = Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap();
            let res = h.app.clone().oneshot(req).await.unwrap();
            assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(
                res.headers()["content-type"],
                "application/json",
                "{uri}"
            );
            let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
            let v: Value = serde_json::from_slice(&bytes).unwrap();
            assert!(v["message"].is_string(), "{uri}");
        }
    }

    struct DownMailer;

    #[async_trait::async_trait]
    impl crate::mail::Mailer for DownMailer {
        async fn send(&self, _to: &str, _email: crate::mail::Email) -> anyhow::Result<()> {
            anyhow::bail!("smtp unreachable")
        }
    }

    #[tokio::test]
    async fn mail_failures_surface_as_server_errors() {
        let state = AppState::fake_with(Arc::new(DownMailer));
        let app = build_app(state.clone());

        // signup still succeeds: its OTP email is detached
        let req = Request::builder()
            .method("POST")
            .uri("/api/auth/signup")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({ "name": "Jane", "email": "jane@jobloop.app", "password": PASSWORD })
                    .to_string(),
            ))
            .unwrap();
        assert_eq!(app.clone().oneshot(req).await.unwrap().status(), StatusCode::CREATED);

        let req = Request::builder()
            .method("POST")
            .uri("/api/auth/send-otp")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "email": "jane@jobloop.app" }).to_string()))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["message"], "Failed to send OTP");
    }
}
