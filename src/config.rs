use serde::Deserialize;

/// Upper bound for every `*_TTL_MINUTES` setting (one year).
pub const MAX_TTL_MINUTES: i64 = 60 * 24 * 366;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub reset_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// `None` runs the service against the in-memory user store.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub otp_ttl_minutes: i64,
    pub smtp: Option<SmtpConfig>,
    pub frontend_url: String,
    pub gemini: Option<GeminiConfig>,
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = non_empty_var("DATABASE_URL");
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET must be set"))?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "jobloop".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "jobloop-users".into()),
            ttl_minutes: int_var("JWT_TTL_MINUTES", 60 * 24),
            reset_ttl_minutes: int_var("RESET_TTL_MINUTES", 10),
        };

        let smtp = match non_empty_var("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: std::env::var("SMTP_PORT")
                    .ok()
                    .and_then(|v| v.parse::<u16>().ok())
                    .unwrap_or(587),
                username: std::env::var("SMTP_USERNAME").unwrap_or_default(),
                password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
                from: std::env::var("MAIL_FROM")
                    .unwrap_or_else(|_| "JobLoop <no-reply@jobloop.app>".into()),
            }),
            None => None,
        };

        let gemini = non_empty_var("GEMINI_API_KEY").map(|api_key| GeminiConfig {
            api_key,
            model: std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-1.5-flash".into()),
        });

        Ok(Self {
            database_url,
            jwt,
            otp_ttl_minutes: int_var("OTP_TTL_MINUTES", 5),
            smtp,
            frontend_url: std::env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".into()),
            gemini,
            cors_origins: parse_origins(&std::env::var("CORS_ORIGINS").unwrap_or_default()),
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn int_var(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|v| *v > 0)
        .map(|v| v.min(MAX_TTL_MINUTES))
        .unwrap_or(default)
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_end_matches('/'))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
