use crate::auth::{memory::InMemoryUserRepo, repo::PgUserRepo, repo::UserRepo};
use crate::config::AppConfig;
use crate::db;
use crate::mail::{LogMailer, Mailer, SmtpMailer};
use crate::resume::{GeminiClient, ResumeParser};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepo>,
    pub config: Arc<AppConfig>,
    pub mailer: Arc<dyn Mailer>,
    pub resume_parser: Option<Arc<dyn ResumeParser>>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let users = match &config.database_url {
            Some(url) => {
                let pool = db::connect(url).await?;
                db::migrate(&pool).await?;
                Arc::new(PgUserRepo::new(pool)) as Arc<dyn UserRepo>
            }
            None => {
                tracing::warn!("DATABASE_URL not set; users are kept in memory");
                Arc::new(InMemoryUserRepo::new()) as Arc<dyn UserRepo>
            }
        };

        let mailer = match &config.smtp {
            Some(smtp) => Arc::new(SmtpMailer::new(smtp)?) as Arc<dyn Mailer>,
            None => {
                tracing::warn!("SMTP_HOST not set; outgoing email is only logged");
                Arc::new(LogMailer) as Arc<dyn Mailer>
            }
        };

        let resume_parser = match &config.gemini {
            Some(gemini) => Some(Arc::new(GeminiClient::new(gemini)?) as Arc<dyn ResumeParser>),
            None => None,
        };

        Ok(Self::from_parts(users, config, mailer, resume_parser))
    }

    pub fn from_parts(
        users: Arc<dyn UserRepo>,
        config: Arc<AppConfig>,
        mailer: Arc<dyn Mailer>,
        resume_parser: Option<Arc<dyn ResumeParser>>,
    ) -> Self {
        Self {
            users,
            config,
            mailer,
            resume_parser,
        }
    }

    /// In-memory store, given mailer, no resume parser.
    #[cfg(test)]
    pub fn fake_with(mailer: Arc<dyn Mailer>) -> Self {
        use crate::config::JwtConfig;

        let config = Arc::new(AppConfig {
            database_url: None,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
                reset_ttl_minutes: 10,
            },
            otp_ttl_minutes: 5,
            smtp: None,
            frontend_url: "http://localhost:5173".into(),
            gemini: None,
            cors_origins: Vec::new(),
        });

        Self::from_parts(Arc::new(InMemoryUserRepo::new()), config, mailer, None)
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        Self::fake_with(Arc::new(LogMailer))
    }
}
