//! Application Configuration
//! Mission: Environment-driven settings with sane local defaults

use tracing::warn;
use uuid::Uuid;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub local_state_path: String,
    pub port: u16,
    pub token_secret: String,
    pub chat_base_url: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "./portfolio.db".to_string());

        let local_state_path = std::env::var("LOCAL_STATE_PATH")
            .unwrap_or_else(|_| "./portfolio_local.db".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        // Without a configured secret every restart invalidates all tokens.
        let token_secret = std::env::var("TOKEN_SECRET").unwrap_or_else(|_| {
            warn!("TOKEN_SECRET not set, using a random per-process secret");
            Uuid::new_v4().to_string()
        });

        let chat_base_url = std::env::var("CHAT_BASE_URL").ok();

        Ok(Self {
            database_path,
            local_state_path,
            port,
            token_secret,
            chat_base_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        // Only assert fields that no test environment is expected to set.
        let config = Config::from_env().unwrap();
        assert!(!config.database_path.is_empty());
        assert!(!config.token_secret.is_empty());
    }
}
