use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Env {
    Local,
    Dev,
    Prod,
}

impl FromStr for Env {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Env::Local),
            "dev" => Ok(Env::Dev),
            "prod" => Ok(Env::Prod),
            other => Err(format!("Unknown environment: {}", other)),
        }
    }
}

impl fmt::Display for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Env::Local => write!(f, "local"),
            Env::Dev => write!(f, "dev"),
            Env::Prod => write!(f, "prod"),
        }
    }
}

#[derive(Debug)]
pub struct AppEnv {
    pub env: Env,
    pub server_port: u16,
    pub server_address: String,

    pub clickhouse_url: String,
    pub clickhouse_user: String,
    pub clickhouse_password: String,
    pub clickhouse_database: String,

    pub postgres_host: String,
    pub postgres_user: String,
    pub postgres_password: String,
    pub postgres_database: String,

    // Необязательные: без Redis работает in-memory кэш, без ключей - синтетический режим
    pub redis_url: Option<String>,
    pub finnhub_api_key: Option<String>,
    pub coingecko_api_key: Option<String>,
}

impl AppEnv {
    pub fn is_local(&self) -> bool {
        self.env == Env::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_from_str() {
        assert_eq!(Env::from_str("local"), Ok(Env::Local));
        assert_eq!(Env::from_str(" PROD "), Ok(Env::Prod));
        assert!(Env::from_str("staging").is_err());
    }

    #[test]
    fn test_env_display_round_trip() {
        for env in [Env::Local, Env::Dev, Env::Prod] {
            assert_eq!(Env::from_str(&env.to_string()), Ok(env));
        }
    }
}
