use super::models::app_config::AppConfig;
use super::models::app_env::Env;
use std::fs;

impl AppConfig {
    /// Загружает конфигурацию из config/{env}.toml
    pub fn new(env: &Env) -> AppConfig {
        let path = format!("config/{}.toml", env);
        let content = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("Failed to read config file {}: {}", path, e));

        AppConfig::from_toml_str(&content)
            .unwrap_or_else(|e| panic!("Failed to parse config file {}: {}", path, e))
    }

    pub fn from_toml_str(content: &str) -> Result<AppConfig, toml::de::Error> {
        toml::from_str(content)
    }
}
