use std::env;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone)]
pub struct AdminSeed {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Clone)]
pub struct Config {
    pub mongo_uri: String,
    pub database_name: String,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub bind_addr: String,
    pub frontend_origins: Vec<String>,
    pub admin_seed: Option<AdminSeed>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let jwt_ttl_hours = match env::var("JWT_TTL_HOURS") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "JWT_TTL_HOURS",
                value: raw,
            })?,
            Err(_) => 24,
        };

        let admin_seed = env::var("ADMIN_PASSWORD").ok().map(|password| AdminSeed {
            name: env::var("ADMIN_NAME").unwrap_or_else(|_| "Admin User".to_string()),
            email: env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@example.com".to_string()),
            password,
        });

        Ok(Self {
            mongo_uri: env::var("MONGO_URI").map_err(|_| ConfigError::Missing("MONGO_URI"))?,
            database_name: env::var("DATABASE_NAME").unwrap_or_else(|_| "team_collab".to_string()),
            jwt_secret: env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?,
            jwt_ttl_hours,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".to_string()),
            frontend_origins: parse_origins(
                &env::var("FRONTEND_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:5173,http://localhost:3000".to_string()),
            ),
            admin_seed,
        })
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_trimmed_and_blank_entries_dropped() {
        assert_eq!(
            parse_origins(" http://a.test , ,http://b.test"),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }
}
