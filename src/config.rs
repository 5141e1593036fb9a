use std::{collections::HashMap, net::SocketAddr, path::PathBuf};

/// Process configuration, resolved once at startup from the environment.
#[derive(Clone)]
pub struct Settings {
    pub bind_addr: SocketAddr,
    pub database_path: PathBuf,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub distinct_login_errors: bool,
    pub llm: Option<LlmSettings>,
    pub twilio: Option<TwilioSettings>,
}

#[derive(Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub model: String,
}

#[derive(Clone)]
pub struct TwilioSettings {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value:?}")]
    Invalid { name: &'static str, value: String },
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars().collect())
    }

    /// Build settings from a snapshot of variables. Refuses to produce a
    /// configuration without a signing secret.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            vars.get(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let bind_addr = match get("BIND_ADDR") {
            Some(value) => value.parse::<SocketAddr>().map_err(|_| ConfigError::Invalid {
                name: "BIND_ADDR",
                value,
            })?,
            None => SocketAddr::from(([127, 0, 0, 1], 5000)),
        };

        let distinct_login_errors = match get("LOGIN_DISTINCT_ERRORS") {
            Some(value) => parse_bool(&value).ok_or(ConfigError::Invalid {
                name: "LOGIN_DISTINCT_ERRORS",
                value,
            })?,
            None => false,
        };

        let llm = get("LLM_API_KEY").map(|api_key| LlmSettings {
            api_key,
            model: get("LLM_MODEL").unwrap_or_else(|| "gemini-1.5-flash".into()),
        });

        let twilio = match (
            get("TWILIO_ACCOUNT_SID"),
            get("TWILIO_AUTH_TOKEN"),
            get("TWILIO_FROM_NUMBER"),
        ) {
            (Some(account_sid), Some(auth_token), Some(from_number)) => Some(TwilioSettings {
                account_sid,
                auth_token,
                from_number,
            }),
            _ => None,
        };

        Ok(Settings {
            bind_addr,
            database_path: get("DATABASE_PATH")
                .unwrap_or_else(|| "hospital_crm.db".into())
                .into(),
            jwt_issuer: get("JWT_ISSUER").unwrap_or_else(|| "hospital-crm".into()),
            jwt_secret,
            distinct_login_errors,
            llm,
            twilio,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn missing_secret_refuses_to_start() {
        assert!(matches!(
            Settings::from_vars(vars(&[])),
            Err(ConfigError::Missing("JWT_SECRET"))
        ));
        assert!(matches!(
            Settings::from_vars(vars(&[("JWT_SECRET", "   ")])),
            Err(ConfigError::Missing("JWT_SECRET"))
        ));
    }

    #[test]
    fn defaults_apply() {
        let settings = Settings::from_vars(vars(&[("JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(settings.bind_addr, "127.0.0.1:5000".parse().unwrap());
        assert_eq!(settings.database_path, PathBuf::from("hospital_crm.db"));
        assert_eq!(settings.jwt_issuer, "hospital-crm");
        assert!(!settings.distinct_login_errors);
        assert!(settings.llm.is_none());
        assert!(settings.twilio.is_none());
    }

    #[test]
    fn twilio_needs_all_three_values() {
        let partial = Settings::from_vars(vars(&[
            ("JWT_SECRET", "s3cret"),
            ("TWILIO_ACCOUNT_SID", "AC1"),
            ("TWILIO_AUTH_TOKEN", "tok"),
        ]))
        .unwrap();
        assert!(partial.twilio.is_none());

        let full = Settings::from_vars(vars(&[
            ("JWT_SECRET", "s3cret"),
            ("TWILIO_ACCOUNT_SID", "AC1"),
            ("TWILIO_AUTH_TOKEN", "tok"),
            ("TWILIO_FROM_NUMBER", "+15550000"),
        ]))
        .unwrap();
        assert!(full.twilio.is_some());
    }

    #[test]
    fn invalid_values_are_reported() {
        let bad_addr = Settings::from_vars(vars(&[("JWT_SECRET", "s"), ("BIND_ADDR", "nowhere")]));
        assert!(matches!(
            bad_addr,
            Err(ConfigError::Invalid { name: "BIND_ADDR", .. })
        ));

        let bad_flag = Settings::from_vars(vars(&[
            ("JWT_SECRET", "s"),
            ("LOGIN_DISTINCT_ERRORS", "maybe"),
        ]));
        assert!(bad_flag.is_err());

        let on = Settings::from_vars(vars(&[("JWT_SECRET", "s"), ("LOGIN_DISTINCT_ERRORS", "TRUE")]))
            .unwrap();
        assert!(on.distinct_login_errors);
    }
}
