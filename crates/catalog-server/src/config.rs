use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use catalog_api::AuthConfig;
use catalog_api::mail::SmtpSettings;
use catalog_storage::S3Settings;
use chrono::Duration;

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub auth: AuthConfig,
    pub webhook_secret_single: String,
    pub webhook_secret_subscription: String,
    pub storage_dir: PathBuf,
    pub bucket: String,
    pub public_url: String,
    /// Set when `CATALOG_S3_ENDPOINT` is; otherwise objects stay on local disk.
    pub s3: Option<S3Settings>,
    pub app_url: String,
    pub smtp: Option<SmtpSettings>,
    pub mail_from: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let jwt_secret = required_secret("CATALOG_JWT_SECRET")?;
        let mut auth = AuthConfig::new(jwt_secret);
        auth.access_ttl = Duration::minutes(number("CATALOG_JWT_ACCESS_MINUTES", 300)?);
        auth.refresh_ttl = Duration::days(number("CATALOG_JWT_REFRESH_DAYS", 30)?);
        auth.reset_ttl = Duration::minutes(number("CATALOG_JWT_RESET_MINUTES", 10)?);
        auth.verify_ttl = Duration::minutes(number("CATALOG_JWT_VERIFY_MINUTES", 10)?);

        let bucket = var_or("CATALOG_BUCKET", "catalog");
        let s3 = match optional("CATALOG_S3_ENDPOINT") {
            Some(endpoint) => Some(S3Settings {
                endpoint,
                region: var_or("CATALOG_S3_REGION", "us-east-1"),
                access_key: required("CATALOG_S3_ACCESS_KEY")?,
                secret_key: required("CATALOG_S3_SECRET_KEY")?,
                bucket: bucket.clone(),
                force_path_style: flag("CATALOG_S3_FORCE_PATH_STYLE", true)?,
                public_url: optional("CATALOG_PUBLIC_URL"),
            }),
            None => None,
        };
        let smtp = match optional("CATALOG_SMTP_HOST") {
            Some(host) => Some(SmtpSettings {
                host,
                port: number("CATALOG_SMTP_PORT", 587)?,
                username: optional("CATALOG_SMTP_USERNAME"),
                password: optional("CATALOG_SMTP_PASSWORD"),
                security: var_or("CATALOG_SMTP_SECURITY", "starttls").parse()?,
            }),
            None => None,
        };

        Ok(Self {
            host: var_or("CATALOG_HOST", "0.0.0.0"),
            port: number("CATALOG_PORT", 3000)?,
            db_path: var_or("CATALOG_DB_PATH", "catalog.db").into(),
            auth,
            webhook_secret_single: required_secret("CATALOG_WEBHOOK_SECRET_SINGLE")?,
            webhook_secret_subscription: required_secret("CATALOG_WEBHOOK_SECRET_SUBSCRIPTION")?,
            storage_dir: var_or("CATALOG_STORAGE_DIR", "./storage").into(),
            bucket,
            public_url: var_or("CATALOG_PUBLIC_URL", "http://localhost:3000/public"),
            s3,
            app_url: var_or("CATALOG_APP_URL", "http://localhost:5173"),
            smtp,
            mail_from: var_or("CATALOG_MAIL_FROM", "no-reply@localhost"),
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.into())
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn number<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(name) {
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("{} is not a valid number: {:?}", name, v)),
        None => Ok(default),
    }
}

fn flag(name: &str, default: bool) -> Result<bool> {
    match optional(name).map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if v == "1" || v == "true" => Ok(true),
        Some(v) if v == "0" || v == "false" => Ok(false),
        Some(v) => bail!("{} must be true or false, got {:?}", name, v),
        None => Ok(default),
    }
}

fn required(name: &str) -> Result<String> {
    optional(name).with_context(|| format!("{} is required", name))
}

fn required_secret(name: &str) -> Result<String> {
    let value = env::var(name).unwrap_or_default();
    if value.is_empty() || PLACEHOLDER_SECRETS.contains(&value.as_str()) {
        bail!("{} is unset or still a placeholder", name);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_secrets_are_rejected() {
        // SAFETY: test-only env mutation on a variable no other test reads.
        unsafe { env::set_var("CATALOG_TEST_SECRET", "dev-secret-change-me") };
        assert!(required_secret("CATALOG_TEST_SECRET").is_err());
        unsafe { env::set_var("CATALOG_TEST_SECRET", "a-real-secret") };
        assert_eq!(required_secret("CATALOG_TEST_SECRET").unwrap(), "a-real-secret");
        assert!(required_secret("CATALOG_TEST_SECRET_UNSET").is_err());
    }

    #[test]
    fn numbers_fall_back_and_reject_garbage() {
        assert_eq!(number::<u16>("CATALOG_TEST_PORT_UNSET", 3000).unwrap(), 3000);
        unsafe { env::set_var("CATALOG_TEST_PORT", "abc") };
        assert!(number::<u16>("CATALOG_TEST_PORT", 3000).is_err());
    }

    #[test]
    fn flags_accept_true_and_false() {
        assert!(flag("CATALOG_TEST_FLAG_UNSET", true).unwrap());
        unsafe { env::set_var("CATALOG_TEST_FLAG", "FALSE") };
        assert!(!flag("CATALOG_TEST_FLAG", true).unwrap());
        unsafe { env::set_var("CATALOG_TEST_FLAG", "maybe") };
        assert!(flag("CATALOG_TEST_FLAG", true).is_err());
    }
}
