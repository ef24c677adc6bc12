use std::str::FromStr;

use anyhow::{Result, bail};
use askama::Template;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

#[derive(Template)]
#[template(path = "reset_password.html")]
struct ResetPasswordEmail<'a> {
    link: &'a str,
}

#[derive(Template)]
#[template(path = "verify_email.html")]
struct VerifyEmail<'a> {
    link: &'a str,
}

#[derive(Template)]
#[template(path = "access.html")]
struct AccessEmail<'a> {
    email: &'a str,
    password: &'a str,
    login_url: &'a str,
}

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    StartTls,
    /// Implicit TLS, usually port 465.
    Tls,
    None,
}

impl FromStr for SmtpSecurity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "starttls" => Ok(SmtpSecurity::StartTls),
            "tls" => Ok(SmtpSecurity::Tls),
            "none" => Ok(SmtpSecurity::None),
            other => bail!("Unknown SMTP security mode: {:?}", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub security: SmtpSecurity,
}

/// Email delivery over SMTP. Without a server configured, messages are
/// dropped and only their recipient and subject are logged.
pub enum Mailer {
    Log {
        from: Mailbox,
    },
    Smtp {
        transport: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
    },
}

impl Mailer {
    pub fn log(from: &str) -> Result<Self> {
        Ok(Mailer::Log { from: from.parse()? })
    }

    pub fn smtp(settings: &SmtpSettings, from: &str) -> Result<Self> {
        let builder = match settings.security {
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)?
            }
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)?,
            SmtpSecurity::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
            }
        };
        let mut builder = builder.port(settings.port);
        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        info!(
            "SMTP relay {}:{} ({:?})",
            settings.host, settings.port, settings.security
        );
        Ok(Mailer::Smtp {
            transport: builder.build(),
            from: from.parse()?,
        })
    }

    fn from(&self) -> &Mailbox {
        match self {
            Mailer::Log { from } | Mailer::Smtp { from, .. } => from,
        }
    }

    /// Sends an HTML message. Bodies may carry tokens or passwords and are never logged.
    pub async fn send(&self, to: &str, subject: &str, html: String) -> Result<()> {
        let message = Message::builder()
            .from(self.from().clone())
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html)?;
        match self {
            Mailer::Log { .. } => {
                info!("SMTP not configured, dropped email to {}: {}", to, subject);
            }
            Mailer::Smtp { transport, .. } => {
                transport.send(message).await?;
                info!("Email sent to {}: {}", to, subject);
            }
        }
        Ok(())
    }

    pub async fn send_reset_password(&self, to: &str, app_url: &str, token: &str) -> Result<()> {
        let link = format!("{}/reset-password?token={}", app_url, token);
        let html = ResetPasswordEmail { link: &link }.render()?;
        self.send(to, "Reset password", html).await
    }

    pub async fn send_verification(&self, to: &str, app_url: &str, token: &str) -> Result<()> {
        let link = format!("{}/verify-email?token={}", app_url, token);
        let html = VerifyEmail { link: &link }.render()?;
        self.send(to, "Email Verification", html).await
    }

    /// Sent to buyers whose account was created by a purchase.
    pub async fn send_access(&self, to: &str, app_url: &str, password: &str) -> Result<()> {
        let login_url = format!("{}/login", app_url);
        let html = AccessEmail {
            email: to,
            password,
            login_url: &login_url,
        }
        .render()?;
        self.send(to, "Your access details", html).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        let mailer = Mailer::log("noreply@example.com").unwrap();
        mailer
            .send_reset_password("ana@example.com", "http://app", "tok")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn bad_recipient_is_an_error() {
        let mailer = Mailer::log("noreply@example.com").unwrap();
        assert!(mailer.send("not an address", "Hi", String::new()).await.is_err());
    }

    #[test]
    fn templates_carry_links_and_credentials() {
        let html = ResetPasswordEmail {
            link: "http://app/reset-password?token=abc.def",
        }
        .render()
        .unwrap();
        assert!(html.contains("http://app/reset-password?token=abc.def"));

        let html = AccessEmail {
            email: "ana@example.com",
            password: "Xy12<b>",
            login_url: "http://app/login",
        }
        .render()
        .unwrap();
        assert!(html.contains("ana@example.com"));
        assert!(html.contains("Xy12&lt;b&gt;"));
    }

    #[tokio::test]
    async fn smtp_settings() {
        assert_eq!("STARTTLS".parse::<SmtpSecurity>().unwrap(), SmtpSecurity::StartTls);
        assert_eq!("tls".parse::<SmtpSecurity>().unwrap(), SmtpSecurity::Tls);
        assert!("ssl3".parse::<SmtpSecurity>().is_err());

        let settings = SmtpSettings {
            host: "smtp.example.com".into(),
            port: 587,
            username: Some("user".into()),
            password: Some("pass".into()),
            security: SmtpSecurity::StartTls,
        };
        let mailer = Mailer::smtp(&settings, "Catalog <noreply@example.com>").unwrap();
        assert!(matches!(mailer, Mailer::Smtp { .. }));
        assert_eq!(mailer.from().email.to_string(), "noreply@example.com");
    }
}
