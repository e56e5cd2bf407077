//! config/mailing_config.rs
//! Configuración del dispatcher de mailings (remitente, zona horaria, SMTP...).
//! Se pasa explícitamente a los servicios al construirlos.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono_tz::Tz;

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
}

#[derive(Debug, Clone)]
pub struct MailingConfig {
    /// Remitente, p.ej. "Mailing Service <noreply@localhost>"
    pub from: String,
    /// Zona horaria de referencia para comparar fechas de intentos
    pub timezone: Tz,
    pub tick_interval: Duration,
    pub send_timeout: Duration,
    pub scheduler_enabled: bool,
    pub smtp: SmtpConfig,
    pub database_path: String,
    pub bind_addr: String,
}

impl Default for MailingConfig {
    fn default() -> Self {
        MailingConfig {
            from: "Mailing Service <noreply@localhost>".to_string(),
            timezone: chrono_tz::Europe::Moscow,
            tick_interval: Duration::from_secs(5),
            send_timeout: Duration::from_secs(30),
            scheduler_enabled: true,
            smtp: SmtpConfig {
                host: "localhost".to_string(),
                port: 587,
                user: String::new(),
                pass: String::new(),
            },
            database_path: "data/mailing.db".to_string(),
            bind_addr: "0.0.0.0:5022".to_string(),
        }
    }
}

impl MailingConfig {
    /// Lee la configuración de variables de entorno (llamar después de `dotenv()`).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que `from_env`, con una fuente de variables arbitraria.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = MailingConfig::default();

        let timezone = match lookup("MAILING_TIMEZONE") {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|e| anyhow!("MAILING_TIMEZONE inválida '{name}': {e}"))?,
            None => defaults.timezone,
        };

        let tick_secs: u64 = parse_or(&lookup, "MAILING_TICK_SECS", 5)?;
        if tick_secs == 0 {
            return Err(anyhow!("MAILING_TICK_SECS debe ser mayor que 0"));
        }
        let send_timeout_secs: u64 = parse_or(&lookup, "MAILING_SEND_TIMEOUT_SECS", 30)?;

        Ok(MailingConfig {
            from: lookup("MAILING_FROM").unwrap_or(defaults.from),
            timezone,
            tick_interval: Duration::from_secs(tick_secs),
            send_timeout: Duration::from_secs(send_timeout_secs),
            scheduler_enabled: parse_or(&lookup, "MAILING_SCHEDULER_ENABLED", true)?,
            smtp: SmtpConfig {
                host: lookup("SMTP_HOST").unwrap_or(defaults.smtp.host),
                port: parse_or(&lookup, "SMTP_PORT", defaults.smtp.port)?,
                user: lookup("SMTP_USER").unwrap_or_default(),
                pass: lookup("SMTP_PASS").unwrap_or_default(),
            },
            database_path: lookup("DATABASE_PATH").unwrap_or(defaults.database_path),
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Valor inválido para {key}: '{raw}'")),
        None => Ok(default),
    }
}
