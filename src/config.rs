//! Startup configuration loaded from the environment, per the variables
//! named in the external-interfaces contract.

use std::env;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {source}")]
    Invalid {
        var: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Startup configuration. Database/message-bus DSNs and schema migration
/// are external collaborators; this crate only loads the variables its
/// core subsystems read directly.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub smpp_listen: SocketAddr,
    pub sms_char_limit: usize,
    pub sms_char_limit_utf16: usize,
    pub api_key: String,
    pub server_id: String,
    /// Opaque PSK passed through to the (external) credential cipher.
    pub encryption_key: String,
    pub mm4_smtp_host: String,
    pub mm4_smtp_port: u16,
    pub webhook_retry_count: u32,
    pub webhook_timeout_secs: u64,
    /// Bind address for the inbound carrier HTTP surface (§6). Not part of
    /// the named environment contract; a wiring-level knob for `gatewayd`.
    pub carrier_http_listen: SocketAddr,
}

impl GatewayConfig {
    const DEFAULT_SMPP_LISTEN: &'static str = "0.0.0.0:2775";
    const DEFAULT_SMS_CHAR_LIMIT: usize = 160;
    const DEFAULT_SMS_CHAR_LIMIT_UTF16: usize = 70;
    const DEFAULT_MM4_SMTP_PORT: u16 = 25;
    const DEFAULT_WEBHOOK_RETRY_COUNT: u32 = 3;
    const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 10;
    const DEFAULT_CARRIER_HTTP_LISTEN: &'static str = "0.0.0.0:8081";

    pub fn from_env() -> Result<Self, ConfigError> {
        let smpp_listen = parse_opt(
            "SMPP_LISTEN",
            Self::DEFAULT_SMPP_LISTEN.parse().expect("valid default"),
        )?;
        let sms_char_limit = parse_opt("SMS_CHAR_LIMIT", Self::DEFAULT_SMS_CHAR_LIMIT)?;
        let sms_char_limit_utf16 =
            parse_opt("SMS_CHAR_LIMIT_UTF16", Self::DEFAULT_SMS_CHAR_LIMIT_UTF16)?;
        let api_key = required("API_KEY")?;
        let server_id = required("SERVER_ID")?;
        let encryption_key = required("ENCRYPTION_KEY")?;
        let mm4_smtp_host = env::var("MM4_SMTP_HOST").unwrap_or_else(|_| "localhost".to_string());
        let mm4_smtp_port = parse_opt("MM4_SMTP_PORT", Self::DEFAULT_MM4_SMTP_PORT)?;
        let webhook_retry_count =
            parse_opt("WEBHOOK_RETRY_COUNT", Self::DEFAULT_WEBHOOK_RETRY_COUNT)?;
        let webhook_timeout_secs =
            parse_opt("WEBHOOK_TIMEOUT_SECS", Self::DEFAULT_WEBHOOK_TIMEOUT_SECS)?;
        let carrier_http_listen = parse_opt(
            "CARRIER_HTTP_LISTEN",
            Self::DEFAULT_CARRIER_HTTP_LISTEN.parse().expect("valid default"),
        )?;

        Ok(GatewayConfig {
            smpp_listen,
            sms_char_limit,
            sms_char_limit_utf16,
            api_key,
            server_id,
            encryption_key,
            mm4_smtp_host,
            mm4_smtp_port,
            webhook_retry_count,
            webhook_timeout_secs,
            carrier_http_listen,
        })
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    env::var(var).map_err(|_| ConfigError::Missing(var))
}

fn parse_opt<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(var) {
        Ok(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
            var,
            source: Box::new(e),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_opt_falls_back_to_default_when_unset() {
        env::remove_var("SMS_GATEWAY_TEST_UNSET_VAR");
        let v: usize = parse_opt("SMS_GATEWAY_TEST_UNSET_VAR", 42).unwrap();
        assert_eq!(v, 42);
    }

    #[test]
    fn parse_opt_rejects_invalid_values() {
        env::set_var("SMS_GATEWAY_TEST_BAD_VAR", "not-a-number");
        let result: Result<usize, ConfigError> = parse_opt("SMS_GATEWAY_TEST_BAD_VAR", 1);
        assert!(result.is_err());
        env::remove_var("SMS_GATEWAY_TEST_BAD_VAR");
    }
}
