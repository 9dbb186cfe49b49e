//! Chat client configuration
//!
//! `ChatConfig` is built once at startup and handed to the session. It
//! replaces any process-wide SDK state: region, credentials, and the
//! contact-center identifiers all travel explicitly.
//!
//! ```hcl
//! region          = "us-east-1"
//! instance_id     = "8d6c1f7e-0000-0000-0000-000000000000"
//! contact_flow_id = "c2a1d0e4-0000-0000-0000-000000000000"
//! refresh_lead    = "5s"
//!
//! # Optional; AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY when omitted
//! credentials {
//!   access_key_id     = "CHAT_ACCESS_KEY_ID"
//!   secret_access_key = "CHAT_SECRET_ACCESS_KEY"
//! }
//! ```

use crate::error::{ChatError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Default subscription topic for chat events
pub const DEFAULT_CHAT_TOPIC: &str = "aws/chat";

/// Top-level chat configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Service region (e.g. `us-east-1`)
    pub region: String,

    /// Contact-center instance identifier
    pub instance_id: String,

    /// Contact flow that routes the new chat
    pub contact_flow_id: String,

    /// Credentials for the initiation call
    pub credentials: CredentialsConfig,

    /// Override for the initiation service base URL
    pub connect_endpoint: Option<String>,

    /// Override for the participant service base URL
    pub participant_endpoint: Option<String>,

    /// How long before the connection expiry the transport is refreshed
    #[serde(with = "duration_serde")]
    pub refresh_lead: Duration,

    /// Per-request timeout; `None` leaves it to the HTTP stack
    #[serde(with = "duration_serde::option")]
    pub request_timeout: Option<Duration>,

    /// Transport topic carrying chat events
    pub chat_topic: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            instance_id: String::new(),
            contact_flow_id: String::new(),
            credentials: CredentialsConfig::default(),
            connect_endpoint: None,
            participant_endpoint: None,
            refresh_lead: Duration::from_secs(5),
            request_timeout: None,
            chat_topic: DEFAULT_CHAT_TOPIC.to_string(),
        }
    }
}

impl ChatConfig {
    /// Load and validate a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let src = std::fs::read_to_string(path)
            .map_err(|e| ChatError::Config(format!("cannot read {}: {e}", path.display())))?;
        let cfg = Self::from_hcl(&src)
            .map_err(|e| ChatError::Config(format!("{} ({})", e, path.display())))?;
        Ok(cfg)
    }

    /// Parse and validate configuration from an HCL string
    pub fn from_hcl(src: &str) -> Result<Self> {
        let cfg: ChatConfig =
            hcl::from_str(src).map_err(|e| ChatError::Config(format!("parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check required fields and that credentials resolve
    pub fn validate(&self) -> Result<()> {
        if self.region.trim().is_empty() {
            return Err(ChatError::Config("region must not be empty".to_string()));
        }
        if self.instance_id.trim().is_empty() {
            return Err(ChatError::Config("instance_id must not be empty".to_string()));
        }
        if self.contact_flow_id.trim().is_empty() {
            return Err(ChatError::Config(
                "contact_flow_id must not be empty".to_string(),
            ));
        }
        if self.chat_topic.trim().is_empty() {
            return Err(ChatError::Config("chat_topic must not be empty".to_string()));
        }
        self.credentials.resolve()?;
        Ok(())
    }

    /// Base URL of the initiation service
    pub fn connect_endpoint(&self) -> String {
        self.connect_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://connect.{}.amazonaws.com", self.region))
            .trim_end_matches('/')
            .to_string()
    }

    /// Base URL of the participant service
    pub fn participant_endpoint(&self) -> String {
        self.participant_endpoint
            .clone()
            .unwrap_or_else(|| {
                format!("https://participant.connect.{}.amazonaws.com", self.region)
            })
            .trim_end_matches('/')
            .to_string()
    }
}

/// Environment variable read when `access_key_id` is omitted
pub const ACCESS_KEY_ENV: &str = "AWS_ACCESS_KEY_ID";
/// Environment variable read when `secret_access_key` is omitted
pub const SECRET_KEY_ENV: &str = "AWS_SECRET_ACCESS_KEY";
/// Environment variable read when `session_token` is omitted
pub const SESSION_TOKEN_ENV: &str = "AWS_SESSION_TOKEN";

/// Credential references as written in the config file
///
/// A set value is either the name of an environment variable or the
/// literal secret; the environment wins when the variable is set. An
/// omitted key or secret must come from the standard AWS variable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
}

impl CredentialsConfig {
    /// Resolve every reference into concrete credentials
    pub fn resolve(&self) -> Result<AwsCredentials> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve using `env` for the fallback variables of omitted fields
    pub fn resolve_with(&self, env: impl Fn(&str) -> Option<String>) -> Result<AwsCredentials> {
        let required = |configured: &Option<String>, var: &str| match configured {
            Some(reference) => resolve_credential(reference),
            None => env(var).filter(|v| !v.is_empty()).ok_or_else(|| {
                ChatError::Config(format!(
                    "no credential configured and {} is not set",
                    var
                ))
            }),
        };

        Ok(AwsCredentials {
            access_key_id: required(&self.access_key_id, ACCESS_KEY_ENV)?,
            secret_access_key: required(&self.secret_access_key, SECRET_KEY_ENV)?,
            session_token: match &self.session_token {
                Some(reference) => Some(resolve_credential(reference)?),
                None => env(SESSION_TOKEN_ENV).filter(|v| !v.is_empty()),
            },
        })
    }
}

/// Resolved signing credentials
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .field("session_token", &self.session_token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Resolve a credential reference: environment variable first, then the inline value.
pub fn resolve_credential(credential_ref: &str) -> Result<String> {
    if let Ok(val) = std::env::var(credential_ref) {
        if !val.is_empty() {
            return Ok(val);
        }
    }
    if !credential_ref.trim().is_empty() {
        return Ok(credential_ref.to_string());
    }
    Err(ChatError::Config(format!(
        "Failed to resolve credential: '{}'",
        credential_ref
    )))
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(d)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::{format_duration, parse_duration};
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
            match d {
                Some(d) => s.serialize_some(&format_duration(*d)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
            let s = Option::<String>::deserialize(d)?;
            s.map(|s| parse_duration(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }

    fn format_duration(d: Duration) -> String {
        if d.subsec_millis() == 0 {
            format!("{}s", d.as_secs())
        } else {
            format!("{}ms", d.as_millis())
        }
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, String> {
        if let Some(v) = s.strip_suffix("ms") {
            return v
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string());
        }
        if let Some(v) = s.strip_suffix('s') {
            return v
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| e.to_string());
        }
        Err(format!("unknown duration format: '{s}' (use '5s' or '500ms')"))
    }
}
