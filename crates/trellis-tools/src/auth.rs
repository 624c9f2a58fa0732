use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};

/// Authentication descriptor for HTTP tools.
///
/// Headers are resolved at call time, never cached at registration, so a
/// rotated secret takes effect on the next call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolAuth {
    #[default]
    None,
    ApiKey {
        key: String,
    },
    Bearer {
        token: String,
    },
    Basic {
        username: String,
        #[serde(default)]
        password: String,
    },
}

impl ToolAuth {
    /// Resolve the auth headers for one call.
    ///
    /// Values that cannot form a valid header are skipped rather than
    /// failing the call.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        match self {
            Self::None => {}
            Self::ApiKey { key } => {
                if let Ok(value) = HeaderValue::from_str(key) {
                    headers.insert(HeaderName::from_static("x-api-key"), value);
                }
            }
            Self::Bearer { token } => {
                if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                    headers.insert(AUTHORIZATION, value);
                }
            }
            Self::Basic { username, password } => {
                let credentials = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", username, password));
                if let Ok(value) = HeaderValue::from_str(&format!("Basic {}", credentials)) {
                    headers.insert(AUTHORIZATION, value);
                }
            }
        }
        headers
    }
}
