//! Basic credential exchange for a bearer access token

use serde::Deserialize;

use crate::backend::build_url;
use crate::endpoint::HttpMethod;
use crate::error::EndpointError;
use crate::transport::{HttpRequest, HttpTransport};

const AUTH_FAILED_MESSAGE: &str = "Error calling the authentication url! Wrong credentials?";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

/// Credentials used against the backend's basic-auth endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl BasicCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

/// Exchange `credentials` for an access token at `<url><auth_url>`.
///
/// Any failure is returned as an `Authentication` error; callers log it and
/// continue without a token.
pub async fn authenticate(
    transport: &dyn HttpTransport,
    url: &str,
    auth_url: &str,
    credentials: &BasicCredentials,
) -> Result<String, EndpointError> {
    let target = build_url(url, auth_url).map_err(|e| EndpointError::Authentication {
        input: format!("{}{}", url, auth_url),
        message: AUTH_FAILED_MESSAGE.to_string(),
        detail: e.to_string(),
    })?;

    let failure = |detail: String| EndpointError::Authentication {
        input: target.clone(),
        message: AUTH_FAILED_MESSAGE.to_string(),
        detail,
    };

    let request = HttpRequest::new(HttpMethod::GET, target.clone())
        .with_basic_auth(&credentials.username, &credentials.password);

    let response = transport
        .execute(&request)
        .await
        .map_err(|e| failure(e.to_string()))?;

    if response.status_code != 200 {
        return Err(failure(String::new()));
    }

    let token = serde_json::from_slice::<TokenResponse>(&response.body)
        .ok()
        .and_then(|parsed| parsed.access_token)
        .unwrap_or_default();

    if token.is_empty() {
        log::warn!("Authentication at {} returned no access token", target);
    } else {
        log::info!("Authenticated at {}", target);
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_completeness() {
        assert!(BasicCredentials::new("user", "secret").is_complete());
        assert!(!BasicCredentials::new("user", "").is_complete());
        assert!(!BasicCredentials::new("", "secret").is_complete());
    }

    #[test]
    fn test_token_response_tolerates_missing_token() {
        let parsed: TokenResponse = serde_json::from_str(r#"{"user_id": "u"}"#).unwrap();
        assert_eq!(parsed.access_token, None);
    }
}
