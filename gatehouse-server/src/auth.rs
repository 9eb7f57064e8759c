//! HTTP Basic authentication

use base64::{Engine, engine::general_purpose::STANDARD};
use gatehouse_core::config::Credential;
use http::HeaderMap;
use http::header::AUTHORIZATION;
use subtle::ConstantTimeEq;

/// Result of checking a request's credentials
#[derive(Debug, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Credentials matched; carries the username
    Granted(String),
    /// No `Authorization` header
    Missing,
    /// Header present but not a decodable Basic credential
    Malformed,
    /// Well-formed credentials that do not match; carries the username
    Rejected(String),
}

/// Basic authentication against a single credential pair
#[derive(Debug, Clone)]
pub struct BasicAuth {
    realm: String,
    credential: Credential,
}

impl BasicAuth {
    /// Create new Basic auth
    pub fn new(realm: impl Into<String>, credential: Credential) -> Self {
        Self {
            realm: realm.into(),
            credential,
        }
    }

    /// Value of the `WWW-Authenticate` header sent with a 401
    pub fn challenge(&self) -> String {
        let mut quoted = String::with_capacity(self.realm.len());
        for c in self.realm.chars() {
            if c == '"' || c == '\\' {
                quoted.push('\\');
            }
            quoted.push(c);
        }
        format!("Basic realm=\"{}\"", quoted)
    }

    /// Check the `Authorization` header of a request
    pub fn check(&self, headers: &HeaderMap) -> AuthOutcome {
        let Some(value) = headers.get(AUTHORIZATION) else {
            return AuthOutcome::Missing;
        };

        let Some((username, password)) = value.to_str().ok().and_then(parse_basic) else {
            return AuthOutcome::Malformed;
        };

        // Evaluate both so timing doesn't reveal which field was wrong
        let user_ok = username.as_bytes().ct_eq(self.credential.username.as_bytes());
        let pass_ok = password.as_bytes().ct_eq(self.credential.password.as_bytes());

        if bool::from(user_ok & pass_ok) {
            AuthOutcome::Granted(username)
        } else {
            AuthOutcome::Rejected(username)
        }
    }
}

/// Decode `Basic <base64(user:pass)>` into its parts.
///
/// The scheme is case-insensitive; the user-id ends at the first colon.
pub fn parse_basic(header: &str) -> Option<(String, String)> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(token.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;

    Some((username.to_string(), password.to_string()))
}

/// Encode a credential the way clients send it
pub fn encode_basic(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
}
