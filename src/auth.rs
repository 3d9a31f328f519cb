use std::fmt;

use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result, Scope, status_error};

/// How a client authenticates against the server.
///
/// Both variants require HTTPS; see [`crate::HydroShare::new`].
#[derive(Clone)]
pub enum Auth {
    /// HTTP Basic authentication.
    Basic { username: String, password: String },
    /// OAuth2 bearer token, either exchanged from a password grant or supplied directly.
    OAuth2(OAuth2Credentials),
}

impl Auth {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Auth::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// OAuth2 resource-owner-password grant. The token is requested once, when the client is built.
    pub fn oauth2_password(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Auth::OAuth2(OAuth2Credentials {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            grant: OAuth2Grant::Password {
                username: username.into(),
                password: password.into(),
            },
        })
    }

    /// OAuth2 with a token the caller already obtained.
    pub fn oauth2_token(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token: OAuth2Token,
    ) -> Self {
        Auth::OAuth2(OAuth2Credentials {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            grant: OAuth2Grant::Token(token),
        })
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Auth::OAuth2(c) => f.debug_tuple("OAuth2").field(c).finish(),
        }
    }
}

#[derive(Clone)]
pub struct OAuth2Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub grant: OAuth2Grant,
}

impl fmt::Debug for OAuth2Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let grant = match &self.grant {
            OAuth2Grant::Password { .. } => "password",
            OAuth2Grant::Token(_) => "token",
        };
        f.debug_struct("OAuth2Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("grant", &grant)
            .finish()
    }
}

#[derive(Clone)]
pub enum OAuth2Grant {
    Password { username: String, password: String },
    Token(OAuth2Token),
}

/// Token response of the OAuth2 token endpoint.
///
/// The library never refreshes it. Once the server starts answering
/// [`Error::NotAuthorized`], build a new client with fresh credentials.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuth2Token {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl OAuth2Token {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            expires_in: None,
            refresh_token: None,
            scope: None,
        }
    }
}

impl fmt::Debug for OAuth2Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Token")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Per-request credentials, resolved once from an [`Auth`].
#[derive(Clone, Default)]
pub(crate) enum Credentials {
    #[default]
    Anonymous,
    Basic {
        username: String,
        password: String,
    },
    Bearer(OAuth2Token),
}

impl Credentials {
    pub(crate) fn apply(&self, req: RequestBuilder) -> RequestBuilder {
        match self {
            Credentials::Anonymous => req,
            Credentials::Basic { username, password } => req.basic_auth(username, Some(password)),
            Credentials::Bearer(token) => req.bearer_auth(&token.access_token),
        }
    }

    pub(crate) fn token(&self) -> Option<&OAuth2Token> {
        match self {
            Credentials::Bearer(t) => Some(t),
            _ => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Credentials::Anonymous => "Anonymous",
            Credentials::Basic { .. } => "Basic",
            Credentials::Bearer(_) => "Bearer",
        })
    }
}

/// Turns an [`Auth`] into request credentials, exchanging a password grant at `token_url` when needed.
pub(crate) fn resolve(http: &HttpClient, auth: Option<&Auth>, token_url: &str) -> Result<Credentials> {
    let Some(auth) = auth else {
        return Ok(Credentials::Anonymous);
    };

    match auth {
        Auth::Basic { username, password } => Ok(Credentials::Basic {
            username: username.clone(),
            password: password.clone(),
        }),
        Auth::OAuth2(c) => match &c.grant {
            OAuth2Grant::Token(t) => Ok(Credentials::Bearer(t.clone())),
            OAuth2Grant::Password { username, password } => {
                let token = request_token(http, token_url, c, username, password)?;
                Ok(Credentials::Bearer(token))
            }
        },
    }
}

fn request_token(
    http: &HttpClient,
    token_url: &str,
    creds: &OAuth2Credentials,
    username: &str,
    password: &str,
) -> Result<OAuth2Token> {
    debug!(url = token_url, client_id = %creds.client_id, "requesting oauth2 token");

    let form = [
        ("grant_type", "password"),
        ("username", username),
        ("password", password),
        ("client_id", creds.client_id.as_str()),
        ("client_secret", creds.client_secret.as_str()),
    ];

    let resp = http
        .post(token_url)
        .form(&form)
        .send()
        .map_err(|source| Error::Transport {
            method: "POST".into(),
            url: token_url.to_string(),
            source,
        })?;

    let status = resp.status();
    let text = resp.text().unwrap_or_default();
    if !status.is_success() {
        // Token endpoints answer 400/401 with {"error": "invalid_grant"} for bad credentials.
        if status == reqwest::StatusCode::BAD_REQUEST && text.contains("invalid_grant") {
            return Err(Error::NotAuthorized {
                method: "POST".into(),
                url: token_url.to_string(),
            });
        }
        return Err(status_error("POST", token_url, status, &text, Scope::NONE));
    }

    serde_json::from_str(&text).map_err(|source| Error::Decode {
        url: token_url.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn header_of(creds: &Credentials) -> Option<String> {
        let http = HttpClient::new();
        let req = creds
            .apply(http.get("https://example.org/hsapi/"))
            .build()
            .unwrap();
        req.headers()
            .get(reqwest::header::AUTHORIZATION)
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[test]
    fn basic_credentials_set_basic_header() {
        let creds = Credentials::Basic {
            username: "user".into(),
            password: "pass".into(),
        };
        // base64("user:pass")
        assert_eq!(header_of(&creds).as_deref(), Some("Basic dXNlcjpwYXNz"));
    }

    #[test]
    fn bearer_credentials_set_bearer_header() {
        let creds = Credentials::Bearer(OAuth2Token::new("abc123"));
        assert_eq!(header_of(&creds).as_deref(), Some("Bearer abc123"));
    }

    #[test]
    fn anonymous_sends_no_header() {
        assert_eq!(header_of(&Credentials::Anonymous), None);
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let auth = Auth::oauth2_password("cid", "very-secret", "me", "hunter2");
        let text = format!("{auth:?}");
        assert!(!text.contains("very-secret"));
        assert!(!text.contains("hunter2"));

        let basic = format!("{:?}", Auth::basic("me", "hunter2"));
        assert!(basic.contains("me"));
        assert!(!basic.contains("hunter2"));
    }

    #[test]
    fn token_deserializes_with_defaults() {
        let t: OAuth2Token = serde_json::from_str(r#"{"access_token": "tok"}"#).unwrap();
        assert_eq!(t.token_type, "Bearer");
        assert_eq!(t.expires_in, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn password_grant_exchanges_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/o/token/"))
            .and(body_string_contains("grant_type=password"))
            .and(body_string_contains("username=me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh",
                "token_type": "Bearer",
                "expires_in": 36000,
                "refresh_token": "r",
                "scope": "read write"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/o/token/", server.uri());
        let token = tokio::task::spawn_blocking(move || {
            let http = HttpClient::new();
            let auth = Auth::oauth2_password("cid", "secret", "me", "pw");
            resolve(&http, Some(&auth), &url).map(|c| c.token().cloned())
        })
        .await
        .unwrap()
        .unwrap()
        .unwrap();

        assert_eq!(token.access_token, "fresh");
        assert_eq!(token.expires_in, Some(36000));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejected_password_grant_is_not_authorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/o/token/"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error": "invalid_grant"}"#),
            )
            .mount(&server)
            .await;

        let url = format!("{}/o/token/", server.uri());
        let err = tokio::task::spawn_blocking(move || {
            let http = HttpClient::new();
            let auth = Auth::oauth2_password("cid", "secret", "me", "wrong");
            resolve(&http, Some(&auth), &url).map(|_| ())
        })
        .await
        .unwrap()
        .unwrap_err();

        assert!(matches!(err, Error::NotAuthorized { .. }));
    }
}
