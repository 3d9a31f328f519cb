use std::collections::BTreeSet;
use std::sync::OnceLock;
use std::time::Duration;

use reqwest::Method;
use reqwest::blocking::{Client as HttpClient, Response, multipart};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::auth::{self, Credentials, OAuth2Token};
use crate::config::{ClientConfig, load_config};
use crate::error::{Error, Result, Scope, status_error};

/// Blocking client for a HydroShare server's REST API (`/hsapi`).
///
/// Every method issues one HTTP request (a few issue more: paginated listings, bag
/// polling) and waits for the answer. A client keeps no state besides its
/// configuration, credentials and a cached list of resource types.
#[derive(Debug, Clone)]
pub struct HydroShare {
    base: Url,
    origin: String,

    poll_interval: Duration,
    wait_for_bag: bool,
    progress: bool,

    credentials: Credentials,
    resource_types: OnceLock<BTreeSet<String>>,
    http: HttpClient,
}

pub(crate) enum Body<'b> {
    Empty,
    Json(&'b Value),
    Form(Vec<(&'b str, String)>),
    Multipart(multipart::Form),
}

impl HydroShare {
    /// Creates a client from environment variables and/or a `.hsrc` file.
    ///
    /// Precedence per setting: `HS_*` environment variable, then the first rc file found at
    /// `HS_RC`, `./.hsrc` or `~/.hsrc`, then the built-in default.
    pub fn from_env() -> Result<Self> {
        Self::new(load_config()?)
    }

    /// Creates a client for the given configuration.
    ///
    /// Fails with [`Error::InsecureAuth`] if credentials are configured without HTTPS.
    /// For an OAuth2 password grant the token is requested here.
    pub fn new(cfg: ClientConfig) -> Result<Self> {
        let host = cfg.host.trim();
        if host.is_empty() || host.contains("://") || host.contains('/') {
            return Err(Error::Argument(format!(
                "host must be a bare host name, got '{}'",
                cfg.host
            )));
        }

        let origin = cfg.origin();
        if cfg.auth.is_some() && !cfg.use_https {
            return Err(Error::InsecureAuth { url: origin });
        }

        let base = Url::parse(&format!("{origin}/hsapi/"))
            .map_err(|e| Error::Argument(format!("invalid server address '{origin}': {e}")))?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("hsclient-rs/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("hsclient-rs")),
        );

        let mut builder = HttpClient::builder()
            .default_headers(default_headers)
            .timeout(cfg.timeout);

        if !cfg.verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client for {origin}: {e}")))?;

        let token_url = format!("{origin}/o/token/");
        let credentials = auth::resolve(&http, cfg.auth.as_ref(), &token_url)?;
        debug!(base = %base, credentials = ?credentials, "client ready");

        Ok(Self {
            base,
            origin,
            poll_interval: Duration::from_secs(1),
            wait_for_bag: true,
            progress: false,
            credentials,
            resource_types: OnceLock::new(),
            http,
        })
    }

    /// Fixed delay between bag status checks.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// When `false`, bag downloads fail with [`Error::BagNotReady`] instead of waiting.
    pub fn with_wait_for_bag(mut self, wait: bool) -> Self {
        self.wait_for_bag = wait;
        self
    }

    /// Show a progress bar when saving downloads to disk.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// API root, e.g. `https://www.hydroshare.org/hsapi/`.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `scheme://host[:port]` of the server.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Active OAuth2 token, if the client authenticates with one.
    ///
    /// Tokens are never refreshed by the client.
    pub fn token(&self) -> Option<&OAuth2Token> {
        self.credentials.token()
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub(crate) fn wait_for_bag(&self) -> bool {
        self.wait_for_bag
    }

    pub(crate) fn progress(&self) -> bool {
        self.progress
    }

    /// Resource types supported by the server.
    pub fn get_resource_types(&self) -> Result<BTreeSet<String>> {
        #[derive(serde::Deserialize)]
        struct ResourceType {
            resource_type: String,
        }

        let url = self.endpoint(&["resource", "types"], true)?;
        let types: Vec<ResourceType> = self.json(Method::GET, url, Body::Empty, Scope::NONE)?;
        Ok(types.into_iter().map(|t| t.resource_type).collect())
    }

    /// Resource types, fetched once per client.
    pub(crate) fn cached_resource_types(&self) -> Result<&BTreeSet<String>> {
        if let Some(types) = self.resource_types.get() {
            return Ok(types);
        }
        let types = self.get_resource_types()?;
        Ok(self.resource_types.get_or_init(|| types))
    }

    /// Profile of the authenticated user.
    pub fn get_user_info(&self) -> Result<Value> {
        let url = self.endpoint(&["userInfo"], true)?;
        self.json(Method::GET, url, Body::Empty, Scope::NONE)
    }

    /// Status of a server-side task, such as bag generation.
    pub fn get_task_status(&self, task_id: &str) -> Result<Value> {
        require("task_id", task_id)?;
        let url = self.endpoint(&["taskstatus", task_id], true)?;
        self.json(Method::GET, url, Body::Empty, Scope::NONE)
    }

    /// Builds `base/seg1/seg2[/]`. A segment containing `/` is split into several
    /// segments, so relative file paths map onto the URL path.
    pub(crate) fn endpoint(&self, segments: &[&str], trailing_slash: bool) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| Error::Argument(format!("cannot extend base url {}", self.base)))?;
            path.pop_if_empty();
            for seg in segments {
                for part in seg.split('/').filter(|s| !s.is_empty()) {
                    if part == "." || part == ".." {
                        return Err(Error::Argument(format!(
                            "path '{seg}' must not contain '.' or '..' segments"
                        )));
                    }
                    path.push(part);
                }
            }
            if trailing_slash {
                path.push("");
            }
        }
        Ok(url)
    }

    /// Resolves a pagination link from a response against the API root.
    ///
    /// Links pointing at plain HTTP are upgraded when the client speaks HTTPS. Links to any
    /// other host or port are refused.
    pub(crate) fn follow_link(&self, link: &str) -> Result<Url> {
        let mut url = self
            .base
            .join(link)
            .map_err(|e| Error::Argument(format!("invalid link '{link}' in response: {e}")))?;

        if self.base.scheme() == "https" && url.scheme() == "http" {
            url.set_scheme("https").map_err(|_| Error::Protocol {
                url: link.to_string(),
                message: "cannot switch link to https".into(),
            })?;
        }

        if url.scheme() != self.base.scheme()
            || url.host_str() != self.base.host_str()
            || url.port_or_known_default() != self.base.port_or_known_default()
        {
            return Err(Error::Protocol {
                url: link.to_string(),
                message: format!("link leaves the API origin {}", self.origin),
            });
        }
        Ok(url)
    }

    /// Sends a request and turns any non-2xx status into an error.
    pub(crate) fn execute(
        &self,
        method: Method,
        url: Url,
        body: Body<'_>,
        scope: Scope<'_>,
    ) -> Result<Response> {
        debug!(method = %method, url = %url, "request");
        let url_text = url.to_string();

        let req = self.http.request(method.clone(), url);
        let req = self.credentials.apply(req);
        let req = match body {
            Body::Empty => req,
            Body::Json(v) => req.json(v),
            Body::Form(fields) => req.form(&fields),
            Body::Multipart(form) => req.multipart(form),
        };

        let resp = req.send().map_err(|source| Error::Transport {
            method: method.to_string(),
            url: url_text.clone(),
            source,
        })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            debug!(method = %method, url = %url_text, status = status.as_u16(), "request failed");
            return Err(status_error(method.as_str(), &url_text, status, &text, scope));
        }
        Ok(resp)
    }

    pub(crate) fn json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Body<'_>,
        scope: Scope<'_>,
    ) -> Result<T> {
        let method_text = method.to_string();
        let resp = self.execute(method, url, body, scope)?;
        decode(&method_text, resp)
    }

    pub(crate) fn get_json_url<T: DeserializeOwned>(&self, url: Url, scope: Scope<'_>) -> Result<T> {
        self.json(Method::GET, url, Body::Empty, scope)
    }

    /// Raw text body, for the XML endpoints.
    pub(crate) fn text(&self, url: Url, scope: Scope<'_>) -> Result<String> {
        let resp = self.execute(Method::GET, url, Body::Empty, scope)?;
        let url = resp.url().to_string();
        resp.text().map_err(|source| Error::Transport {
            method: "GET".into(),
            url,
            source,
        })
    }
}

/// Decodes a JSON body. An empty body decodes as JSON `null`.
pub(crate) fn decode<T: DeserializeOwned>(method: &str, resp: Response) -> Result<T> {
    let url = resp.url().to_string();
    let text = resp.text().map_err(|source| Error::Transport {
        method: method.to_string(),
        url: url.clone(),
        source,
    })?;
    let text = if text.trim().is_empty() { "null" } else { text.as_str() };
    serde_json::from_str(text).map_err(|source| Error::Decode { url, source })
}

pub(crate) fn require(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Argument(format!("{name} must not be empty")));
    }
    Ok(())
}
