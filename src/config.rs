use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::Auth;
use crate::error::{Error, Result};

pub const DEFAULT_HOST: &str = "www.hydroshare.org";

/// Construction-time options of a [`crate::HydroShare`] client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host name, without scheme or port.
    pub host: String,
    /// TCP port; `None` uses the scheme default.
    pub port: Option<u16>,
    /// Use HTTPS. Must stay `true` whenever `auth` is set.
    pub use_https: bool,
    /// Whether to verify TLS certificates.
    pub verify: bool,
    /// Per-request timeout.
    pub timeout: Duration,
    pub auth: Option<Auth>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: None,
            use_https: true,
            verify: true,
            timeout: Duration::from_secs(60),
            auth: None,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_https(mut self, use_https: bool) -> Self {
        self.use_https = use_https;
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn scheme(&self) -> &'static str {
        if self.use_https { "https" } else { "http" }
    }

    /// `scheme://host[:port]`
    pub(crate) fn origin(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{}", self.scheme(), self.host, port),
            None => format!("{}://{}", self.scheme(), self.host),
        }
    }
}

#[derive(Debug, Default)]
struct RcConfig {
    host: Option<String>,
    port: Option<String>,
    use_https: Option<String>,
    verify: Option<String>,
    username: Option<String>,
    password: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl RcConfig {
    fn slot(&mut self, key: &str) -> Option<&mut Option<String>> {
        match key {
            "host" => Some(&mut self.host),
            "port" => Some(&mut self.port),
            "use_https" => Some(&mut self.use_https),
            "verify" => Some(&mut self.verify),
            "username" => Some(&mut self.username),
            "password" => Some(&mut self.password),
            "client_id" => Some(&mut self.client_id),
            "client_secret" => Some(&mut self.client_secret),
            _ => None,
        }
    }

    /// Environment values win over anything read from the file.
    fn overlay_env(&mut self) {
        for (var, key) in [
            ("HS_HOST", "host"),
            ("HS_PORT", "port"),
            ("HS_USE_HTTPS", "use_https"),
            ("HS_VERIFY", "verify"),
            ("HS_USERNAME", "username"),
            ("HS_PASSWORD", "password"),
            ("HS_CLIENT_ID", "client_id"),
            ("HS_CLIENT_SECRET", "client_secret"),
        ] {
            if let Ok(v) = std::env::var(var) {
                if let Some(slot) = self.slot(key) {
                    *slot = Some(v);
                }
            }
        }
    }
}

pub(crate) fn load_config() -> Result<ClientConfig> {
    let explicit = std::env::var_os("HS_RC").map(PathBuf::from);
    let mut rc = match pick_rc(explicit, default_rc_paths())? {
        Some(path) => read_rc(&path)?,
        None => RcConfig::default(),
    };
    rc.overlay_env();
    build_config(rc)
}

fn build_config(rc: RcConfig) -> Result<ClientConfig> {
    let mut cfg = ClientConfig::default();

    if let Some(host) = rc.host.filter(|h| !h.is_empty()) {
        cfg.host = host;
    }
    if let Some(port) = rc.port.filter(|p| !p.is_empty()) {
        cfg.port = Some(
            port.parse::<u16>()
                .map_err(|_| Error::Config(format!("port number '{port}' is illegal")))?,
        );
    }
    if let Some(v) = rc.use_https {
        cfg.use_https = parse_bool("use_https", &v)?;
    }
    if let Some(v) = rc.verify {
        cfg.verify = parse_bool("verify", &v)?;
    }

    cfg.auth = match (rc.username, rc.password, rc.client_id, rc.client_secret) {
        (Some(u), Some(p), Some(id), Some(secret)) => Some(Auth::oauth2_password(id, secret, u, p)),
        (Some(u), Some(p), _, _) => Some(Auth::basic(u, p)),
        _ => None,
    };

    Ok(cfg)
}

fn parse_bool(key: &str, v: &str) -> Result<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("`{key}` must be a boolean, got '{other}'"))),
    }
}

fn read_rc(path: &Path) -> Result<RcConfig> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    Ok(parse_rc(&text))
}

fn parse_rc(text: &str) -> RcConfig {
    let mut cfg = RcConfig::default();

    // Support formatting where `password:` is on one line and the value is on the next line.
    let mut pending_key: Option<&str> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(pk) = pending_key.take() {
            if !line.contains(':') {
                if let Some(slot) = cfg.slot(pk) {
                    *slot = Some(strip_quotes(line).to_string());
                }
                continue;
            }
        }

        if let Some((k, v)) = line.split_once(':') {
            let k = k.trim();
            let v = strip_quotes(v.trim());
            if v.is_empty() {
                pending_key = Some(k);
            } else if let Some(slot) = cfg.slot(k) {
                *slot = Some(v.to_string());
            }
        }
    }

    cfg
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// An explicit `HS_RC` must exist; otherwise the first existing default location wins.
fn pick_rc(explicit: Option<PathBuf>, defaults: Vec<PathBuf>) -> Result<Option<PathBuf>> {
    if let Some(p) = explicit {
        if !p.is_file() {
            return Err(Error::Config(format!(
                "HS_RC points at {}, which does not exist",
                p.display()
            )));
        }
        return Ok(Some(p));
    }
    Ok(defaults.into_iter().find(|p| p.is_file()))
}

fn default_rc_paths() -> Vec<PathBuf> {
    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join(".hsrc"));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(".hsrc"));
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rc_with_comments_and_quotes() {
        let rc = parse_rc(
            "# local dev server\n\
             host: 'dev.hydroshare.local'\n\
             port: 8443\n\
             username: \"alice\"\n\
             unknown_key: ignored\n",
        );
        assert_eq!(rc.host.as_deref(), Some("dev.hydroshare.local"));
        assert_eq!(rc.port.as_deref(), Some("8443"));
        assert_eq!(rc.username.as_deref(), Some("alice"));
        assert_eq!(rc.password, None);
    }

    #[test]
    fn rc_continuation_value_line() {
        let rc = parse_rc("password:\n  \"hunter2\"\n");
        assert_eq!(rc.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn basic_auth_from_username_and_password() {
        let cfg = build_config(parse_rc("username: a\npassword: b\n")).unwrap();
        assert!(matches!(cfg.auth, Some(Auth::Basic { .. })));
        assert_eq!(cfg.host, DEFAULT_HOST);
        assert!(cfg.use_https);
    }

    #[test]
    fn oauth2_when_client_pair_present() {
        let cfg = build_config(parse_rc(
            "username: a\npassword: b\nclient_id: id\nclient_secret: s\n",
        ))
        .unwrap();
        assert!(matches!(cfg.auth, Some(Auth::OAuth2(_))));
    }

    #[test]
    fn anonymous_without_password() {
        let cfg = build_config(parse_rc("username: a\nverify: 0\nuse_https: false\n")).unwrap();
        assert!(cfg.auth.is_none());
        assert!(!cfg.verify);
        assert!(!cfg.use_https);
    }

    #[test]
    fn bad_port_is_rejected() {
        let err = build_config(parse_rc("port: 70000\n")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn read_rc_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".hsrc");
        std::fs::write(&path, "host: example.org\n").unwrap();
        let rc = read_rc(&path).unwrap();
        assert_eq!(rc.host.as_deref(), Some("example.org"));
    }

    #[test]
    fn missing_explicit_rc_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = dir.path().join("fallback.hsrc");
        std::fs::write(&fallback, "host: example.org\n").unwrap();

        let err = pick_rc(Some(dir.path().join("nope.hsrc")), vec![fallback]).unwrap_err();
        assert!(matches!(err, Error::Config(m) if m.contains("nope.hsrc")));
    }

    #[test]
    fn first_existing_default_rc_wins() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("home.hsrc");
        std::fs::write(&home, "host: example.org\n").unwrap();

        let picked = pick_rc(None, vec![dir.path().join("cwd.hsrc"), home.clone()]).unwrap();
        assert_eq!(picked, Some(home));
        assert_eq!(pick_rc(None, Vec::new()).unwrap(), None);
    }

    #[test]
    fn origin_includes_port() {
        let cfg = ClientConfig::new("localhost").with_https(false).with_port(8000);
        assert_eq!(cfg.origin(), "http://localhost:8000");
        assert_eq!(ClientConfig::default().origin(), "https://www.hydroshare.org");
    }
}
