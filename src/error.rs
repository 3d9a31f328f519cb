use std::path::PathBuf;

use reqwest::StatusCode;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// Credentials were supplied for a plain-HTTP endpoint.
    #[error("refusing to send credentials over an unencrypted connection to {url}; use HTTPS")]
    InsecureAuth { url: String },

    #[error("not authorized to perform {method} on {url}")]
    NotAuthorized { method: String, url: String },

    #[error("{}", not_found_message(.pid, .filename.as_deref()))]
    NotFound {
        pid: String,
        filename: Option<String>,
    },

    #[error("bag for resource '{pid}' is not ready (task {})", .task_id.as_deref().unwrap_or("unknown"))]
    BagNotReady {
        pid: String,
        task_id: Option<String>,
    },

    #[error("bag generation for resource '{pid}' failed (task {task_id})")]
    BagFailed { pid: String, task_id: String },

    #[error("received status {status} when accessing {url} with method {method}: {message}")]
    Http {
        method: String,
        url: String,
        status: StatusCode,
        message: String,
    },

    #[error("request {method} {url} failed")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("download from {url} ended after {received} of {expected} byte(s)")]
    Truncated {
        url: String,
        expected: u64,
        received: u64,
        /// Read failure that cut the body short, if any.
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("unexpected response from {url}: {message}")]
    Protocol { url: String, message: String },

    #[error("failed to decode response from {url}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("filesystem error at {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to extract archive {}", .path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

impl Error {
    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Http { status, .. } => Some(*status),
            Error::NotFound { .. } => Some(StatusCode::NOT_FOUND),
            _ => None,
        }
    }

    /// True for failures below the HTTP layer: connection, TLS, timeouts and short bodies.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport { .. } | Error::Truncated { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

fn not_found_message(pid: &str, filename: Option<&str>) -> String {
    match filename {
        Some(f) => format!("File '{f}' was not found in resource '{pid}'."),
        None => format!("Resource '{pid}' was not found."),
    }
}

/// Error payload shapes returned by the server (Django REST framework and friends).
#[derive(Debug, Default, serde::Deserialize)]
pub(crate) struct ServerErrorBody {
    #[serde(default)]
    pub(crate) detail: Option<String>,
    #[serde(default)]
    pub(crate) message: Option<String>,
    #[serde(default)]
    pub(crate) error: Option<String>,
}

const MAX_MESSAGE_LEN: usize = 512;

/// Best-effort human readable message out of an error response body.
pub(crate) fn server_message(status: StatusCode, body: &str) -> String {
    if let Ok(e) = serde_json::from_str::<ServerErrorBody>(body) {
        if let Some(m) = e.detail.or(e.message).or(e.error) {
            return m;
        }
    }

    let body = body.trim();
    if body.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("unknown status")
            .to_string();
    }
    if body.len() > MAX_MESSAGE_LEN {
        let mut end = MAX_MESSAGE_LEN;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        return format!("{}...", &body[..end]);
    }
    body.to_string()
}

/// What a request was about, so status codes can be turned into meaningful errors.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Scope<'a> {
    pub(crate) pid: Option<&'a str>,
    pub(crate) filename: Option<&'a str>,
}

impl<'a> Scope<'a> {
    pub(crate) const NONE: Scope<'static> = Scope {
        pid: None,
        filename: None,
    };

    pub(crate) fn resource(pid: &'a str) -> Self {
        Scope {
            pid: Some(pid),
            filename: None,
        }
    }

    pub(crate) fn file(pid: &'a str, filename: &'a str) -> Self {
        Scope {
            pid: Some(pid),
            filename: Some(filename),
        }
    }
}

pub(crate) fn status_error(
    method: &str,
    url: &str,
    status: StatusCode,
    body: &str,
    scope: Scope<'_>,
) -> Error {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::NotAuthorized {
            method: method.to_string(),
            url: url.to_string(),
        },
        StatusCode::NOT_FOUND if scope.pid.is_some() => Error::NotFound {
            pid: scope.pid.unwrap_or_default().to_string(),
            filename: scope.filename.map(str::to_string),
        },
        _ => Error::Http {
            method: method.to_string(),
            url: url.to_string(),
            status,
            message: server_message(status, body),
        },
    }
}
