use std::collections::VecDeque;

use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::client::HydroShare;
use crate::error::{Result, Scope};

#[derive(Debug, serde::Deserialize)]
struct Page {
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    results: Vec<Value>,
}

/// Lazy sequence of records from a paginated list endpoint.
///
/// Pages are fetched on demand. After the current page runs out, the server's `next` link
/// is followed until it is null. A clone continues independently from its own position,
/// re-fetching pages as needed.
#[derive(Debug, Clone)]
pub struct Pages<'a> {
    client: &'a HydroShare,
    pid: Option<String>,
    next: Option<String>,
    buffered: VecDeque<Value>,
    requests: usize,
    failed: bool,
}

impl<'a> Pages<'a> {
    pub(crate) fn new(client: &'a HydroShare, first: Url, pid: Option<&str>) -> Self {
        Self {
            client,
            pid: pid.map(str::to_string),
            next: Some(first.into()),
            buffered: VecDeque::new(),
            requests: 0,
            failed: false,
        }
    }

    /// Number of page requests issued so far.
    pub fn requests(&self) -> usize {
        self.requests
    }

    fn fetch(&mut self, link: String) -> Result<()> {
        let url = self.client.follow_link(&link)?;
        let scope = match self.pid.as_deref() {
            Some(pid) => Scope::resource(pid),
            None => Scope::NONE,
        };
        debug!(url = %url, page = self.requests + 1, "fetching page");
        let page: Page = self.client.get_json_url(url, scope)?;
        self.requests += 1;
        self.buffered.extend(page.results);
        self.next = page.next.filter(|n| !n.is_empty());
        Ok(())
    }
}

impl Iterator for Pages<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(v) = self.buffered.pop_front() {
                return Some(Ok(v));
            }
            if self.failed {
                return None;
            }
            let url = self.next.take()?;
            if let Err(e) = self.fetch(url) {
                self.failed = true;
                return Some(Err(e));
            }
        }
    }
}
