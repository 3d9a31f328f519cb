use serde_json::Value;

use crate::error::{Error, Result};

/// Spatial coverage filter shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CoverageType {
    Box,
    Point,
}

impl CoverageType {
    fn as_str(self) -> &'static str {
        match self {
            CoverageType::Box => "box",
            CoverageType::Point => "point",
        }
    }
}

/// Filters for resource discovery (`GET /hsapi/resource/`).
///
/// Only the fields that were set end up in the query string; the server applies its own
/// defaults for everything else.
///
/// ```
/// use hsclient::ResourceFilter;
///
/// let filter = ResourceFilter::new()
///     .creator("bmiles")
///     .types(["RasterResource", "NetcdfResource"])
///     .published(true);
/// let pairs = filter.query_pairs();
/// assert_eq!(pairs[0], ("creator".to_string(), "bmiles".to_string()));
/// assert_eq!(pairs.len(), 4);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceFilter {
    creator: Option<String>,
    author: Option<String>,
    owner: Option<String>,
    user: Option<String>,
    group: Option<String>,
    from_date: Option<String>,
    to_date: Option<String>,
    types: Vec<String>,
    subject: Vec<String>,
    metadata: Option<String>,
    full_text_search: Option<String>,
    edit_permission: Option<bool>,
    published: Option<bool>,
    include_obsolete: Option<bool>,
    coverage_type: Option<CoverageType>,
    north: Option<f64>,
    south: Option<f64>,
    east: Option<f64>,
    west: Option<f64>,
    start: Option<u32>,
    count: Option<u32>,
}

macro_rules! string_filter {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $name(mut self, value: impl Into<String>) -> Self {
                self.$name = Some(value.into());
                self
            }
        )*
    };
}

impl ResourceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    string_filter! {
        /// User name of a resource creator.
        creator,
        author,
        owner,
        /// Any user with access (owner, editor, viewer, or public).
        user,
        group,
        full_text_search,
    }

    /// Resources created on or after this date (`YYYY-MM-DD`).
    pub fn from_date(mut self, date: impl Into<String>) -> Self {
        self.from_date = Some(date.into());
        self
    }

    /// Resources created before this date (`YYYY-MM-DD`), exclusive.
    pub fn to_date(mut self, date: impl Into<String>) -> Self {
        self.to_date = Some(date.into());
        self
    }

    pub fn types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types.extend(types.into_iter().map(Into::into));
        self
    }

    pub fn subjects<I, S>(mut self, subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subject.extend(subjects.into_iter().map(Into::into));
        self
    }

    /// Science metadata the resources must carry, sent as JSON.
    pub fn metadata(mut self, metadata: &Value) -> Self {
        self.metadata = Some(metadata.to_string());
        self
    }

    pub fn edit_permission(mut self, value: bool) -> Self {
        self.edit_permission = Some(value);
        self
    }

    pub fn published(mut self, value: bool) -> Self {
        self.published = Some(value);
        self
    }

    pub fn include_obsolete(mut self, value: bool) -> Self {
        self.include_obsolete = Some(value);
        self
    }

    /// Bounding box coverage filter.
    pub fn bounding_box(mut self, north: f64, south: f64, east: f64, west: f64) -> Self {
        self.coverage_type = Some(CoverageType::Box);
        self.north = Some(north);
        self.south = Some(south);
        self.east = Some(east);
        self.west = Some(west);
        self
    }

    /// Point coverage filter.
    pub fn point(mut self, north: f64, east: f64) -> Self {
        self.coverage_type = Some(CoverageType::Point);
        self.north = Some(north);
        self.east = Some(east);
        self
    }

    pub fn start(mut self, start: u32) -> Self {
        self.start = Some(start);
        self
    }

    /// Page size requested from the server.
    pub fn count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for (name, date) in [("from_date", &self.from_date), ("to_date", &self.to_date)] {
            if let Some(d) = date {
                if !is_iso_date(d) {
                    return Err(Error::Argument(format!(
                        "{name} must be formatted YYYY-MM-DD, got '{d}'"
                    )));
                }
            }
        }
        if self.types.iter().any(|t| t.trim().is_empty()) {
            return Err(Error::Argument("resource types must not be empty".into()));
        }
        if self.count == Some(0) {
            return Err(Error::Argument("count must be positive".into()));
        }
        Ok(())
    }

    /// Query string parameters, in a stable order, for the fields that were set.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        let mut push = |k: &str, v: String| out.push((k.to_string(), v));

        let strings = [
            ("creator", &self.creator),
            ("author", &self.author),
            ("owner", &self.owner),
            ("user", &self.user),
            ("group", &self.group),
            ("from_date", &self.from_date),
            ("to_date", &self.to_date),
        ];
        for (k, v) in strings {
            if let Some(v) = v.as_ref().filter(|v| !v.is_empty()) {
                push(k, v.clone());
            }
        }

        for t in &self.types {
            push("type", t.clone());
        }
        if !self.subject.is_empty() {
            push("subject", self.subject.join(","));
        }
        if let Some(m) = &self.metadata {
            push("metadata", m.clone());
        }
        if let Some(v) = self.full_text_search.as_ref().filter(|v| !v.is_empty()) {
            push("full_text_search", v.clone());
        }

        let flags = [
            ("edit_permission", self.edit_permission),
            ("published", self.published),
            ("include_obsolete", self.include_obsolete),
        ];
        for (k, v) in flags {
            if let Some(v) = v {
                push(k, v.to_string());
            }
        }

        if let Some(c) = self.coverage_type {
            push("coverage_type", c.as_str().to_string());
        }
        let coords = [
            ("north", self.north),
            ("south", self.south),
            ("east", self.east),
            ("west", self.west),
        ];
        for (k, v) in coords {
            if let Some(v) = v {
                push(k, v.to_string());
            }
        }

        if let Some(v) = self.start {
            push("start", v.to_string());
        }
        if let Some(v) = self.count {
            push("count", v.to_string());
        }

        out
    }
}

fn is_iso_date(s: &str) -> bool {
    let b = s.as_bytes();
    if b.len() != 10 || b[4] != b'-' || b[7] != b'-' {
        return false;
    }
    let digits = |r: std::ops::Range<usize>| b[r].iter().all(u8::is_ascii_digit);
    if !(digits(0..4) && digits(5..7) && digits(8..10)) {
        return false;
    }
    let month: u32 = s[5..7].parse().unwrap_or(0);
    let day: u32 = s[8..10].parse().unwrap_or(0);
    (1..=12).contains(&month) && (1..=31).contains(&day)
}
