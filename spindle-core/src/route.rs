// Route metadata declared on controller methods

use regex::Regex;
use std::fmt;

/// Verbs accepted in route declarations. `all` matches every verb.
pub const KNOWN_VERBS: [&str; 27] = [
    "all",
    "get",
    "post",
    "put",
    "delete",
    "patch",
    "options",
    "head",
    "checkout",
    "connect",
    "copy",
    "lock",
    "merge",
    "mkactivity",
    "mkcol",
    "move",
    "m-search",
    "notify",
    "propfind",
    "proppatch",
    "purge",
    "report",
    "search",
    "subscribe",
    "trace",
    "unlock",
    "unsubscribe",
];

/// Check whether `verb` (lower-case) is a known verb.
pub fn is_known_verb(verb: &str) -> bool {
    KNOWN_VERBS.contains(&verb)
}

/// Lower-case, drop unknown verbs and duplicates, keep order.
pub fn normalize_verbs<I, S>(verbs: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for verb in verbs {
        let verb = verb.as_ref().trim().to_ascii_lowercase();
        if !is_known_verb(&verb) {
            tracing::debug!(verb = %verb, "Ignoring unknown HTTP verb in route declaration");
            continue;
        }
        if !normalized.contains(&verb) {
            normalized.push(verb);
        }
    }
    normalized
}

/// Anything that can be read as a list of verbs.
pub trait IntoVerbs {
    fn into_verbs(self) -> Vec<String>;
}

impl IntoVerbs for &str {
    fn into_verbs(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoVerbs for String {
    fn into_verbs(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoVerbs for &[&str] {
    fn into_verbs(self) -> Vec<String> {
        self.iter().map(|v| v.to_string()).collect()
    }
}

impl<const N: usize> IntoVerbs for [&str; N] {
    fn into_verbs(self) -> Vec<String> {
        self.iter().map(|v| v.to_string()).collect()
    }
}

impl IntoVerbs for Vec<&str> {
    fn into_verbs(self) -> Vec<String> {
        self.into_iter().map(str::to_string).collect()
    }
}

impl IntoVerbs for Vec<String> {
    fn into_verbs(self) -> Vec<String> {
        self
    }
}

/// Path of a route: a router pattern string or a regular expression
/// matched against the whole path.
#[derive(Debug, Clone)]
pub enum RoutePath {
    Literal(String),
    Pattern(Regex),
}

impl RoutePath {
    pub fn as_str(&self) -> &str {
        match self {
            RoutePath::Literal(path) => path,
            RoutePath::Pattern(regex) => regex.as_str(),
        }
    }
}

impl PartialEq for RoutePath {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RoutePath::Literal(a), RoutePath::Literal(b)) => a == b,
            (RoutePath::Pattern(a), RoutePath::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl fmt::Display for RoutePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutePath::Literal(path) => f.write_str(path),
            RoutePath::Pattern(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

impl From<&str> for RoutePath {
    fn from(path: &str) -> Self {
        RoutePath::Literal(path.to_string())
    }
}

impl From<String> for RoutePath {
    fn from(path: String) -> Self {
        RoutePath::Literal(path)
    }
}

impl From<Regex> for RoutePath {
    fn from(regex: Regex) -> Self {
        RoutePath::Pattern(regex)
    }
}

/// Route metadata of one handler.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRecord {
    /// Lower-case known verbs; empty matches every verb.
    pub methods: Vec<String>,
    pub path: RoutePath,
    pub handler_name: String,
}

impl RouteRecord {
    pub fn matches_all_verbs(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Build a route record for `handler`.
///
/// Unknown verbs are dropped silently; an empty result matches all verbs.
pub fn define_route(
    handler: impl Into<String>,
    methods: impl IntoVerbs,
    path: impl Into<RoutePath>,
) -> RouteRecord {
    RouteRecord {
        methods: normalize_verbs(methods.into_verbs()),
        path: path.into(),
        handler_name: handler.into(),
    }
}

/// Routes of a controller in declaration order, one per handler.
#[derive(Debug, Clone, Default)]
pub struct ControllerRoutes {
    records: Vec<RouteRecord>,
}

impl ControllerRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record; a handler declared twice keeps its position and
    /// takes the latest record.
    pub fn upsert(&mut self, record: RouteRecord) {
        match self
            .records
            .iter_mut()
            .find(|existing| existing.handler_name == record.handler_name)
        {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }

    pub fn get(&self, handler: &str) -> Option<&RouteRecord> {
        self.records.iter().find(|r| r.handler_name == handler)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
