//! Route protection table.

/// Strip a single trailing slash; the empty path becomes `/`.
pub fn normalize_path(path: &str) -> &str {
    if path.is_empty() {
        return "/";
    }
    if path.len() > 1 {
        if let Some(stripped) = path.strip_suffix('/') {
            return stripped;
        }
    }
    path
}

/// One entry of the route table.
#[derive(Clone)]
pub enum PathRule {
    Exact(String),
    PrefixWildcard(String),
    Pattern(fn(&str) -> bool),
}

impl PathRule {
    /// `"/dev/admin*"` becomes a prefix rule, anything else an exact one.
    pub fn parse(rule: &str) -> Self {
        let rule = normalize_path(rule);
        match rule.strip_suffix('*') {
            Some(prefix) => PathRule::PrefixWildcard(prefix.to_string()),
            None => PathRule::Exact(rule.to_string()),
        }
    }

    /// `path` must already be normalized.
    fn matches(&self, path: &str) -> bool {
        match self {
            PathRule::Exact(rule) => path == rule,
            PathRule::PrefixWildcard(prefix) => path.starts_with(prefix.as_str()),
            PathRule::Pattern(test) => test(path),
        }
    }
}

impl std::fmt::Debug for PathRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathRule::Exact(rule) => write!(f, "Exact({rule:?})"),
            PathRule::PrefixWildcard(prefix) => write!(f, "PrefixWildcard({prefix:?})"),
            PathRule::Pattern(_) => f.write_str("Pattern(..)"),
        }
    }
}

fn matches_any(rules: &[PathRule], path: &str) -> bool {
    let path = normalize_path(path);
    rules.iter().any(|rule| rule.matches(path))
}

/// How the guard should treat a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteClass {
    pub is_api: bool,
    pub needs_auth: bool,
    pub is_public: bool,
}

impl RouteClass {
    pub fn passes_without_auth(&self) -> bool {
        !self.needs_auth || self.is_public
    }
}

/// Which paths need a session. Built once at startup.
#[derive(Debug, Clone)]
pub struct RouteTable {
    pub protected_pages: Vec<PathRule>,
    pub protected_api: Vec<PathRule>,
    pub public_pages: Vec<PathRule>,
    pub login_path: String,
    pub home_path: String,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self {
            protected_pages: ["/profile", "/orders", "/dev/admin*"]
                .into_iter()
                .map(PathRule::parse)
                .collect(),
            protected_api: vec![PathRule::parse("/api/reservations")],
            public_pages: ["/", "/login", "/register", "/verify"]
                .into_iter()
                .map(PathRule::parse)
                .collect(),
            login_path: "/login".to_string(),
            home_path: "/home".to_string(),
        }
    }
}

impl RouteTable {
    pub fn is_api(path: &str) -> bool {
        path.starts_with("/api/")
    }

    pub fn classify(&self, path: &str) -> RouteClass {
        let is_api = Self::is_api(path);
        let protected = if is_api {
            &self.protected_api
        } else {
            &self.protected_pages
        };
        RouteClass {
            is_api,
            needs_auth: matches_any(protected, path),
            is_public: matches_any(&self.public_pages, path),
        }
    }

    pub fn is_landing(&self, path: &str) -> bool {
        !Self::is_api(path) && normalize_path(path) == "/"
    }

    pub fn is_login(&self, path: &str) -> bool {
        !Self::is_api(path) && normalize_path(path) == normalize_path(&self.login_path)
    }
}
