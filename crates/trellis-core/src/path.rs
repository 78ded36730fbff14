//! Action-path utilities and compiled route path specifications.
//!
//! Actions are normalized slash-delimited paths (`/music/play`). Route paths
//! are registered relative to their router and resolved to absolute form
//! against the router's current location with POSIX-style join semantics.
//!
//! Path specifications are classified once at registration into a closed
//! [`PathSpec`] variant rather than re-inspected on every dispatch.

use regex::Regex;

/// The distinguished "match anything" path.
pub const WILDCARD: &str = "/*";

/// Normalizes a path: ensures a leading `/`, strips the trailing `/` except
/// for the root. The wildcard `/*` passes through unchanged.
pub fn normalize(path: &str) -> String {
    if path == WILDCARD || path == "*" {
        return WILDCARD.to_string();
    }
    let trimmed = path.trim();
    let mut out = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    };
    while out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

/// Resolves `action` to absolute form against `location`.
///
/// Empty and already-absolute actions are returned unchanged (making the
/// operation idempotent for absolute inputs); relative actions are joined
/// with `location`, collapsing `.` and `..` segments.
pub fn make_absolute(action: &str, location: &str) -> String {
    if action.is_empty() || action.starts_with('/') {
        return action.to_string();
    }
    join(location, action)
}

/// POSIX-style join of a relative `path` onto an absolute `base`,
/// collapsing `.` and `..`.
pub fn join(base: &str, path: &str) -> String {
    let mut segments: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Tests whether an absolute action path corresponds to a possibly-relative
/// queried path. Used by assertion tooling, not by dispatch.
pub fn action_matches(route_action_path: &str, query_path: &str) -> bool {
    let action = normalize(route_action_path);
    if query_path.starts_with('/') {
        return action == normalize(query_path);
    }
    let query = query_path.trim_matches('/');
    action == format!("/{query}") || action.ends_with(&format!("/{query}"))
}

/// A route path specification, compiled once at registration.
#[derive(Debug, Clone)]
pub enum PathSpec {
    /// Literal path; matches exactly or as a prefix at a segment boundary.
    Exact(String),
    /// `/*`; matches any resolvable action, and plain messages so free-text
    /// fallback handlers can run.
    Wildcard,
    /// Regular expression matched against normalized free text, never
    /// against the action path.
    Pattern(Regex),
}

impl PathSpec {
    /// Parses a literal specification; `/*` (or `*`) compiles to the
    /// wildcard.
    pub fn parse(spec: &str) -> Self {
        let normalized = normalize(spec);
        if normalized == WILDCARD {
            Self::Wildcard
        } else {
            Self::Exact(normalized)
        }
    }

    /// Wraps a free-text pattern.
    pub fn pattern(regex: Regex) -> Self {
        Self::Pattern(regex)
    }

    /// Returns the absolute form of this spec's path under `location`.
    /// Wildcard and pattern specs keep the location itself as their base.
    pub fn absolute_under(&self, location: &str) -> String {
        match self {
            Self::Exact(p) if p == "/" => normalize(location),
            Self::Exact(p) => join(location, p.trim_start_matches('/')),
            Self::Wildcard | Self::Pattern(_) => normalize(location),
        }
    }

    /// Tests the spec against a resolved absolute action and the normalized
    /// event text.
    pub fn matches(&self, location: &str, action: Option<&str>, normalized_text: Option<&str>) -> bool {
        match self {
            Self::Exact(_) => {
                let Some(action) = action else { return false };
                let base = self.absolute_under(location);
                action == base || action.starts_with(&format!("{base}/"))
            }
            Self::Wildcard => action.is_some() || normalized_text.is_some(),
            Self::Pattern(re) => normalized_text.is_some_and(|t| re.is_match(t)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_adds_leading_and_strips_trailing_slash() {
        assert_eq!(normalize("music/play/"), "/music/play");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("*"), "/*");
    }

    #[test]
    fn make_absolute_is_idempotent_for_absolute_paths() {
        let once = make_absolute("/music/play", "/base");
        let twice = make_absolute(&once, "/base");
        assert_eq!(once, twice);
        assert_eq!(once, "/music/play");
    }

    #[test]
    fn relative_actions_join_against_the_location() {
        assert_eq!(make_absolute("sibling", "/parent"), "/parent/sibling");
        assert_eq!(make_absolute("../up", "/a/b"), "/a/up");
        assert_eq!(make_absolute("./here", "/a"), "/a/here");
        assert_eq!(make_absolute("", "/a"), "");
    }

    #[test]
    fn join_never_escapes_the_root() {
        assert_eq!(join("/", "../../x"), "/x");
        assert_eq!(join("/a", ".."), "/");
    }

    #[test]
    fn action_matches_handles_relative_queries() {
        assert!(action_matches("/menu/start", "start"));
        assert!(action_matches("/menu/start", "/menu/start"));
        assert!(!action_matches("/menu/start", "/start"));
        assert!(action_matches("/start", "start"));
    }

    #[test]
    fn exact_spec_matches_prefix_only_at_segment_boundary() {
        let spec = PathSpec::parse("/start");
        assert!(spec.matches("/", Some("/start"), None));
        assert!(spec.matches("/", Some("/start/deep"), None));
        assert!(!spec.matches("/", Some("/started"), None));
        assert!(!spec.matches("/", None, Some("start")));
    }

    #[test]
    fn wildcard_matches_actions_and_plain_text() {
        let spec = PathSpec::parse("/*");
        assert!(spec.matches("/", Some("/anything"), None));
        assert!(spec.matches("/", None, Some("hello")));
        assert!(!spec.matches("/", None, None));
    }

    #[test]
    fn pattern_matches_text_not_actions() {
        let spec = PathSpec::pattern(Regex::new("^hello").unwrap());
        assert!(spec.matches("/", None, Some("hello-world")));
        assert!(!spec.matches("/", Some("/hello"), None));
    }

    #[test]
    fn specs_resolve_under_a_location() {
        assert_eq!(PathSpec::parse("/start").absolute_under("/menu"), "/menu/start");
        assert_eq!(PathSpec::parse("/").absolute_under("/menu"), "/menu");
        assert_eq!(PathSpec::parse("/*").absolute_under("/menu"), "/menu");
    }
}
