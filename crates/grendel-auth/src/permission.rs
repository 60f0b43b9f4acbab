//! Role permission matching.
//!
//! A grant is a `(method, path)` pattern. The method matches when equal
//! (case-insensitive) or `*`. The path matches when equal, or when the
//! pattern ends in `*` and the request path starts with everything before it.

/// Returns true if a single grant covers the request.
#[must_use]
pub fn grant_matches(grant_method: &str, grant_path: &str, method: &str, path: &str) -> bool {
    let method_ok = grant_method == "*" || grant_method.eq_ignore_ascii_case(method);
    if !method_ok {
        return false;
    }
    match grant_path.strip_suffix('*') {
        Some(prefix) => path.starts_with(prefix),
        None => grant_path == path,
    }
}

/// Returns true if any grant covers the request.
pub fn is_allowed<'a, I>(grants: I, method: &str, path: &str) -> bool
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    grants
        .into_iter()
        .any(|(grant_method, grant_path)| grant_matches(grant_method, grant_path, method, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_everything() {
        assert!(grant_matches("*", "*", "DELETE", "/v1/nodes"));
    }

    #[test]
    fn method_must_match() {
        assert!(grant_matches("GET", "/v1/nodes", "get", "/v1/nodes"));
        assert!(!grant_matches("GET", "/v1/nodes", "POST", "/v1/nodes"));
    }

    #[test]
    fn path_exact_or_prefix() {
        assert!(grant_matches("GET", "/v1/*", "GET", "/v1/nodes/find"));
        assert!(!grant_matches("GET", "/v1/nodes", "GET", "/v1/nodes/find"));
        assert!(!grant_matches("GET", "/v1/bmc*", "GET", "/v1/nodes"));
    }

    #[test]
    fn any_grant() {
        let grants = [("GET", "/v1/*"), ("POST", "/v1/auth/signout")];
        assert!(is_allowed(grants, "POST", "/v1/auth/signout"));
        assert!(!is_allowed(grants, "POST", "/v1/nodes"));
        assert!(!is_allowed(std::iter::empty(), "GET", "/v1/nodes"));
    }
}
