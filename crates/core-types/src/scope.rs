//! Configured crawl scope.

use url::Url;

/// Limits which navigated resources may produce results.
///
/// A page that wanders outside the scope is not an error; exploration simply
/// stops emitting for that branch.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default)]
pub struct Scope {
    /// Hosts results may come from. Empty means any host.
    pub include_hosts: Vec<String>,
    /// Path prefixes results must match. Empty means any path.
    pub path_prefixes: Vec<String>,
    /// Substring patterns that exclude a URL outright.
    pub exclude_patterns: Vec<String>,
}

impl Scope {
    /// Scope that admits everything; the default for ad-hoc jobs.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.include_hosts.push(host.into());
        self
    }

    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefixes.push(prefix.into());
        self
    }

    pub fn with_exclusion(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_patterns.push(pattern.into());
        self
    }

    /// Whether `url` is inside the configured scope.
    ///
    /// Unparseable URLs are treated as out of scope rather than as errors.
    pub fn includes(&self, url: &str) -> bool {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(_) => return false,
        };

        if self
            .exclude_patterns
            .iter()
            .any(|pattern| url.contains(pattern.as_str()))
        {
            return false;
        }

        if !self.include_hosts.is_empty() {
            let host = parsed.host_str().unwrap_or_default();
            if !self.include_hosts.iter().any(|allowed| allowed == host) {
                return false;
            }
        }

        if !self.path_prefixes.is_empty() {
            let path = parsed.path();
            if !self
                .path_prefixes
                .iter()
                .any(|prefix| path.starts_with(prefix.as_str()))
            {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_scope_admits_everything() {
        let scope = Scope::any();
        assert!(scope.includes("http://anything.example/path"));
    }

    #[test]
    fn host_allow_list_is_enforced() {
        let scope = Scope::any().with_host("target.example");
        assert!(scope.includes("http://target.example/login"));
        assert!(!scope.includes("http://elsewhere.example/login"));
    }

    #[test]
    fn path_prefixes_and_exclusions_apply() {
        let scope = Scope::any()
            .with_path_prefix("/app")
            .with_exclusion("logout");
        assert!(scope.includes("http://target.example/app/dashboard"));
        assert!(!scope.includes("http://target.example/other"));
        assert!(!scope.includes("http://target.example/app/logout"));
    }

    #[test]
    fn garbage_urls_are_out_of_scope() {
        assert!(!Scope::any().includes("not a url"));
    }
}
