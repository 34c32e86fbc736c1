use serde::Deserialize;

/// Pattern that matches every value.
pub const MATCH_ALL: &str = "*";

/// Returns `true` if `value` matches the glob `pattern`.
///
/// `*` matches everything; any other pattern uses shell-style globbing (`*`, `?`,
/// `[abc]`, `{a,b}`).
pub fn glob_matches(pattern: &str, value: &str) -> bool {
    pattern == MATCH_ALL || glob_match::glob_match(pattern, value)
}

fn match_all() -> String {
    MATCH_ALL.to_owned()
}

/// A single filter rule. Omitted fields match everything.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FilterRule {
    #[serde(default = "match_all")]
    pub namespace: String,
    #[serde(default = "match_all")]
    pub pod: String,
    #[serde(default = "match_all")]
    pub container: String,
    #[serde(default = "match_all")]
    pub command: String,
}

impl FilterRule {
    fn matches_container(&self, namespace: &str, pod: &str, container: &str) -> bool {
        glob_matches(&self.namespace, namespace)
            && glob_matches(&self.pod, pod)
            && glob_matches(&self.container, container)
    }
}

/// Ordered list of filter rules selecting the containers and processes to export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Filters(Vec<FilterRule>);

impl Filters {
    pub fn new(rules: Vec<FilterRule>) -> Self {
        Self(rules)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn rules(&self) -> &[FilterRule] {
        &self.0
    }

    /// Returns `true` if any rule matches the container.
    pub fn matches_container(&self, namespace: &str, pod: &str, container: &str) -> bool {
        self.command_pattern(namespace, pod, container).is_some()
    }

    /// Returns the command pattern of the first rule matching the container.
    pub fn command_pattern(&self, namespace: &str, pod: &str, container: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|rule| rule.matches_container(namespace, pod, container))
            .map(|rule| rule.command.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(namespace: &str, pod: &str, container: &str, command: &str) -> FilterRule {
        FilterRule {
            namespace: namespace.to_owned(),
            pod: pod.to_owned(),
            container: container.to_owned(),
            command: command.to_owned(),
        }
    }

    #[test]
    fn test_glob_matches() {
        assert!(glob_matches("*", ""));
        assert!(glob_matches("*", "anything/with/slashes"));
        assert!(glob_matches("web-*", "web-0"));
        assert!(glob_matches("ngin?", "nginx"));
        assert!(glob_matches("{nginx,envoy}", "envoy"));
        assert!(!glob_matches("web-*", "db-0"));
        assert!(!glob_matches("app", "app2"));
    }

    #[test]
    fn test_matches_container_any_rule() {
        let filters = Filters::new(vec![
            rule("default", "*", "app", "*"),
            rule("kube-system", "coredns-*", "*", "coredns"),
        ]);
        assert!(filters.matches_container("default", "web-0", "app"));
        assert!(filters.matches_container("kube-system", "coredns-abc", "coredns"));
        assert!(!filters.matches_container("default", "web-0", "sidecar"));
        assert!(!filters.matches_container("other", "web-0", "app"));
    }

    #[test]
    fn test_command_pattern_first_rule_wins() {
        let filters = Filters::new(vec![
            rule("default", "*", "app", "server"),
            rule("*", "*", "*", "*"),
        ]);
        assert_eq!(filters.command_pattern("default", "p", "app"), Some("server"));
        assert_eq!(filters.command_pattern("default", "p", "other"), Some("*"));
        assert_eq!(Filters::default().command_pattern("a", "b", "c"), None);
    }

    #[test]
    fn test_rule_defaults_from_yaml() {
        let filters: Filters = serde_yaml::from_str("- namespace: default\n- container: app\n").unwrap();
        assert_eq!(filters.rules()[0], rule("default", "*", "*", "*"));
        assert_eq!(filters.rules()[1], rule("*", "*", "app", "*"));
    }
}
