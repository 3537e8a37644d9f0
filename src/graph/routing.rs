//! Listener routing
//!
//! Rules are evaluated in ascending priority order and the first matching
//! path pattern wins; unmatched traffic goes to the listener's single
//! default target. Patterns are case-sensitive globs where `*` matches any
//! run of characters and `?` matches exactly one.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use super::{ResourceId, ResourceSpec, StackGraph};
use crate::error::GraphValidationError;

/// Lowest rule priority accepted by the target platform
pub const MIN_PRIORITY: u32 = 1;
/// Highest rule priority accepted by the target platform
pub const MAX_PRIORITY: u32 = 50_000;
/// Maximum length of one path pattern
pub const MAX_PATTERN_LEN: usize = 128;

fn pattern_charset() -> &'static Regex {
    static CHARSET: OnceLock<Regex> = OnceLock::new();
    CHARSET.get_or_init(|| {
        Regex::new(r#"^[A-Za-z0-9_\-.$/~"'@:+&*?]+$"#).expect("path pattern charset regex is valid")
    })
}

pub(crate) fn check_priority(rule: &ResourceId, priority: u32) -> Result<(), GraphValidationError> {
    if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
        return Err(GraphValidationError::PriorityOutOfRange {
            resource: rule.clone(),
            priority,
        });
    }
    Ok(())
}

/// A validated path pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PathPattern(String);

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, GraphValidationError> {
        let invalid = |reason: &str| GraphValidationError::InvalidPathPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if pattern.is_empty() {
            return Err(invalid("pattern is empty"));
        }
        if pattern.len() > MAX_PATTERN_LEN {
            return Err(invalid("pattern is longer than 128 characters"));
        }
        if !pattern.starts_with('/') && !pattern.starts_with('*') {
            return Err(invalid("pattern must start with '/' or '*'"));
        }
        if !pattern_charset().is_match(pattern) {
            return Err(invalid("pattern contains characters outside A-Za-z0-9_-.$/~\"'@:+&*?"));
        }
        Ok(Self(pattern.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a request path matches this pattern
    pub fn matches(&self, path: &str) -> bool {
        glob_contains(self.as_str(), path, false)
    }

    /// Whether every path matched by `other` is also matched by `self`
    pub fn covers(&self, other: &PathPattern) -> bool {
        glob_contains(self.as_str(), other.as_str(), true)
    }

    /// Matches every path
    pub fn is_catch_all(&self) -> bool {
        self.0.chars().all(|c| c == '*') || self.0 == "/*"
    }
}

/// Glob containment over characters.
///
/// With `subject_is_pattern` unset, `subject` is a literal path and this is
/// plain glob matching. With it set, wildcards in `subject` can only be
/// absorbed by a `*` in `pattern` (or a `?` for a `?`), which makes a `true`
/// answer a proof that the pattern's language contains the subject's.
fn glob_contains(pattern: &str, subject: &str, subject_is_pattern: bool) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let s: Vec<char> = subject.chars().collect();
    let is_wild = |c: char| subject_is_pattern && (c == '*' || c == '?');

    // dp[i][j]: p[i..] contains s[j..]
    let mut dp = vec![vec![false; s.len() + 1]; p.len() + 1];
    dp[p.len()][s.len()] = true;

    for i in (0..p.len()).rev() {
        for j in (0..=s.len()).rev() {
            dp[i][j] = match p[i] {
                '*' => dp[i + 1][j] || (j < s.len() && dp[i][j + 1]),
                '?' => j < s.len() && !(subject_is_pattern && s[j] == '*') && dp[i + 1][j + 1],
                c => j < s.len() && !is_wild(s[j]) && s[j] == c && dp[i + 1][j + 1],
            };
        }
    }

    dp[0][0]
}

/// Where a request ends up
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteTarget {
    /// The rule that matched, or `None` for the default action
    pub rule: Option<ResourceId>,
    pub priority: Option<u32>,
    pub target_group: ResourceId,
    /// Service runners or functions registered in the target group
    pub backends: Vec<ResourceId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteEntry {
    pub rule: ResourceId,
    pub priority: u32,
    pub patterns: Vec<PathPattern>,
    pub target: RouteTarget,
}

/// Evaluation order of one listener
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingTable {
    pub listener: ResourceId,
    /// Sorted by ascending priority
    pub entries: Vec<RouteEntry>,
    pub default: RouteTarget,
}

impl RoutingTable {
    /// Build the routing table of `listener` from a graph
    pub fn for_listener(
        graph: &StackGraph,
        listener: &ResourceId,
    ) -> Result<Self, GraphValidationError> {
        let Some(ResourceSpec::Listener(spec)) = graph.get(listener).map(|r| &r.spec) else {
            return Err(GraphValidationError::UndefinedReference {
                resource: ResourceId::new("routing"),
                reference: listener.clone(),
            });
        };
        let default_group = spec
            .default_target
            .as_ref()
            .ok_or_else(|| GraphValidationError::MissingDefaultTarget(listener.clone()))?;

        let mut entries = Vec::new();
        for (rule_id, rule) in graph.rules_for(listener) {
            let patterns = rule
                .path_patterns
                .iter()
                .map(|p| PathPattern::parse(p))
                .collect::<Result<Vec<_>, _>>()?;
            entries.push(RouteEntry {
                rule: rule_id.clone(),
                priority: rule.priority,
                patterns,
                target: RouteTarget {
                    rule: Some(rule_id.clone()),
                    priority: Some(rule.priority),
                    target_group: rule.target_group.clone(),
                    backends: backends_of(graph, &rule.target_group),
                },
            });
        }
        entries.sort_by_key(|e| e.priority);

        Ok(Self {
            listener: listener.clone(),
            entries,
            default: RouteTarget {
                rule: None,
                priority: None,
                target_group: default_group.clone(),
                backends: backends_of(graph, default_group),
            },
        })
    }

    /// Select the target for an inbound request path
    pub fn resolve(&self, path: &str) -> &RouteTarget {
        self.entries
            .iter()
            .find(|e| e.patterns.iter().any(|p| p.matches(path)))
            .map(|e| &e.target)
            .unwrap_or(&self.default)
    }

    /// Rules no request can reach because earlier rules cover all their patterns
    pub fn shadowed_rules(&self) -> Vec<GraphValidationError> {
        let mut found = Vec::new();

        for (j, later) in self.entries.iter().enumerate() {
            let earlier = &self.entries[..j];
            let coverers: Vec<Option<(&RouteEntry, &PathPattern)>> = later
                .patterns
                .iter()
                .map(|q| {
                    earlier.iter().find_map(|e| {
                        e.patterns.iter().find(|p| p.covers(q)).map(|p| (e, p))
                    })
                })
                .collect();

            if coverers.iter().all(Option::is_some) {
                if let Some(Some((by, pattern))) = coverers.first() {
                    found.push(GraphValidationError::ShadowedRule {
                        listener: self.listener.clone(),
                        shadowed: later.rule.clone(),
                        shadowed_priority: later.priority,
                        by: by.rule.clone(),
                        by_priority: by.priority,
                        pattern: pattern.as_str().to_string(),
                    });
                }
            }
        }

        found
    }
}

fn backends_of(graph: &StackGraph, target_group: &ResourceId) -> Vec<ResourceId> {
    match graph.get(target_group).map(|r| &r.spec) {
        Some(ResourceSpec::TargetGroup(tg)) => tg.targets.clone(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pat(s: &str) -> PathPattern {
        PathPattern::parse(s).unwrap()
    }

    #[test]
    fn test_glob_matching() {
        let lambda = pat("/lambda*");
        assert!(lambda.matches("/lambda"));
        assert!(lambda.matches("/lambda/hello/world"));
        assert!(!lambda.matches("/Lambda"));
        assert!(!lambda.matches("/api/lambda"));

        let single = pat("/v?/items");
        assert!(single.matches("/v1/items"));
        assert!(!single.matches("/v10/items"));
    }

    #[test]
    fn test_single_wildcard_matches_literal_star() {
        assert!(pat("/v?").matches("/v*"));
        assert!(pat("/v?").matches("/v?"));
        assert!(!pat("/v?").covers(&pat("/v*")));
    }

    #[test]
    fn test_catch_all_covers_everything() {
        let all = pat("*");
        assert!(all.is_catch_all());
        assert!(all.covers(&pat("/lambda*")));
        assert!(all.covers(&pat("/v?/items")));
        assert!(!pat("/lambda*").covers(&all));
    }

    #[test]
    fn test_specific_does_not_cover_general() {
        assert!(pat("/api/*").covers(&pat("/api/v1/*")));
        assert!(!pat("/api/v1/*").covers(&pat("/api/*")));
        assert!(!pat("/a?c").covers(&pat("/a*c")));
        assert!(pat("/a*c").covers(&pat("/a?c")));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(PathPattern::parse("").is_err());
        assert!(PathPattern::parse("lambda").is_err());
        assert!(PathPattern::parse("/with space").is_err());
        assert!(PathPattern::parse(&format!("/{}", "a".repeat(128))).is_err());
    }

    #[test]
    fn test_priority_range() {
        let rule = ResourceId::new("rule");
        assert!(check_priority(&rule, 1).is_ok());
        assert!(check_priority(&rule, 50_000).is_ok());
        assert!(check_priority(&rule, 0).is_err());
        assert!(check_priority(&rule, 50_001).is_err());
    }

    fn table(entries: Vec<(u32, Vec<&str>)>) -> RoutingTable {
        let default = RouteTarget {
            rule: None,
            priority: None,
            target_group: ResourceId::new("default-tg"),
            backends: vec![ResourceId::new("service")],
        };
        RoutingTable {
            listener: ResourceId::new("alb/http"),
            entries: entries
                .into_iter()
                .map(|(priority, patterns)| {
                    let rule = ResourceId::new(format!("rule-{}", priority));
                    RouteEntry {
                        rule: rule.clone(),
                        priority,
                        patterns: patterns.into_iter().map(pat).collect(),
                        target: RouteTarget {
                            rule: Some(rule),
                            priority: Some(priority),
                            target_group: ResourceId::new(format!("tg-{}", priority)),
                            backends: vec![],
                        },
                    }
                })
                .collect(),
            default,
        }
    }

    #[test]
    fn test_first_match_wins() {
        let t = table(vec![(5, vec!["/api/v1/*"]), (10, vec!["/api/*"])]);
        assert_eq!(t.resolve("/api/v1/users").priority, Some(5));
        assert_eq!(t.resolve("/api/v2/users").priority, Some(10));
        assert_eq!(t.resolve("/").priority, None);
        assert_eq!(t.resolve("/").target_group.as_str(), "default-tg");
    }

    #[test]
    fn test_shadowed_rule_detected() {
        let t = table(vec![(5, vec!["*"]), (10, vec!["/lambda*"])]);
        let shadowed = t.shadowed_rules();
        assert_eq!(shadowed.len(), 1);
        assert!(matches!(
            &shadowed[0],
            GraphValidationError::ShadowedRule { shadowed_priority: 10, by_priority: 5, .. }
        ));
    }

    #[test]
    fn test_partially_covered_rule_is_reachable() {
        let t = table(vec![(5, vec!["/api/*"]), (10, vec!["/api/*", "/lambda*"])]);
        assert!(t.shadowed_rules().is_empty());
        assert_eq!(t.resolve("/lambda/x").priority, Some(10));
    }
}
