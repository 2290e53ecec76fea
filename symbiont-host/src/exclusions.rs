//! Configuration exclusion policy.
//!
//! Each plugin context runs with a set of disabled auto-configured
//! subsystems: the host-wide defaults plus whatever the plugin's
//! configurer declares. The union is additive only: a plugin can add
//! exclusions but never re-enable a host default. The effective set is
//! injected into the plugin environment as the lowest-precedence source,
//! so it suppresses default auto-wiring without forbidding explicit
//! configuration.

use crate::config::{ConfigSource, PROP_AUTOCONFIGURE_EXCLUDE};
use std::collections::BTreeSet;

/// Host-default exclusion set plus the additive merge. The defaults are
/// an immutable value supplied at host construction, so multiple hosts
/// in one process never interfere.
#[derive(Debug, Clone)]
pub struct ExclusionPolicy {
    host_defaults: BTreeSet<String>,
}

impl ExclusionPolicy {
    pub fn new(host_defaults: impl IntoIterator<Item = String>) -> Self {
        Self {
            host_defaults: host_defaults.into_iter().collect(),
        }
    }

    pub fn host_defaults(&self) -> &BTreeSet<String> {
        &self.host_defaults
    }

    /// Effective exclusions for one plugin: defaults plus declared.
    pub fn effective(&self, plugin_declared: &[String]) -> BTreeSet<String> {
        let mut merged = self.host_defaults.clone();
        merged.extend(plugin_declared.iter().cloned());
        merged
    }

    /// Renders the effective set as the synthetic configuration source
    /// appended at the lowest precedence of a plugin environment.
    pub fn config_source(&self, plugin_declared: &[String]) -> ConfigSource {
        let merged = self.effective(plugin_declared);
        let joined = merged.iter().cloned().collect::<Vec<_>>().join(",");
        ConfigSource::new("exclusions").with(PROP_AUTOCONFIGURE_EXCLUDE, joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn policy() -> ExclusionPolicy {
        ExclusionPolicy::new([
            "symbiont.autoconfig.WebServer".to_string(),
            "symbiont.autoconfig.Metrics".to_string(),
        ])
    }

    #[test]
    fn effective_is_union_of_defaults_and_declared() {
        let effective = policy().effective(&["symbiont.autoconfig.Persistence".to_string()]);
        assert!(effective.contains("symbiont.autoconfig.WebServer"));
        assert!(effective.contains("symbiont.autoconfig.Metrics"));
        assert!(effective.contains("symbiont.autoconfig.Persistence"));
        assert_eq!(effective.len(), 3);
    }

    #[test]
    fn declaring_a_default_does_not_duplicate() {
        let effective = policy().effective(&["symbiont.autoconfig.Metrics".to_string()]);
        assert_eq!(effective.len(), 2);
    }

    #[test]
    fn config_source_binds_reserved_key() {
        let mut env = Environment::new();
        env.push_last(policy().config_source(&["x.Extra".to_string()]));

        let bound = env.exclusions();
        assert!(bound.contains(&"x.Extra".to_string()));
        assert!(bound.contains(&"symbiont.autoconfig.WebServer".to_string()));
    }

    #[test]
    fn explicit_source_overrides_only_by_re_specifying() {
        // exclusions sit at the lowest precedence; an explicit preset for
        // the reserved key wins, but the policy set itself never shrinks
        let mut env = Environment::new();
        env.push_last(
            crate::config::ConfigSource::new("preset")
                .with(crate::config::PROP_AUTOCONFIGURE_EXCLUDE, "only.This"),
        );
        env.push_last(policy().config_source(&[]));

        assert_eq!(env.exclusions(), vec!["only.This".to_string()]);
        assert_eq!(policy().effective(&[]).len(), 2);
    }

    proptest! {
        // monotonicity: effective(declared) ⊇ host defaults for any input
        #[test]
        fn effective_always_contains_host_defaults(
            declared in proptest::collection::vec("[a-z.]{1,20}", 0..8)
        ) {
            let p = policy();
            let effective = p.effective(&declared);
            for default in p.host_defaults() {
                prop_assert!(effective.contains(default));
            }
        }
    }
}
