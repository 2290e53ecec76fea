//! Layered configuration for plugin contexts.
//!
//! An [`Environment`] is an ordered stack of key/value sources; the first
//! source holding a key wins. Plugin preset properties sit above host
//! presets, which sit above the synthetic exclusion source, so explicit
//! configuration can override anything, while the exclusion list stays a
//! lowest-precedence default.
//!
//! Multi-valued plugin keys are indexed and accepted in four spellings,
//! e.g. for `pluginFirstClasses`:
//! `symbiont-plugin.pluginFirstClasses[0]`, `symbiont-plugin.pluginFirstClasses.0`,
//! `symbiont-plugin.plugin-first-classes[0]`, `symbiont-plugin.plugin-first-classes.0`.

use std::collections::BTreeMap;

/// Reserved key carrying the effective exclusion list (comma-separated).
pub const PROP_AUTOCONFIGURE_EXCLUDE: &str = "symbiont.autoconfigure.exclude";

/// Indexed property naming type-name prefixes resolved plugin-first.
pub const PROP_PLUGIN_FIRST_CLASSES: &str = "pluginFirstClasses";

/// Indexed property naming resource patterns resolved plugin-only.
pub const PROP_PLUGIN_ONLY_RESOURCES: &str = "pluginOnlyResources";

/// Prefix for all indexed plugin properties.
pub const PLUGIN_PROP_PREFIX: &str = "symbiont-plugin";

/// One named key/value configuration layer.
#[derive(Debug, Clone, Default)]
pub struct ConfigSource {
    name: String,
    values: BTreeMap<String, String>,
}

impl ConfigSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn from_map(name: impl Into<String>, values: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Ordered configuration stack; earlier sources take precedence.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    sources: Vec<ConfigSource>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a source with the lowest precedence so far.
    pub fn push_last(&mut self, source: ConfigSource) {
        self.sources.push(source);
    }

    /// Prepends a source with the highest precedence.
    pub fn push_first(&mut self, source: ConfigSource) {
        self.sources.insert(0, source);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.sources.iter().find_map(|s| s.get(key))
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(ConfigSource::name).collect()
    }

    /// Collects an indexed multi-valued property, trying each accepted
    /// spelling per index until none matches.
    pub fn indexed_values(&self, prop: &str) -> Vec<String> {
        let kebab = camel_to_kebab(prop);
        let mut values = Vec::new();
        let mut index = 0;
        loop {
            let candidates = [
                format!("{PLUGIN_PROP_PREFIX}.{prop}[{index}]"),
                format!("{PLUGIN_PROP_PREFIX}.{prop}.{index}"),
                format!("{PLUGIN_PROP_PREFIX}.{kebab}[{index}]"),
                format!("{PLUGIN_PROP_PREFIX}.{kebab}.{index}"),
            ];
            match candidates.iter().find_map(|key| self.get(key)) {
                Some(value) => values.push(value.to_string()),
                None => break,
            }
            index += 1;
        }
        values
    }

    /// The effective exclusion list bound into this environment.
    pub fn exclusions(&self) -> Vec<String> {
        self.get(PROP_AUTOCONFIGURE_EXCLUDE)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// `pluginFirstClasses` → `plugin-first-classes`.
fn camel_to_kebab(prop: &str) -> String {
    let mut out = String::with_capacity(prop.len() + 4);
    for ch in prop.chars() {
        if ch.is_ascii_uppercase() {
            if !out.is_empty() {
                out.push('-');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn first_source_wins() {
        let mut env = Environment::new();
        env.push_last(ConfigSource::new("preset").with("key", "plugin"));
        env.push_last(ConfigSource::new("defaults").with("key", "host"));

        assert_eq!(env.get("key"), Some("plugin"));
    }

    #[test]
    fn push_first_takes_precedence() {
        let mut env = Environment::new();
        env.push_last(ConfigSource::new("low").with("key", "low"));
        env.push_first(ConfigSource::new("high").with("key", "high"));

        assert_eq!(env.get("key"), Some("high"));
        assert_eq!(env.source_names(), vec!["high", "low"]);
    }

    #[test]
    fn indexed_values_accept_all_four_spellings() {
        let mut env = Environment::new();
        env.push_last(
            ConfigSource::new("preset")
                .with("symbiont-plugin.pluginFirstClasses[0]", "app.shadow.Util")
                .with("symbiont-plugin.pluginFirstClasses.1", "app.shadow.Codec")
                .with("symbiont-plugin.plugin-first-classes[2]", "app.shadow.Fmt")
                .with("symbiont-plugin.plugin-first-classes.3", "app.shadow.Log"),
        );

        assert_eq!(
            env.indexed_values(PROP_PLUGIN_FIRST_CLASSES),
            vec![
                "app.shadow.Util".to_string(),
                "app.shadow.Codec".to_string(),
                "app.shadow.Fmt".to_string(),
                "app.shadow.Log".to_string(),
            ]
        );
    }

    #[test]
    fn indexed_values_stop_at_first_gap() {
        let mut env = Environment::new();
        env.push_last(
            ConfigSource::new("preset")
                .with("symbiont-plugin.pluginOnlyResources[0]", "conf/*")
                .with("symbiont-plugin.pluginOnlyResources[2]", "unreachable"),
        );

        assert_eq!(
            env.indexed_values(PROP_PLUGIN_ONLY_RESOURCES),
            vec!["conf/*".to_string()]
        );
    }

    #[test]
    fn exclusions_split_and_trim() {
        let mut env = Environment::new();
        env.push_last(ConfigSource::new("exclusions").with(
            PROP_AUTOCONFIGURE_EXCLUDE,
            "a.One, b.Two ,, c.Three",
        ));

        assert_eq!(
            env.exclusions(),
            vec!["a.One".to_string(), "b.Two".to_string(), "c.Three".to_string()]
        );
    }

    #[test]
    fn exclusions_empty_without_reserved_key() {
        assert!(Environment::new().exclusions().is_empty());
    }

    #[test]
    fn camel_to_kebab_conversion() {
        assert_eq!(camel_to_kebab("pluginFirstClasses"), "plugin-first-classes");
        assert_eq!(camel_to_kebab("pluginOnlyResources"), "plugin-only-resources");
        assert_eq!(camel_to_kebab("plain"), "plain");
    }
}
