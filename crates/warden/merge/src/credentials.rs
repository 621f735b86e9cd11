//! Credential binding aggregation
//!
//! Bindings are deduplicated by environment variable name and regrouped by
//! secret name. Groups come out sorted so repeated resolutions produce the
//! same bytes.

use std::collections::BTreeMap;
use warden_types::CredentialSource;

/// One environment variable sourced from one secret key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CredentialBinding {
    pub env_var: String,
    pub secret_name: String,
    pub secret_key: String,
}

/// Expand grouped sources into individual bindings
pub fn flatten_bindings(sources: &[CredentialSource]) -> Vec<CredentialBinding> {
    sources
        .iter()
        .flat_map(|source| {
            source.env.iter().map(|(env_var, key)| CredentialBinding {
                env_var: env_var.clone(),
                secret_name: source.secret_name.clone(),
                secret_key: key.clone(),
            })
        })
        .collect()
}

/// Merge inline and resolved credential sources.
///
/// When both declare the same environment variable the resolved binding
/// wins. The result has one group per secret, ordered by secret name.
pub fn merge_credentials(
    inline: &[CredentialSource],
    resolved: &[CredentialSource],
) -> Vec<CredentialSource> {
    let mut by_env: BTreeMap<String, CredentialBinding> = BTreeMap::new();
    for binding in flatten_bindings(inline)
        .into_iter()
        .chain(flatten_bindings(resolved))
    {
        by_env.insert(binding.env_var.clone(), binding);
    }

    let mut groups: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    for binding in by_env.into_values() {
        groups
            .entry(binding.secret_name)
            .or_default()
            .insert(binding.env_var, binding.secret_key);
    }

    groups
        .into_iter()
        .map(|(secret_name, env)| CredentialSource { secret_name, env })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_binding_wins() {
        let inline = vec![CredentialSource::new("secretA").with_env("TOKEN", "key1")];
        let resolved = vec![CredentialSource::new("secretB").with_env("TOKEN", "key2")];

        let merged = merge_credentials(&inline, &resolved);
        assert_eq!(merged, vec![CredentialSource::new("secretB").with_env("TOKEN", "key2")]);
    }

    #[test]
    fn test_groups_sorted_by_secret_name() {
        let inline = vec![
            CredentialSource::new("zeta").with_env("Z", "z"),
            CredentialSource::new("alpha").with_env("A", "a"),
        ];
        let resolved = vec![CredentialSource::new("alpha").with_env("B", "b")];

        let merged = merge_credentials(&inline, &resolved);
        let names: Vec<_> = merged.iter().map(|s| s.secret_name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(merged[0].env.len(), 2);
    }

    #[test]
    fn test_emptied_group_disappears() {
        let inline = vec![CredentialSource::new("old").with_env("TOKEN", "k")];
        let resolved = vec![CredentialSource::new("new").with_env("TOKEN", "k")];
        let merged = merge_credentials(&inline, &resolved);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].secret_name, "new");
    }
}
