//! Dependency ordering.
//!
//! Injection order must place every plugin after its registered
//! dependencies: a dependency's side effects (a shared interface hung
//! off the bridge, say) have to exist before its dependents run.

use std::collections::BTreeSet;

use super::registry::Registry;
use super::Slug;

/// Deterministic depth-first post-order over the registry.
///
/// Every slug appears exactly once, after all of its dependencies that
/// are actually registered. Dependencies absent from the registry are
/// skipped here (the registry build already reported them). The
/// visited-once guard makes cycles terminate: a cycle degrades to
/// first-reachable order instead of recursing forever.
pub fn topological_order(registry: &Registry) -> Vec<Slug> {
    let mut sorted = Vec::with_capacity(registry.len());
    let mut visited: BTreeSet<&str> = BTreeSet::new();

    fn visit<'a>(
        slug: &'a str,
        registry: &'a Registry,
        visited: &mut BTreeSet<&'a str>,
        sorted: &mut Vec<Slug>,
    ) {
        if !visited.insert(slug) {
            return;
        }
        let Some(record) = registry.get(slug) else {
            return;
        };
        for dep in &record.manifest.dependencies {
            if registry.contains(dep) {
                visit(dep, registry, visited, sorted);
            }
        }
        sorted.push(slug.to_string());
    }

    for slug in registry.slugs() {
        visit(slug, registry, &mut visited, &mut sorted);
    }
    sorted
}
