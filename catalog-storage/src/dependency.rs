//! Dependency graph traversal.
//!
//! Every dependency name resolves to that component's latest version.
//! Declared version constraints are recorded on the definition but not
//! enforced here.

use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;
use catalog_core::{CatalogResult, ComponentDefinition};

/// Resolves a component name to its current latest definition.
#[async_trait]
pub trait LatestResolver: Send + Sync {
    async fn resolve_latest(&self, name: &str) -> CatalogResult<ComponentDefinition>;
}

/// Breadth-first walk of `root`'s dependencies.
///
/// A name is resolved at most once per call, and the root's own name counts
/// as seen, so cyclic graphs terminate. Dependencies that do not exist in the
/// catalog are skipped; any other failure aborts the walk.
pub async fn collect_dependencies<R>(
    root: &ComponentDefinition,
    recursive: bool,
    resolver: &R,
) -> CatalogResult<Vec<ComponentDefinition>>
where
    R: LatestResolver + ?Sized,
{
    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(root.name().to_string());

    let mut resolved = Vec::new();
    let mut worklist: VecDeque<ComponentDefinition> = VecDeque::new();
    let mut pending = expand(root, &mut seen);
    loop {
        for name in pending.drain(..) {
            match resolver.resolve_latest(&name).await {
                Ok(definition) => {
                    if recursive {
                        worklist.push_back(definition.clone());
                    }
                    resolved.push(definition);
                }
                Err(e) if e.is_not_found() => {
                    tracing::warn!(
                        component = %root.name(),
                        dependency = %name,
                        "Dependency not found in catalog, skipping"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        match worklist.pop_front() {
            Some(next) => pending = expand(&next, &mut seen),
            None => break,
        }
    }

    Ok(resolved)
}

/// Dependency names of `definition` not yet seen, marking them seen.
fn expand(definition: &ComponentDefinition, seen: &mut HashSet<String>) -> Vec<String> {
    definition
        .spec
        .dependencies
        .iter()
        .filter(|dep| seen.insert(dep.name.clone()))
        .map(|dep| dep.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::{CatalogError, DependencySpec, ErrorKind, StorageError};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MapResolver {
        components: HashMap<String, ComponentDefinition>,
        calls: Mutex<Vec<String>>,
        failing: Option<String>,
    }

    impl MapResolver {
        fn with(mut self, name: &str, deps: &[&str]) -> Self {
            let mut def = ComponentDefinition::new(name, "1.0.0");
            for dep in deps {
                def = def.with_dependency(DependencySpec::new(*dep, "component"));
            }
            self.components.insert(name.to_string(), def);
            self
        }

        fn call_count(&self, name: &str) -> usize {
            self.calls
                .lock()
                .map(|c| c.iter().filter(|n| n.as_str() == name).count())
                .unwrap_or(0)
        }
    }

    #[async_trait]
    impl LatestResolver for MapResolver {
        async fn resolve_latest(&self, name: &str) -> CatalogResult<ComponentDefinition> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(name.to_string());
            }
            if self.failing.as_deref() == Some(name) {
                return Err(StorageError::Throttled {
                    operation: "query_versions".into(),
                }
                .into());
            }
            self.components
                .get(name)
                .cloned()
                .ok_or_else(|| CatalogError::not_found(name, None))
        }
    }

    fn names(defs: &[ComponentDefinition]) -> Vec<&str> {
        defs.iter().map(|d| d.name()).collect()
    }

    #[tokio::test]
    async fn test_cycle_terminates_without_revisiting_root() {
        let resolver = MapResolver::default()
            .with("a", &["b"])
            .with("b", &["c"])
            .with("c", &["a"]);
        let root = resolver.components["a"].clone();

        let deps = collect_dependencies(&root, true, &resolver).await.unwrap();
        assert_eq!(names(&deps), vec!["b", "c"]);
        assert_eq!(resolver.call_count("a"), 0);
    }

    #[tokio::test]
    async fn test_non_recursive_returns_direct_only() {
        let resolver = MapResolver::default()
            .with("app", &["db", "net"])
            .with("db", &["disk"])
            .with("net", &[])
            .with("disk", &[]);
        let root = resolver.components["app"].clone();

        let direct = collect_dependencies(&root, false, &resolver).await.unwrap();
        assert_eq!(names(&direct), vec!["db", "net"]);

        let all = collect_dependencies(&root, true, &resolver).await.unwrap();
        assert_eq!(names(&all), vec!["db", "net", "disk"]);
    }

    #[tokio::test]
    async fn test_shared_dependency_resolved_once() {
        let resolver = MapResolver::default()
            .with("app", &["db", "cache"])
            .with("db", &["net"])
            .with("cache", &["net"])
            .with("net", &[]);
        let root = resolver.components["app"].clone();

        let all = collect_dependencies(&root, true, &resolver).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(resolver.call_count("net"), 1);
    }

    #[tokio::test]
    async fn test_missing_dependency_skipped() {
        let resolver = MapResolver::default().with("app", &["ghost", "db"]).with("db", &[]);
        let root = resolver.components["app"].clone();

        let deps = collect_dependencies(&root, true, &resolver).await.unwrap();
        assert_eq!(names(&deps), vec!["db"]);
    }

    #[tokio::test]
    async fn test_backend_failure_aborts() {
        let mut resolver = MapResolver::default().with("app", &["db"]).with("db", &[]);
        resolver.failing = Some("db".to_string());
        let root = resolver.components["app"].clone();

        let err = collect_dependencies(&root, true, &resolver).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Throttled);
    }
}
