//! Dependency closure over the module catalog.

use std::collections::{BTreeSet, HashMap};

use crate::catalog::{ModuleCatalog, ModuleDescriptor};
use crate::types::Platform;

/// Module every project links against, requested or not.
pub const DEFAULT_BASE_MODULE: &str = "engine/arkui";

/// The resolved set of modules for one platform.
///
/// Members keep the order in which they were first visited, which is the
/// order artifacts are located and placed in.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    order: Vec<String>,
    modules: HashMap<String, ModuleDescriptor>,
    missing: Vec<String>,
}

impl DependencyGraph {
    /// Whether a module is part of the closure.
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Descriptor of a member module.
    pub fn get(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.modules.get(name)
    }

    /// Number of member modules.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no module was resolved.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Member modules in visit order.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.order.iter().filter_map(|name| self.modules.get(name))
    }

    /// Member names in visit order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Member names, sorted.
    pub fn member_set(&self) -> BTreeSet<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// Names that were requested or depended upon but are not in the catalog.
    pub fn missing(&self) -> &[String] {
        &self.missing
    }
}

/// Computes dependency closures against a catalog.
///
/// # Example
///
/// ```ignore
/// let graph = Resolver::new(&catalog)
///     .base_module("engine/arkui")
///     .resolve(["plugins/net/http"], Platform::Android);
/// assert!(graph.contains("engine/arkui"));
/// ```
pub struct Resolver<'a> {
    catalog: &'a ModuleCatalog,
    base_module: Option<String>,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver seeded with [`DEFAULT_BASE_MODULE`].
    pub fn new(catalog: &'a ModuleCatalog) -> Self {
        Self {
            catalog,
            base_module: Some(DEFAULT_BASE_MODULE.to_string()),
        }
    }

    /// Replaces the implicit base module. An empty name disables it.
    pub fn base_module(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.base_module = if name.is_empty() { None } else { Some(name) };
        self
    }

    /// Resolves the closure of `roots` on `platform`.
    ///
    /// Roots are visited in sorted order, so the resulting member set and
    /// visit order do not depend on how the caller ordered them. Unknown
    /// names are logged and listed in [`DependencyGraph::missing`].
    pub fn resolve<I, S>(&self, roots: I, platform: Platform) -> DependencyGraph
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let roots: BTreeSet<String> = roots.into_iter().map(|s| s.as_ref().to_string()).collect();
        let mut graph = DependencyGraph::default();

        if let Some(base) = &self.base_module {
            self.visit(base, platform, &mut graph);
        }
        for root in &roots {
            self.visit(root, platform, &mut graph);
        }

        tracing::info!(
            "resolved {} module(s) for {} from {} requested",
            graph.len(),
            platform,
            roots.len()
        );
        graph
    }

    fn visit(&self, name: &str, platform: Platform, graph: &mut DependencyGraph) {
        if graph.contains(name) || graph.missing.iter().any(|m| m == name) {
            return;
        }
        let Some(module) = self.catalog.get(name) else {
            tracing::warn!("module {} is not in the SDK catalog, skipping it", name);
            graph.missing.push(name.to_string());
            return;
        };

        // Insert before recursing so dependency cycles terminate.
        graph.order.push(name.to_string());
        graph.modules.insert(name.to_string(), module.clone());

        for dep in module.deps_for(platform) {
            self.visit(dep, platform, graph);
        }
    }
}

/// Resolves `roots` with the default base module.
pub fn resolve<I, S>(roots: I, platform: Platform, catalog: &ModuleCatalog) -> DependencyGraph
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Resolver::new(catalog).resolve(roots, platform)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn module(name: &str, deps: &[&str]) -> ModuleDescriptor {
        let mut dep_map = BTreeMap::new();
        dep_map.insert(
            "android".to_string(),
            deps.iter().map(|d| d.to_string()).collect(),
        );
        ModuleDescriptor {
            module: name.to_string(),
            deps: dep_map,
            library: BTreeMap::new(),
        }
    }

    fn catalog() -> ModuleCatalog {
        ModuleCatalog::from_modules([
            module("base", &[]),
            module("moduleA", &["base"]),
            module("moduleB", &["moduleA"]),
            module("cycleX", &["cycleY"]),
            module("cycleY", &["cycleX"]),
        ])
    }

    #[test]
    fn test_transitive_closure() {
        let catalog = catalog();
        let graph = Resolver::new(&catalog)
            .base_module("base")
            .resolve(["moduleB"], Platform::Android);

        let members: Vec<&str> = graph.member_set().into_iter().collect();
        assert_eq!(members, vec!["base", "moduleA", "moduleB"]);
        assert!(graph.missing().is_empty());
    }

    #[test]
    fn test_base_module_always_included() {
        let catalog = catalog();
        let graph = Resolver::new(&catalog)
            .base_module("base")
            .resolve(Vec::<String>::new(), Platform::Android);
        assert_eq!(graph.names(), &["base".to_string()]);
    }

    #[test]
    fn test_cycles_terminate() {
        let catalog = catalog();
        let graph = Resolver::new(&catalog)
            .base_module("")
            .resolve(["cycleX"], Platform::Android);
        assert_eq!(graph.names(), &["cycleX".to_string(), "cycleY".to_string()]);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let catalog = catalog();
        let resolver = Resolver::new(&catalog).base_module("base");
        let forward = resolver.resolve(["moduleB", "cycleX", "unknown"], Platform::Android);
        let backward = resolver.resolve(["unknown", "cycleX", "moduleB"], Platform::Android);

        assert_eq!(forward.names(), backward.names());
        assert_eq!(forward.missing(), backward.missing());
    }

    #[test]
    fn test_unknown_modules_are_recorded_not_fatal() {
        let catalog = catalog();
        let graph = Resolver::new(&catalog)
            .base_module("base")
            .resolve(["moduleA", "ghost", "ghost"], Platform::Android);

        assert_eq!(graph.missing(), &["ghost".to_string()]);
        assert!(graph.contains("moduleA"));
    }

    #[test]
    fn test_default_base_missing_from_catalog() {
        let catalog = catalog();
        let graph = resolve(["moduleA"], Platform::Android, &catalog);
        assert_eq!(graph.missing(), &[DEFAULT_BASE_MODULE.to_string()]);
        assert!(graph.contains("base"));
    }

    #[test]
    fn test_platform_specific_deps() {
        let catalog = catalog();
        let graph = Resolver::new(&catalog)
            .base_module("")
            .resolve(["moduleB"], Platform::Ios);
        // Dependencies are only declared for android.
        assert_eq!(graph.names(), &["moduleB".to_string()]);
    }
}
