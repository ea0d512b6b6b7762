//! Module catalog loading.
//!
//! The runtime SDK ships one JSON document per module family. Each document is
//! an array of module records:
//!
//! ```json
//! [
//!   {
//!     "module": "plugins/net/http",
//!     "deps": { "android": ["engine/arkui"], "ios": ["engine/arkui"] },
//!     "library": {
//!       "android": ["lib/arch_type/libhttp.so"],
//!       "ios": ["lib/arch_type/libhttp.xcframework"]
//!     }
//!   }
//! ]
//! ```
//!
//! Library templates are relative to the document's root directory and are
//! made absolute at load time. The placeholders `arch_type` and `build_modes`
//! are substituted later by the [locator](crate::locator).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::fs::Filesystem;
use crate::types::{PackError, Platform};

/// Declaration of one native module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Module name, e.g. `engine/arkui`.
    pub module: String,
    /// Dependency names per platform key.
    #[serde(default)]
    pub deps: BTreeMap<String, Vec<String>>,
    /// Artifact path templates per platform key.
    #[serde(default)]
    pub library: BTreeMap<String, Vec<String>>,
}

impl ModuleDescriptor {
    /// Dependencies declared for a platform, in declaration order.
    pub fn deps_for(&self, platform: Platform) -> &[String] {
        self.deps
            .get(platform.catalog_key())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Artifact templates declared for a platform.
    pub fn templates_for(&self, platform: Platform) -> &[String] {
        self.library
            .get(platform.catalog_key())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether the module contributes anything (artifacts or deps) on a platform.
    pub fn available_on(&self, platform: Platform) -> bool {
        !self.templates_for(platform).is_empty() || !self.deps_for(platform).is_empty()
    }
}

/// One catalog document and the directory its templates are relative to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSource {
    /// Path of the JSON document.
    pub document: PathBuf,
    /// Directory the library templates are joined onto.
    pub root: PathBuf,
}

impl CatalogSource {
    /// Creates a source.
    pub fn new(document: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            document: document.into(),
            root: root.into(),
        }
    }

    /// The three documents every runtime SDK ships: engine, API plugins and
    /// component plugins.
    pub fn sdk_defaults(sdk_dir: &Path) -> Vec<Self> {
        ["engine", "plugins/api", "plugins/component"]
            .into_iter()
            .map(|family| {
                let root = sdk_dir.join(family);
                Self::new(root.join("apiConfig.json"), root)
            })
            .collect()
    }
}

/// All modules available in the SDK, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ModuleCatalog {
    modules: BTreeMap<String, ModuleDescriptor>,
}

impl ModuleCatalog {
    /// Loads and merges catalog documents.
    ///
    /// A missing document or malformed JSON is fatal and names the file.
    /// When two documents declare the same module the later one wins.
    pub fn load(sources: &[CatalogSource], fs: &dyn Filesystem) -> Result<Self, PackError> {
        let mut catalog = Self::default();
        for source in sources {
            if !fs.exists(&source.document) {
                return Err(PackError::Config(format!(
                    "could not find catalog document {}",
                    source.document.display()
                )));
            }
            tracing::debug!("loading catalog {}", source.document.display());
            let text = fs.read_to_string(&source.document)?;
            for module in Self::parse_document(&text, &source.document, &source.root)? {
                catalog.insert(module);
            }
        }
        Ok(catalog)
    }

    /// Parses one document and makes its templates absolute under `root`.
    pub fn parse_document(
        text: &str,
        document: &Path,
        root: &Path,
    ) -> Result<Vec<ModuleDescriptor>, PackError> {
        let mut modules: Vec<ModuleDescriptor> =
            serde_json::from_str(text).map_err(|source| PackError::Json {
                path: document.to_path_buf(),
                source,
            })?;
        for module in &mut modules {
            for templates in module.library.values_mut() {
                templates.retain(|t| !t.is_empty());
                for template in templates.iter_mut() {
                    *template = root.join(&*template).to_string_lossy().into_owned();
                }
            }
        }
        Ok(modules)
    }

    /// Builds a catalog from descriptors whose templates are already absolute.
    pub fn from_modules(modules: impl IntoIterator<Item = ModuleDescriptor>) -> Self {
        let mut catalog = Self::default();
        for module in modules {
            catalog.insert(module);
        }
        catalog
    }

    fn insert(&mut self, module: ModuleDescriptor) {
        if self.modules.contains_key(&module.module) {
            tracing::debug!("module {} redeclared, keeping the later declaration", module.module);
        }
        self.modules.insert(module.module.clone(), module);
    }

    /// Looks up a module.
    pub fn get(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.modules.get(name)
    }

    /// Number of modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Iterates modules in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.modules.values()
    }

    /// Modules declaring neither artifacts nor dependencies for a platform.
    pub fn unavailable_on(&self, platform: Platform) -> Vec<&str> {
        self.modules
            .values()
            .filter(|m| !m.available_on(platform))
            .map(|m| m.module.as_str())
            .collect()
    }
}
