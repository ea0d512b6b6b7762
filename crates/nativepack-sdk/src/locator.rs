//! Selection of concrete artifact variants inside the SDK.

use std::path::{Path, PathBuf};

use crate::fs::{Filesystem, file_name_of};
use crate::layout::PlatformLayout;
use crate::resolver::DependencyGraph;
use crate::types::{ArchitectureTarget, NotFoundPolicy, PackError};

/// Placeholder for the architecture-specific directory of a template.
pub const ARCH_PLACEHOLDER: &str = "arch_type";

/// Placeholder for the build-mode directory of a template.
///
/// SDKs encode mode and architecture in a single variant name, so both
/// placeholders receive the same value.
pub const MODE_PLACEHOLDER: &str = "build_modes";

/// An artifact found in the SDK for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedArtifact {
    /// Module that declared the template.
    pub module: String,
    /// Absolute source path inside the SDK.
    pub source: PathBuf,
    /// Final path component, used as the destination name.
    pub file_name: String,
    /// Extension of the file name (`so`, `jar`, `xcframework`, ...).
    pub file_type: String,
    /// Variant that satisfied the template, if the template had placeholders.
    pub variant: Option<String>,
}

impl LocatedArtifact {
    fn new(module: &str, source: PathBuf, variant: Option<String>) -> Self {
        let file_name = file_name_of(&source);
        let file_type = file_type_of(&file_name);
        Self {
            module: module.to_string(),
            source,
            file_name,
            file_type,
            variant,
        }
    }
}

/// Extension after the last `.`, or empty when there is none.
pub fn file_type_of(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((_, ext)) => ext.to_string(),
        None => String::new(),
    }
}

/// Substitutes both placeholders of a template with a variant name.
pub fn expand_template(template: &str, variant: &str) -> String {
    template
        .replace(ARCH_PLACEHOLDER, variant)
        .replace(MODE_PLACEHOLDER, variant)
}

/// Returns the first candidate of `template` that exists, with its variant.
///
/// With no variants the template is checked verbatim.
pub fn select_variant(
    template: &str,
    variants: &[String],
    fs: &dyn Filesystem,
) -> Option<(PathBuf, Option<String>)> {
    if variants.is_empty() {
        let path = PathBuf::from(template);
        return fs.exists(&path).then_some((path, None));
    }
    variants.iter().find_map(|variant| {
        let path = PathBuf::from(expand_template(template, variant));
        fs.exists(&path).then(|| (path, Some(variant.clone())))
    })
}

/// Run-scoped record of artifacts that could not be found.
///
/// Threaded by `&mut` through every locate call of a run, so the
/// `ignore-all` suppression lasts for the run and nothing longer.
#[derive(Debug, Clone, Default)]
pub struct MissingArtifacts {
    policy: NotFoundPolicy,
    reported: Vec<String>,
    ignored: usize,
}

impl MissingArtifacts {
    /// Creates a tracker for a policy.
    pub fn new(policy: NotFoundPolicy) -> Self {
        Self {
            policy,
            reported: Vec::new(),
            ignored: 0,
        }
    }

    /// The policy in force.
    pub fn policy(&self) -> NotFoundPolicy {
        self.policy
    }

    /// Records a miss for `module`. `path` is the first candidate tried.
    pub fn record(&mut self, module: &str, path: &Path) {
        let entry = format!("{} ({})", path.display(), module);
        match self.policy {
            NotFoundPolicy::Abort => {
                tracing::error!("library not found: {}", entry);
                self.reported.push(entry);
            }
            NotFoundPolicy::Skip => {
                tracing::warn!("library not found, skipping: {}", entry);
                self.reported.push(entry);
            }
            NotFoundPolicy::IgnoreAll if self.reported.is_empty() => {
                tracing::warn!(
                    "library not found: {}; further missing libraries will be ignored",
                    entry
                );
                self.reported.push(entry);
            }
            NotFoundPolicy::IgnoreAll => self.ignored += 1,
        }
    }

    /// Misses that were reported.
    pub fn reported(&self) -> &[String] {
        &self.reported
    }

    /// Misses silently ignored after the first under `ignore-all`.
    pub fn ignored(&self) -> usize {
        self.ignored
    }

    /// Total number of misses.
    pub fn total(&self) -> usize {
        self.reported.len() + self.ignored
    }

    /// Fails with every miss so far when the policy is `abort`.
    pub fn check(&self) -> Result<(), PackError> {
        if self.policy == NotFoundPolicy::Abort && !self.reported.is_empty() {
            return Err(PackError::ArtifactNotFound(self.reported.clone()));
        }
        Ok(())
    }
}

/// Locates every artifact of the graph for one target.
///
/// All modules are evaluated before the not-found policy can fail the call,
/// so an `abort` error lists every miss for the target.
pub fn locate(
    graph: &DependencyGraph,
    target: &ArchitectureTarget,
    layout: &PlatformLayout,
    fs: &dyn Filesystem,
    missing: &mut MissingArtifacts,
) -> Result<Vec<LocatedArtifact>, PackError> {
    let arch = layout.for_target(target)?;
    let variants = arch.variants.for_mode(target.mode);
    let mut located = Vec::new();

    for module in graph.modules() {
        for template in module.templates_for(target.platform) {
            match select_variant(template, variants, fs) {
                Some((source, variant)) => {
                    tracing::debug!("{}: {} -> {}", target, module.module, source.display());
                    located.push(LocatedArtifact::new(&module.module, source, variant));
                }
                None => {
                    let first = variants
                        .first()
                        .map(|v| expand_template(template, v))
                        .unwrap_or_else(|| template.clone());
                    missing.record(&module.module, Path::new(&first));
                }
            }
        }
    }

    missing.check()?;
    Ok(located)
}
