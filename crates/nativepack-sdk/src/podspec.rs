//! CocoaPods integration for iOS applications.
//!
//! Instead of copying frameworks into `.arkui-x/ios/frameworks`, an iOS
//! application can consume the runtime as a local pod:
//!
//! 1. [`podspec`] renders `arkui-x.podspec` next to the SDK, vendoring the
//!    resolved xcframeworks straight from the SDK tree;
//! 2. [`add_pod`] references that pod from the app target of the Podfile.
//!
//! Both are plain text. Running `pod install` is left to the user.

use std::collections::BTreeSet;
use std::path::Path;

use crate::locator::LocatedArtifact;
use crate::types::PackError;
use crate::xcode::FRAMEWORK_FILE_TYPE;

/// Name of the generated pod.
pub const POD_NAME: &str = "arkui-x";

/// File name of the generated podspec, written into the SDK directory.
pub const PODSPEC_FILE_NAME: &str = "arkui-x.podspec";

const POD_VERSION: &str = "1.0.0";
const IOS_DEPLOYMENT_TARGET: &str = "10.0";

/// Paths of located xcframeworks relative to `sdk_dir`, sorted and unique.
///
/// Artifacts outside the SDK keep their absolute path.
pub fn vendored_frameworks(located: &[LocatedArtifact], sdk_dir: &Path) -> Vec<String> {
    let paths: BTreeSet<String> = located
        .iter()
        .filter(|artifact| artifact.file_type == FRAMEWORK_FILE_TYPE)
        .map(|artifact| {
            let path = artifact.source.strip_prefix(sdk_dir).unwrap_or(&artifact.source);
            path.to_string_lossy().replace('\\', "/")
        })
        .collect();
    paths.into_iter().collect()
}

/// Renders the podspec vendoring `frameworks`.
pub fn podspec(frameworks: &[String]) -> String {
    let vendored = frameworks
        .iter()
        .map(|path| format!("\"{path}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r##"Pod::Spec.new do |spec|

  spec.name          = "{POD_NAME}"
  spec.version       = "{POD_VERSION}"
  spec.summary       = "The ArkUI-X project extends the ArkUI framework to multiple OS platforms."
  spec.description   = <<-DESC
    The ArkUI-X project extends the ArkUI framework to multiple OS platforms.
    This enables developers to use one main set of code to develop applications for multiple OS platforms.
  DESC
  spec.homepage      = "https://arkui-x.cn"
  spec.license       = {{ :type => "Apache" }}
  spec.author        = {{ "ArkUI Dev Team" => "contact@mail.arkui-x.cn" }}
  spec.source        = {{ :git => "https://gitcode.com/arkui-x", :tag => "#{{spec.version}}" }}
  spec.ios.deployment_target = '{IOS_DEPLOYMENT_TARGET}'
  spec.vendored_frameworks = [{vendored}]

end
"##
    )
}

/// The Podfile line referencing the local pod at `sdk_dir`.
pub fn pod_line(sdk_dir: &Path) -> String {
    format!("pod '{POD_NAME}', :path => '{}'", sdk_dir.display())
}

/// Result of [`add_pod`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodfileEdit {
    /// The Podfile already references the pod at this path.
    Unchanged,
    /// The new Podfile text.
    Updated(String),
}

fn declares_pod(line: &str) -> bool {
    let line = line.trim_start();
    [format!("pod '{POD_NAME}'"), format!("pod \"{POD_NAME}\"")]
        .iter()
        .any(|prefix| line.starts_with(prefix.as_str()))
}

/// Whether `line` opens `target '<name>' do`.
fn opens_target(line: &str, name: &str) -> bool {
    let Some(rest) = line.trim_start().strip_prefix("target") else {
        return false;
    };
    if !rest.starts_with([' ', '\t']) {
        return false;
    }
    let rest = rest.trim_start();
    let Some(quote) = rest.chars().next().filter(|c| *c == '\'' || *c == '"') else {
        return false;
    };
    let Some(rest) = rest[1..].strip_prefix(name) else {
        return false;
    };
    rest.strip_prefix(quote)
        .is_some_and(|rest| rest.trim_start().starts_with("do"))
}

/// Adds the pod to the `target '<target>' do` block of a Podfile.
///
/// The line goes right before the first `end` after the target header. An
/// existing `arkui-x` pod line with another path is rewritten in place, so
/// moving the SDK does not leave two declarations behind.
pub fn add_pod(podfile: &str, target: &str, sdk_dir: &Path) -> Result<PodfileEdit, PackError> {
    let wanted = pod_line(sdk_dir);
    let lines: Vec<&str> = podfile.split_inclusive('\n').collect();

    if let Some(i) = lines.iter().position(|line| declares_pod(line)) {
        let line = lines[i];
        let body = line.trim_end_matches(['\r', '\n']);
        if body.trim() == wanted {
            return Ok(PodfileEdit::Unchanged);
        }
        let indent = &body[..body.len() - body.trim_start().len()];
        let ending = &line[body.len()..];
        let mut out = String::with_capacity(podfile.len() + wanted.len());
        lines[..i].iter().for_each(|l| out.push_str(l));
        out.push_str(indent);
        out.push_str(&wanted);
        out.push_str(ending);
        lines[i + 1..].iter().for_each(|l| out.push_str(l));
        return Ok(PodfileEdit::Updated(out));
    }

    let missing_block = || PackError::DescriptorStructure {
        path: None,
        message: format!("no `target '{target}' do ... end` block"),
    };
    let header = lines
        .iter()
        .position(|line| opens_target(line, target))
        .ok_or_else(missing_block)?;
    let end = lines[header + 1..]
        .iter()
        .position(|line| line.split_whitespace().next() == Some("end"))
        .map(|i| header + 1 + i)
        .ok_or_else(missing_block)?;

    let mut out = String::with_capacity(podfile.len() + wanted.len() + 3);
    for line in &lines[..end] {
        out.push_str(line);
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("  ");
    out.push_str(&wanted);
    out.push('\n');
    for line in &lines[end..] {
        out.push_str(line);
    }
    Ok(PodfileEdit::Updated(out))
}
