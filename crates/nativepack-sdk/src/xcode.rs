//! Xcode `project.pbxproj` sections managed for xcframework artifacts.

use crate::descriptor::{ManagedNames, SectionSpec};
use crate::types::PackageKind;

/// File type of artifacts registered in Xcode projects.
pub const FRAMEWORK_FILE_TYPE: &str = "xcframework";

const BUILD_FILE_BEGIN: &str = "/* Begin PBXBuildFile section */";
const BUILD_FILE_END: &str = "/* End PBXBuildFile section */";
const COPY_FILES_BEGIN: &str = "/* Begin PBXCopyFilesBuildPhase section */";
const FILE_REFERENCE_BEGIN: &str = "/* Begin PBXFileReference section */";
const FILE_REFERENCE_END: &str = "/* End PBXFileReference section */";
const FRAMEWORKS_PHASE_BEGIN: &str = "/* Begin PBXFrameworksBuildPhase section */";
const GROUP_BEGIN: &str = "/* Begin PBXGroup section */";
const FRAMEWORKS_GROUP: &str = "/* Frameworks */ = {";
const LIST_END: &str = ");";

/// Sections patched in a descriptor of `kind`, in document order.
///
/// Application projects also embed each framework into the bundle, which
/// needs a second build file and a copy-files entry. Framework projects live
/// one level deeper, so their file references point to `../frameworks`.
pub fn framework_sections(kind: PackageKind) -> Vec<SectionSpec> {
    let embed = kind.embeds_frameworks();
    let frameworks_dir = if embed { "frameworks" } else { "../frameworks" };

    let mut build_files = SectionSpec::new("PBXBuildFile", &[BUILD_FILE_BEGIN], BUILD_FILE_END)
        .key("/* ", " in ")
        .template(
            "{build_file_id} /* {name} in Frameworks */ = {isa = PBXBuildFile; fileRef = {file_ref_id} /* {name} */; };",
        );
    if embed {
        build_files = build_files.template(
            "{embed_id} /* {name} in Embed Frameworks */ = {isa = PBXBuildFile; fileRef = {file_ref_id} /* {name} */; settings = {ATTRIBUTES = (CodeSignOnCopy, RemoveHeadersOnCopy, ); }; };",
        );
    }

    let mut sections = vec![build_files];
    if embed {
        sections.push(
            SectionSpec::new(
                "PBXCopyFilesBuildPhase",
                &[COPY_FILES_BEGIN, "files = ("],
                LIST_END,
            )
            .key("/* ", " in ")
            .template("{embed_id} /* {name} in Embed Frameworks */,"),
        );
    }
    sections.push(
        SectionSpec::new(
            "PBXFileReference",
            &[FILE_REFERENCE_BEGIN],
            FILE_REFERENCE_END,
        )
        .template(&format!(
            "{{file_ref_id}} /* {{name}} */ = {{isa = PBXFileReference; lastKnownFileType = wrapper.xcframework; name = {{name}}; path = {frameworks_dir}/{{name}}; sourceTree = \"<group>\"; }};"
        )),
    );
    sections.push(
        SectionSpec::new(
            "PBXFrameworksBuildPhase",
            &[FRAMEWORKS_PHASE_BEGIN, "files = ("],
            LIST_END,
        )
        .key("/* ", " in ")
        .template("{build_file_id} /* {name} in Frameworks */,"),
    );
    sections.push(
        SectionSpec::new(
            "PBXGroup",
            &[GROUP_BEGIN, FRAMEWORKS_GROUP, "children = ("],
            LIST_END,
        )
        .template("{file_ref_id} /* {name} */,"),
    );
    sections
}

/// Entries a pbxproj patch may remove when no explicit set is known.
pub fn default_managed() -> ManagedNames {
    ManagedNames::WithExtension(FRAMEWORK_FILE_TYPE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{IdGenerator, PatchOptions, patch};

    struct Counter(u64);

    impl IdGenerator for Counter {
        fn next_id(&mut self) -> String {
            self.0 += 1;
            format!("{:024X}", self.0)
        }
    }

    const APP: &str = r#"// !$*UTF8*$!
{
	objects = {

/* Begin PBXBuildFile section */
		1E0000000000000000000001 /* AppDelegate.m in Sources */ = {isa = PBXBuildFile; fileRef = 1E0000000000000000000002 /* AppDelegate.m */; };
		1E0000000000000000000003 /* libarkui_ios.xcframework in Frameworks */ = {isa = PBXBuildFile; fileRef = 1E0000000000000000000004 /* libarkui_ios.xcframework */; };
		1E0000000000000000000005 /* libarkui_ios.xcframework in Embed Frameworks */ = {isa = PBXBuildFile; fileRef = 1E0000000000000000000004 /* libarkui_ios.xcframework */; settings = {ATTRIBUTES = (CodeSignOnCopy, RemoveHeadersOnCopy, ); }; };
/* End PBXBuildFile section */

/* Begin PBXCopyFilesBuildPhase section */
		1E0000000000000000000006 /* Embed Frameworks */ = {
			isa = PBXCopyFilesBuildPhase;
			buildActionMask = 2147483647;
			dstPath = "";
			dstSubfolderSpec = 10;
			files = (
				1E0000000000000000000005 /* libarkui_ios.xcframework in Embed Frameworks */,
			);
			name = "Embed Frameworks";
			runOnlyForDeploymentPostprocessing = 0;
		};
/* End PBXCopyFilesBuildPhase section */

/* Begin PBXFileReference section */
		1E0000000000000000000002 /* AppDelegate.m */ = {isa = PBXFileReference; lastKnownFileType = sourcecode.c.objc; path = AppDelegate.m; sourceTree = "<group>"; };
		1E0000000000000000000004 /* libarkui_ios.xcframework */ = {isa = PBXFileReference; lastKnownFileType = wrapper.xcframework; name = libarkui_ios.xcframework; path = frameworks/libarkui_ios.xcframework; sourceTree = "<group>"; };
/* End PBXFileReference section */

/* Begin PBXFrameworksBuildPhase section */
		1E0000000000000000000007 /* Frameworks */ = {
			isa = PBXFrameworksBuildPhase;
			buildActionMask = 2147483647;
			files = (
				1E0000000000000000000003 /* libarkui_ios.xcframework in Frameworks */,
			);
			runOnlyForDeploymentPostprocessing = 0;
		};
/* End PBXFrameworksBuildPhase section */

/* Begin PBXGroup section */
		1E0000000000000000000008 /* app */ = {
			isa = PBXGroup;
			children = (
				1E0000000000000000000002 /* AppDelegate.m */,
			);
			path = app;
			sourceTree = "<group>";
		};
		1E0000000000000000000009 /* Frameworks */ = {
			isa = PBXGroup;
			children = (
				1E0000000000000000000004 /* libarkui_ios.xcframework */,
			);
			name = Frameworks;
			sourceTree = "<group>";
		};
/* End PBXGroup section */
	};
}
"#;

    #[test]
    fn test_app_sections_register_embedded_framework() {
        let options = PatchOptions {
            prune: true,
            managed: default_managed(),
        };
        let required = vec![
            "libarkui_ios.xcframework".to_string(),
            "libhttp.xcframework".to_string(),
        ];
        let out = patch(
            APP,
            &required,
            &framework_sections(PackageKind::App),
            &options,
            &mut Counter(0),
        )
        .unwrap();

        let ids = ["000000000000000000000001", "000000000000000000000002", "000000000000000000000003"];
        assert!(out.text.contains(&format!(
            "\t\t{} /* libhttp.xcframework in Frameworks */ = {{isa = PBXBuildFile; fileRef = {} /* libhttp.xcframework */; }};\n",
            ids[0], ids[2]
        )));
        assert!(out.text.contains(&format!(
            "\t\t{} /* libhttp.xcframework in Embed Frameworks */ = {{isa = PBXBuildFile; fileRef = {} /* libhttp.xcframework */; settings = {{ATTRIBUTES = (CodeSignOnCopy, RemoveHeadersOnCopy, ); }}; }};\n",
            ids[1], ids[2]
        )));
        assert!(out.text.contains(&format!(
            "\t\t\t\t{} /* libhttp.xcframework in Embed Frameworks */,\n\t\t\t);\n\t\t\tname = \"Embed Frameworks\";",
            ids[1]
        )));
        assert!(out.text.contains("path = frameworks/libhttp.xcframework;"));
        assert!(out.text.contains(&format!(
            "\t\t\t\t{} /* libhttp.xcframework */,\n\t\t\t);\n\t\t\tname = Frameworks;",
            ids[2]
        )));
        // The app group keeps its children untouched.
        assert!(out.text.contains(
            "\t\t\t\t1E0000000000000000000002 /* AppDelegate.m */,\n\t\t\t);\n\t\t\tpath = app;"
        ));
        assert!(out.removed.is_empty());
        assert_eq!(out.text.matches("libarkui_ios.xcframework in Frameworks").count(), 2);
    }

    #[test]
    fn test_app_prune_removes_every_reference() {
        let options = PatchOptions {
            prune: true,
            managed: default_managed(),
        };
        let out = patch(
            APP,
            &[],
            &framework_sections(PackageKind::App),
            &options,
            &mut Counter(0),
        )
        .unwrap();

        assert!(!out.text.contains("libarkui_ios"));
        assert!(out.text.contains("/* AppDelegate.m in Sources */"));
        assert!(out.text.contains("\t\t\tfiles = (\n\t\t\t);"));
    }

    #[test]
    fn test_framework_kind_sections() {
        let sections = framework_sections(PackageKind::Framework);
        let names: Vec<&str> = sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["PBXBuildFile", "PBXFileReference", "PBXFrameworksBuildPhase", "PBXGroup"]
        );
        assert_eq!(sections[0].templates.len(), 1);
        assert!(sections[1].templates[0].contains("path = ../frameworks/{name};"));
    }
}
