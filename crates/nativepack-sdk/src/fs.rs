//! Filesystem abstraction.
//!
//! Every read, copy and delete performed by the packaging pipeline goes
//! through the [`Filesystem`] trait so the pipeline can be exercised without
//! touching the disk:
//!
//! | Implementation | Backing store |
//! |----------------|---------------|
//! | [`OsFs`] | The real filesystem (`std::fs`, `tempfile` for atomic writes) |
//! | [`MemoryFs`] | An in-memory tree, including directory symlinks |
//!
//! Directory artifacts are mirrored with [`copy_tree`], an explicit worklist
//! that bounds nesting depth and never enters the same directory twice.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use crate::types::PackError;

/// Maximum directory nesting followed by [`copy_tree`].
pub const MAX_COPY_DEPTH: usize = 64;

/// Blocking filesystem operations used by the pipeline.
pub trait Filesystem {
    /// Returns `true` if the path exists (file or directory).
    fn exists(&self, path: &Path) -> bool;

    /// Returns `true` if the path is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Lists the entries of a directory as full paths, sorted by name.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>, PackError>;

    /// Reads a whole file as UTF-8.
    fn read_to_string(&self, path: &Path) -> Result<String, PackError>;

    /// Creates a directory and all missing parents.
    fn create_dir_all(&self, path: &Path) -> Result<(), PackError>;

    /// Copies a single file, overwriting the destination.
    fn copy_file(&self, from: &Path, to: &Path) -> Result<(), PackError>;

    /// Removes a single file.
    fn remove_file(&self, path: &Path) -> Result<(), PackError>;

    /// Removes a directory and everything below it.
    fn remove_dir_all(&self, path: &Path) -> Result<(), PackError>;

    /// Replaces a file's contents through a temporary file and a rename.
    fn write_atomic(&self, path: &Path, contents: &str) -> Result<(), PackError>;

    /// Resolves symlinks, falling back to the path itself.
    fn canonicalize(&self, path: &Path) -> PathBuf;
}

/// Mirrors the directory `src` into `dest` (which becomes a copy of `src`).
///
/// Returns the number of files copied. Directories reached twice through
/// symlinks are skipped; nesting deeper than [`MAX_COPY_DEPTH`] is an error.
pub fn copy_tree(fs: &dyn Filesystem, src: &Path, dest: &Path) -> Result<usize, PackError> {
    let mut visited = HashSet::new();
    let mut worklist = vec![(src.to_path_buf(), dest.to_path_buf(), 0usize)];
    let mut copied = 0;

    while let Some((from_dir, to_dir, depth)) = worklist.pop() {
        if depth > MAX_COPY_DEPTH {
            return Err(PackError::Config(format!(
                "directory nesting below {} exceeds {} levels",
                src.display(),
                MAX_COPY_DEPTH
            )));
        }
        if !visited.insert(fs.canonicalize(&from_dir)) {
            tracing::debug!("skipping already copied directory {}", from_dir.display());
            continue;
        }
        fs.create_dir_all(&to_dir)?;
        for entry in fs.read_dir(&from_dir)? {
            let Some(name) = entry.file_name() else {
                continue;
            };
            let target = to_dir.join(name);
            if fs.is_dir(&entry) {
                worklist.push((entry, target, depth + 1));
            } else {
                fs.copy_file(&entry, &target)?;
                copied += 1;
            }
        }
    }

    Ok(copied)
}

/// Returns the last path component as a string, or the whole input.
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFs;

impl Filesystem for OsFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>, PackError> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path).map_err(|e| PackError::io(path, e))? {
            let entry = entry.map_err(|e| PackError::io(path, e))?;
            entries.push(entry.path());
        }
        entries.sort();
        Ok(entries)
    }

    fn read_to_string(&self, path: &Path) -> Result<String, PackError> {
        std::fs::read_to_string(path).map_err(|e| PackError::io(path, e))
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), PackError> {
        std::fs::create_dir_all(path).map_err(|e| PackError::io(path, e))
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<(), PackError> {
        std::fs::copy(from, to)
            .map(|_| ())
            .map_err(|e| PackError::io(to, e))
    }

    fn remove_file(&self, path: &Path) -> Result<(), PackError> {
        std::fs::remove_file(path).map_err(|e| PackError::io(path, e))
    }

    fn remove_dir_all(&self, path: &Path) -> Result<(), PackError> {
        std::fs::remove_dir_all(path).map_err(|e| PackError::io(path, e))
    }

    fn write_atomic(&self, path: &Path, contents: &str) -> Result<(), PackError> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| PackError::io(parent, e))?;
        tmp.write_all(contents.as_bytes())
            .map_err(|e| PackError::io(tmp.path(), e))?;
        // The temporary file is created 0600; the replaced file keeps its mode.
        if let Ok(metadata) = std::fs::metadata(path) {
            tmp.as_file()
                .set_permissions(metadata.permissions())
                .map_err(|e| PackError::io(tmp.path(), e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| PackError::io(tmp.path(), e))?;
        tmp.persist(path).map_err(|e| PackError::io(path, e.error))?;
        Ok(())
    }

    fn canonicalize(&self, path: &Path) -> PathBuf {
        std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    }
}

#[derive(Debug, Clone)]
enum Node {
    File(String),
    Dir,
    Link(PathBuf),
}

/// An in-memory filesystem for tests and dry runs.
///
/// Paths are stored as given (no `..` normalization). Adding a file creates
/// its parent directories. Directory symlinks are supported through
/// [`MemoryFs::add_symlink`].
#[derive(Debug, Default)]
pub struct MemoryFs {
    nodes: RefCell<BTreeMap<PathBuf, Node>>,
}

impl MemoryFs {
    /// Creates an empty filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a file, creating parent directories.
    pub fn add_file(&self, path: impl AsRef<Path>, contents: impl Into<String>) {
        let path = self.resolve(path.as_ref());
        if let Some(parent) = path.parent() {
            self.insert_dirs(parent);
        }
        self.nodes
            .borrow_mut()
            .insert(path, Node::File(contents.into()));
    }

    /// Adds a directory and its parents.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = self.resolve(path.as_ref());
        self.insert_dirs(&path);
    }

    /// Adds a symlink at `link` pointing at `target`.
    pub fn add_symlink(&self, link: impl AsRef<Path>, target: impl AsRef<Path>) {
        let link = link.as_ref().to_path_buf();
        if let Some(parent) = link.parent() {
            self.insert_dirs(parent);
        }
        self.nodes
            .borrow_mut()
            .insert(link, Node::Link(target.as_ref().to_path_buf()));
    }

    /// Returns the contents of a file, if present.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        match self.nodes.borrow().get(&self.resolve(path.as_ref())) {
            Some(Node::File(contents)) => Some(contents.clone()),
            _ => None,
        }
    }

    /// Returns every file path currently stored, sorted.
    pub fn files(&self) -> Vec<PathBuf> {
        self.nodes
            .borrow()
            .iter()
            .filter(|(_, node)| matches!(node, Node::File(_)))
            .map(|(path, _)| path.clone())
            .collect()
    }

    fn insert_dirs(&self, path: &Path) {
        let mut nodes = self.nodes.borrow_mut();
        let mut current = PathBuf::new();
        for component in path.components() {
            current.push(component);
            nodes.entry(current.clone()).or_insert(Node::Dir);
        }
    }

    /// Substitutes symlinked prefixes with their targets.
    fn resolve(&self, path: &Path) -> PathBuf {
        let nodes = self.nodes.borrow();
        let mut out = PathBuf::new();
        for component in path.components() {
            if let Component::ParentDir = component {
                out.pop();
                continue;
            }
            out.push(component);
            let mut hops = 0;
            while let Some(Node::Link(target)) = nodes.get(&out) {
                out = target.clone();
                hops += 1;
                if hops > MAX_COPY_DEPTH {
                    break;
                }
            }
        }
        out
    }

    fn not_found(path: &Path) -> PackError {
        PackError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file or directory"),
        )
    }
}

impl Filesystem for MemoryFs {
    fn exists(&self, path: &Path) -> bool {
        self.nodes.borrow().contains_key(&self.resolve(path))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.nodes.borrow().get(&self.resolve(path)), Some(Node::Dir))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>, PackError> {
        let real = self.resolve(path);
        let nodes = self.nodes.borrow();
        if !matches!(nodes.get(&real), Some(Node::Dir)) {
            return Err(Self::not_found(path));
        }
        Ok(nodes
            .keys()
            .filter(|key| key.parent() == Some(real.as_path()))
            .filter_map(|key| key.file_name().map(|name| path.join(name)))
            .collect())
    }

    fn read_to_string(&self, path: &Path) -> Result<String, PackError> {
        self.contents(path).ok_or_else(|| Self::not_found(path))
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), PackError> {
        let real = self.resolve(path);
        let blocked = {
            let nodes = self.nodes.borrow();
            real.ancestors()
                .any(|dir| matches!(nodes.get(dir), Some(Node::File(_))))
        };
        if blocked {
            return Err(PackError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "a file is in the way"),
            ));
        }
        self.add_dir(path);
        Ok(())
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<(), PackError> {
        let contents = self.read_to_string(from)?;
        let parent = to.parent().map(|p| self.resolve(p));
        match parent {
            Some(parent) if !parent.as_os_str().is_empty() && !self.is_dir(&parent) => {
                Err(Self::not_found(&parent))
            }
            _ => {
                self.add_file(to, contents);
                Ok(())
            }
        }
    }

    fn remove_file(&self, path: &Path) -> Result<(), PackError> {
        let real = self.resolve(path);
        match self.nodes.borrow_mut().remove(&real) {
            Some(_) => Ok(()),
            None => Err(Self::not_found(path)),
        }
    }

    fn remove_dir_all(&self, path: &Path) -> Result<(), PackError> {
        let real = self.resolve(path);
        let mut nodes = self.nodes.borrow_mut();
        if nodes.remove(&real).is_none() {
            return Err(Self::not_found(path));
        }
        nodes.retain(|key, _| !key.starts_with(&real));
        Ok(())
    }

    fn write_atomic(&self, path: &Path, contents: &str) -> Result<(), PackError> {
        self.add_file(path, contents);
        Ok(())
    }

    fn canonicalize(&self, path: &Path) -> PathBuf {
        self.resolve(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_fs_read_dir_sorted() {
        let fs = MemoryFs::new();
        fs.add_file("/root/b.so", "b");
        fs.add_file("/root/a.so", "a");
        fs.add_dir("/root/sub");

        let entries = fs.read_dir(Path::new("/root")).unwrap();
        assert_eq!(
            entries,
            vec![
                PathBuf::from("/root/a.so"),
                PathBuf::from("/root/b.so"),
                PathBuf::from("/root/sub"),
            ]
        );
    }

    #[test]
    fn test_copy_tree_mirrors_nested_bundle() {
        let fs = MemoryFs::new();
        fs.add_file("/sdk/libfoo.xcframework/Info.plist", "plist");
        fs.add_file("/sdk/libfoo.xcframework/ios-arm64/libfoo.a", "lib");

        let copied = copy_tree(
            &fs,
            Path::new("/sdk/libfoo.xcframework"),
            Path::new("/proj/frameworks/libfoo.xcframework"),
        )
        .unwrap();

        assert_eq!(copied, 2);
        assert_eq!(
            fs.contents("/proj/frameworks/libfoo.xcframework/ios-arm64/libfoo.a"),
            Some("lib".to_string())
        );
    }

    #[test]
    fn test_copy_tree_survives_symlink_cycle() {
        let fs = MemoryFs::new();
        fs.add_file("/sdk/bundle/data.bin", "x");
        fs.add_symlink("/sdk/bundle/loop", "/sdk/bundle");

        let copied = copy_tree(&fs, Path::new("/sdk/bundle"), Path::new("/out/bundle")).unwrap();

        assert_eq!(copied, 1);
        assert_eq!(fs.contents("/out/bundle/data.bin"), Some("x".to_string()));
    }

    #[test]
    fn test_memory_remove_dir_all() {
        let fs = MemoryFs::new();
        fs.add_file("/d/x/1", "1");
        fs.add_file("/d/x/y/2", "2");
        fs.add_file("/d/keep", "k");

        fs.remove_dir_all(Path::new("/d/x")).unwrap();

        assert!(!fs.exists(Path::new("/d/x/y/2")));
        assert!(fs.exists(Path::new("/d/keep")));
    }

    #[test]
    fn test_os_write_atomic_replaces_contents() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("project.pbxproj");
        std::fs::write(&path, "old").unwrap();

        OsFs.write_atomic(&path, "new").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        // Only the target remains; the temporary file was renamed over it.
        let names: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_os_write_atomic_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("project.pbxproj");
        std::fs::write(&path, "old").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

        OsFs.write_atomic(&path, "new").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[test]
    fn test_memory_create_dir_blocked_by_file() {
        let fs = MemoryFs::new();
        fs.add_file("/app/libs", "file");

        let err = fs.create_dir_all(Path::new("/app/libs/arm64-v8a")).unwrap_err();

        assert!(matches!(err, PackError::Io { .. }));
        assert!(!fs.is_dir(Path::new("/app/libs")));
    }

    #[test]
    fn test_os_copy_tree() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        std::fs::create_dir_all(src.join("nested")).unwrap();
        std::fs::write(src.join("nested/file.txt"), "hello").unwrap();

        let dest = temp_dir.path().join("dest");
        let copied = copy_tree(&OsFs, &src, &dest).unwrap();

        assert_eq!(copied, 1);
        assert_eq!(
            std::fs::read_to_string(dest.join("nested/file.txt")).unwrap(),
            "hello"
        );
    }
}
