//! The resource-reading contract rendering behaviours depend on.
//!
//! The core never touches a filesystem directly; anything that needs an
//! external template or data file goes through a [`ResourceAdapter`]. The
//! stock [`FileResources`] adapter roots all lookups under one directory.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Component, Path, PathBuf};

/// Read-only access to resources external to the process.
///
/// Paths are relative, `/`-separated, and interpreted by the adapter.
pub trait ResourceAdapter: Send + Sync {
    /// Whether the relative path resolves to an existing resource.
    fn exists(&self, path: &str) -> bool;

    /// Opens a stream on the resource.
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>>;

    /// Reads the whole resource as bytes.
    fn read_all_bytes(&self, path: &str) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.open(path)?.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Reads the whole resource as UTF-8 text.
    fn read_all_text(&self, path: &str) -> io::Result<String> {
        let mut text = String::new();
        self.open(path)?.read_to_string(&mut text)?;
        Ok(text)
    }

    /// Reads the resource lazily, line by line.
    fn read_lines(
        &self,
        path: &str,
    ) -> io::Result<Box<dyn Iterator<Item = io::Result<String>> + Send>> {
        let reader = BufReader::new(self.open(path)?);
        Ok(Box::new(reader.lines()))
    }
}

/// A filesystem adapter rooted at a base directory.
///
/// Relative paths may not escape the root; a path with `..` or an absolute
/// component is treated as invalid input.
#[derive(Debug, Clone)]
pub struct FileResources {
    root: PathBuf,
}

impl FileResources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileResources { root: root.into() }
    }

    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("resource path '{path}' escapes the resource root"),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl ResourceAdapter for FileResources {
    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_file()).unwrap_or(false)
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        let file = File::open(self.resolve(path)?)?;
        Ok(Box::new(file))
    }
}

/// An adapter with no resources at all, for contexts that never render.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullResources;

impl ResourceAdapter for NullResources {
    fn exists(&self, _path: &str) -> bool {
        false
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no resource '{path}': this context has no resources"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture() -> (tempfile::TempDir, FileResources) {
        let dir = tempfile::tempdir().unwrap();
        let mut file = File::create(dir.path().join("greeting.txt")).unwrap();
        writeln!(file, "hello").unwrap();
        writeln!(file, "world").unwrap();
        let resources = FileResources::new(dir.path());
        (dir, resources)
    }

    #[test]
    fn reads_existing_resources() {
        let (_dir, resources) = fixture();
        assert!(resources.exists("greeting.txt"));
        assert!(!resources.exists("missing.txt"));
        assert_eq!(resources.read_all_text("greeting.txt").unwrap(), "hello\nworld\n");
        assert_eq!(resources.read_all_bytes("greeting.txt").unwrap().len(), 12);

        let lines: Vec<String> = resources
            .read_lines("greeting.txt")
            .unwrap()
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(lines, vec!["hello", "world"]);
    }

    #[test]
    fn rejects_paths_escaping_the_root() {
        let (_dir, resources) = fixture();
        assert!(!resources.exists("../greeting.txt"));
        let err = resources.read_all_text("../greeting.txt").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn null_resources_have_nothing() {
        assert!(!NullResources.exists("anything"));
        assert!(NullResources.open("anything").is_err());
    }
}
