//! Resolution of credential locators to bytes.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// Resolves a named resource locator to its content.
pub trait ResourceResolver: Send + Sync {
    fn resolve(&self, locator: &str) -> io::Result<Vec<u8>>;
}

/// Reads locators as file paths; relative paths are joined onto `base`.
#[derive(Debug, Clone)]
pub struct FsResolver {
    base: PathBuf,
}

impl FsResolver {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn path_for(&self, locator: &str) -> PathBuf {
        let path = Path::new(locator);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base.join(path)
        }
    }
}

impl ResourceResolver for FsResolver {
    fn resolve(&self, locator: &str) -> io::Result<Vec<u8>> {
        std::fs::read(self.path_for(locator))
    }
}

/// In-memory resources, e.g. credentials compiled into the binary.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    entries: HashMap<String, Vec<u8>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, locator: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(locator, bytes);
        self
    }

    pub fn insert(&mut self, locator: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.entries.insert(locator.into(), bytes.into());
    }
}

impl ResourceResolver for StaticResolver {
    fn resolve(&self, locator: &str) -> io::Result<Vec<u8>> {
        self.entries.get(locator).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no resource '{locator}'"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_resolver_joins_relative_paths() {
        let dir = std::env::temp_dir().join(format!("ts-resources-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("device.pem"), b"pem-bytes").unwrap();

        let resolver = FsResolver::new(&dir);
        assert_eq!(resolver.resolve("device.pem").unwrap(), b"pem-bytes");

        let absolute = dir.join("device.pem");
        assert_eq!(
            resolver.resolve(absolute.to_str().unwrap()).unwrap(),
            b"pem-bytes"
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn fs_resolver_missing_file_is_not_found() {
        let resolver = FsResolver::new("/nonexistent");
        let err = resolver.resolve("cert.pem").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn static_resolver_lookup() {
        let resolver = StaticResolver::new().with("key.pem", b"k".to_vec());
        assert_eq!(resolver.resolve("key.pem").unwrap(), b"k");
        assert_eq!(
            resolver.resolve("other.pem").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }
}
