//! Locating the proxy executable on disk

use std::path::{Path, PathBuf};

/// Executable name of the proxy
pub const BINARY_NAME: &str = "spoofdpi";

/// Package-manager install prefixes, Apple Silicon first
pub const PACKAGE_MANAGER_PREFIXES: &[&str] = &["/opt/homebrew/bin", "/usr/local/bin"];

/// Ordered list of candidate paths; the first existing one wins
#[derive(Debug, Clone)]
pub struct BinaryLocator {
    candidates: Vec<PathBuf>,
}

impl BinaryLocator {
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Self { candidates }
    }

    /// Package-manager prefixes only
    pub fn package_manager(name: &str) -> Self {
        Self::new(
            PACKAGE_MANAGER_PREFIXES
                .iter()
                .map(|prefix| Path::new(prefix).join(name))
                .collect(),
        )
    }

    /// Package-manager prefixes followed by the copy bundled next to our executable
    pub fn for_binary(name: &str) -> Self {
        let mut locator = Self::package_manager(name);
        if let Some(bundled) = bundled_path(name) {
            locator.candidates.push(bundled);
        }
        locator
    }

    /// Put an explicit path ahead of every other candidate
    pub fn with_override(mut self, path: PathBuf) -> Self {
        self.candidates.insert(0, path);
        self
    }

    pub fn find_binary(&self) -> Option<PathBuf> {
        self.candidates.iter().find(|path| path.is_file()).cloned()
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }
}

#[cfg(target_os = "macos")]
fn bundled_path(name: &str) -> Option<PathBuf> {
    // <App>.app/Contents/MacOS/<exe> -> <App>.app/Contents/Resources/<name>
    let exe = std::env::current_exe().ok()?;
    let contents = exe.parent()?.parent()?;
    Some(contents.join("Resources").join(name))
}

#[cfg(not(target_os = "macos"))]
fn bundled_path(name: &str) -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    Some(exe.parent()?.join(name))
}
