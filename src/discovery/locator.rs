//! Finds Dockerfiles and compose manifests under a root directory

use crate::fs::FileSystem;
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const BUILD_FILE_NAME: &str = "Dockerfile";
pub const BUILD_FILE_SUFFIX: &str = ".dockerfile";
pub const MANIFEST_NAMES: &[&str] = &["docker-compose.yml", "docker-compose.yaml"];
pub const DEFAULT_CACHE_DIRS: &[&str] = &["node_modules"];

/// Decides which directories the walk never descends into
pub trait SkipRule: Send + Sync {
    fn skip_dir(&self, name: &str, path: &Path) -> bool;
}

impl<F> SkipRule for F
where
    F: Fn(&str, &Path) -> bool + Send + Sync,
{
    fn skip_dir(&self, name: &str, path: &Path) -> bool {
        self(name, path)
    }
}

/// Skips hidden directories and dependency caches matched by exact name
#[derive(Debug, Clone)]
pub struct DefaultSkipRule {
    cache_dirs: Vec<String>,
}

impl DefaultSkipRule {
    pub fn with_cache_dirs<I, S>(cache_dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cache_dirs: cache_dirs.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for DefaultSkipRule {
    fn default() -> Self {
        Self::with_cache_dirs(DEFAULT_CACHE_DIRS.iter().copied())
    }
}

impl SkipRule for DefaultSkipRule {
    fn skip_dir(&self, name: &str, _path: &Path) -> bool {
        name.starts_with('.') || self.cache_dirs.iter().any(|dir| dir == name)
    }
}

/// Recognized workload-definition file kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFile {
    BuildFile,
    Manifest,
}

impl DefinitionFile {
    pub fn classify(file_name: &str) -> Option<Self> {
        if file_name == BUILD_FILE_NAME || file_name.ends_with(BUILD_FILE_SUFFIX) {
            Some(DefinitionFile::BuildFile)
        } else if MANIFEST_NAMES.contains(&file_name) {
            Some(DefinitionFile::Manifest)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocatedDefinitions {
    pub build_files: Vec<PathBuf>,
    pub manifests: Vec<PathBuf>,
    /// Subtrees omitted because their listing failed
    pub unreadable_dirs: Vec<PathBuf>,
}

impl LocatedDefinitions {
    pub fn len(&self) -> usize {
        self.build_files.len() + self.manifests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct DefinitionLocator<F: FileSystem> {
    fs: F,
    skip: Box<dyn SkipRule>,
}

impl<F: FileSystem> DefinitionLocator<F> {
    pub fn new(fs: F) -> Self {
        Self::with_skip_rule(fs, DefaultSkipRule::default())
    }

    pub fn with_skip_rule(fs: F, skip: impl SkipRule + 'static) -> Self {
        Self {
            fs,
            skip: Box::new(skip),
        }
    }

    /// Walks `root` depth-first.
    ///
    /// Entries of each directory are visited in name order, so the result is
    /// stable for an unchanged tree. Symlinks are never followed.
    pub fn locate(&self, root: &Path) -> Result<LocatedDefinitions> {
        if !self.fs.is_dir(root) {
            bail!("Scan root {:?} is not a directory", root);
        }

        let mut located = LocatedDefinitions::default();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let mut entries = match self.fs.read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Failed to read directory, skipping subtree");
                    located.unreadable_dirs.push(dir);
                    continue;
                }
            };
            entries.sort_by(|a, b| a.name.cmp(&b.name));

            let mut subdirs = Vec::new();
            for entry in entries {
                if entry.is_dir() {
                    if self.skip.skip_dir(entry.file_name(), entry.path()) {
                        debug!(dir = %entry.path().display(), "Skipping directory");
                    } else {
                        subdirs.push(entry.path);
                    }
                } else if entry.is_file() {
                    match DefinitionFile::classify(entry.file_name()) {
                        Some(DefinitionFile::BuildFile) => located.build_files.push(entry.path),
                        Some(DefinitionFile::Manifest) => located.manifests.push(entry.path),
                        None => {}
                    }
                }
            }

            pending.extend(subdirs.into_iter().rev());
        }

        debug!(
            root = %root.display(),
            build_files = located.build_files.len(),
            manifests = located.manifests.len(),
            "Located workload definitions"
        );

        Ok(located)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystem;

    fn paths(items: &[&str]) -> Vec<PathBuf> {
        items.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_classify() {
        assert_eq!(DefinitionFile::classify("Dockerfile"), Some(DefinitionFile::BuildFile));
        assert_eq!(DefinitionFile::classify("api.dockerfile"), Some(DefinitionFile::BuildFile));
        assert_eq!(DefinitionFile::classify("docker-compose.yml"), Some(DefinitionFile::Manifest));
        assert_eq!(DefinitionFile::classify("docker-compose.yaml"), Some(DefinitionFile::Manifest));
        assert_eq!(DefinitionFile::classify("Dockerfile.dev"), None);
        assert_eq!(DefinitionFile::classify("compose.yml"), None);
        assert_eq!(DefinitionFile::classify("dockerfile"), None);
    }

    #[test]
    fn test_locate_finds_both_kinds() {
        let fs = MockFileSystem::new();
        fs.add_file("app/Dockerfile", "FROM alpine");
        fs.add_file("services/worker/worker.dockerfile", "FROM alpine");
        fs.add_file("docker-compose.yml", "services: {}");
        fs.add_file("deploy/docker-compose.yaml", "services: {}");
        fs.add_file("README.md", "# readme");

        let located = DefinitionLocator::new(&fs).locate(Path::new("/mock")).unwrap();

        assert_eq!(
            located.build_files,
            paths(&["/mock/app/Dockerfile", "/mock/services/worker/worker.dockerfile"])
        );
        assert_eq!(
            located.manifests,
            paths(&["/mock/docker-compose.yml", "/mock/deploy/docker-compose.yaml"])
        );
    }

    #[test]
    fn test_locate_skips_hidden_and_cache_dirs() {
        let fs = MockFileSystem::new();
        fs.add_file(".git/Dockerfile", "FROM alpine");
        fs.add_file("node_modules/pkg/Dockerfile", "FROM alpine");
        fs.add_file("web/node_modules/dep/docker-compose.yml", "services: {}");
        fs.add_file("web/Dockerfile", "FROM nginx");

        let located = DefinitionLocator::new(&fs).locate(Path::new("/mock")).unwrap();

        assert_eq!(located.build_files, paths(&["/mock/web/Dockerfile"]));
        assert!(located.manifests.is_empty());
    }

    #[test]
    fn test_hidden_files_are_not_skipped() {
        let fs = MockFileSystem::new();
        fs.add_file(".hidden.dockerfile", "FROM alpine");

        let located = DefinitionLocator::new(&fs).locate(Path::new("/mock")).unwrap();
        assert_eq!(located.build_files, paths(&["/mock/.hidden.dockerfile"]));
    }

    #[test]
    fn test_unreadable_subtree_is_omitted() {
        let fs = MockFileSystem::new();
        fs.add_file("locked/Dockerfile", "FROM alpine");
        fs.add_file("open/Dockerfile", "FROM alpine");
        fs.fail_reads("locked");

        let located = DefinitionLocator::new(&fs).locate(Path::new("/mock")).unwrap();

        assert_eq!(located.build_files, paths(&["/mock/open/Dockerfile"]));
        assert_eq!(located.unreadable_dirs, paths(&["/mock/locked"]));
    }

    #[test]
    fn test_custom_skip_rule() {
        let fs = MockFileSystem::new();
        fs.add_file("vendor/Dockerfile", "FROM alpine");
        fs.add_file("app/Dockerfile", "FROM alpine");

        let locator =
            DefinitionLocator::with_skip_rule(&fs, |name: &str, _: &Path| name == "vendor");
        let located = locator.locate(Path::new("/mock")).unwrap();

        assert_eq!(located.build_files, paths(&["/mock/app/Dockerfile"]));
    }

    #[test]
    fn test_locate_is_deterministic() {
        let fs = MockFileSystem::new();
        for name in ["zeta", "alpha", "mid"] {
            fs.add_file(format!("{name}/Dockerfile"), "FROM alpine");
        }

        let locator = DefinitionLocator::new(&fs);
        let first = locator.locate(Path::new("/mock")).unwrap();
        let second = locator.locate(Path::new("/mock")).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            first.build_files,
            paths(&["/mock/alpha/Dockerfile", "/mock/mid/Dockerfile", "/mock/zeta/Dockerfile"])
        );
    }

    #[test]
    fn test_root_must_be_directory() {
        let fs = MockFileSystem::new();
        fs.add_file("Dockerfile", "FROM alpine");

        let locator = DefinitionLocator::new(&fs);
        assert!(locator.locate(Path::new("/mock/Dockerfile")).is_err());
        assert!(locator.locate(Path::new("/missing")).is_err());
    }
}
