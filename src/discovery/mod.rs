//! Discovery: locate workload definitions, then reduce them to services

pub mod locator;
pub mod reducer;

pub use locator::{DefaultSkipRule, DefinitionFile, DefinitionLocator, LocatedDefinitions, SkipRule};
pub use reducer::{DefinitionReducer, NameCollision, Reduction, SkippedDefinition};

use crate::fs::FileSystem;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Produces one scan cycle's worth of service definitions
pub trait ScanSource: Send + Sync {
    fn scan(&self) -> Result<Reduction>;
}

/// Locator followed by reducer over a single root directory
pub struct DiscoveryPipeline<F: FileSystem> {
    root: PathBuf,
    locator: DefinitionLocator<Arc<F>>,
    reducer: DefinitionReducer<Arc<F>>,
}

impl<F: FileSystem> DiscoveryPipeline<F> {
    pub fn new(root: impl Into<PathBuf>, fs: F) -> Self {
        let fs = Arc::new(fs);
        Self {
            root: root.into(),
            locator: DefinitionLocator::new(Arc::clone(&fs)),
            reducer: DefinitionReducer::new(fs),
        }
    }

    pub fn with_skip_rule(root: impl Into<PathBuf>, fs: F, skip: impl SkipRule + 'static) -> Self {
        let fs = Arc::new(fs);
        Self {
            root: root.into(),
            locator: DefinitionLocator::with_skip_rule(Arc::clone(&fs), skip),
            reducer: DefinitionReducer::new(fs),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl<F: FileSystem> ScanSource for DiscoveryPipeline<F> {
    fn scan(&self) -> Result<Reduction> {
        let start = Instant::now();

        let located = self
            .locator
            .locate(&self.root)
            .with_context(|| format!("Failed to locate definitions under {:?}", self.root))?;
        let reduction = self.reducer.reduce(&located);

        info!(
            root = %self.root.display(),
            files = located.len(),
            services = reduction.services.len(),
            collisions = reduction.collisions.len(),
            skipped = reduction.skipped.len() + located.unreadable_dirs.len(),
            duration_ms = start.elapsed().as_millis(),
            "Discovery complete"
        );

        Ok(reduction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystem;

    #[test]
    fn test_pipeline_scan() {
        let fs = MockFileSystem::new();
        fs.add_file("app/Dockerfile", "EXPOSE 8080\nENV FOO=bar");
        fs.add_file("stack/docker-compose.yml", "services:\n  db:\n    image: postgres\n");
        fs.add_file("node_modules/x/Dockerfile", "EXPOSE 1");

        let pipeline = DiscoveryPipeline::new("/mock", fs);
        let reduction = pipeline.scan().unwrap();

        assert_eq!(
            reduction.services.keys().collect::<Vec<_>>(),
            vec!["app", "db"]
        );
    }

    #[test]
    fn test_pipeline_scan_is_idempotent() {
        let fs = MockFileSystem::new();
        fs.add_file("app/Dockerfile", "EXPOSE 8080");
        fs.add_file("docker-compose.yml", "services:\n  web:\n    ports: [\"80:80\"]\n");

        let pipeline = DiscoveryPipeline::new("/mock", fs);
        let first = pipeline.scan().unwrap();
        let second = pipeline.scan().unwrap();

        assert_eq!(first.services, second.services);
    }

    #[test]
    fn test_pipeline_missing_root_fails() {
        let pipeline = DiscoveryPipeline::new("/nowhere", MockFileSystem::new());
        assert!(pipeline.scan().is_err());
    }
}
