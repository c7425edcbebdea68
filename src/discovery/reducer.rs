//! Folds parsed workload definitions into one service per name

use super::locator::LocatedDefinitions;
use crate::fs::FileSystem;
use crate::model::{PortToken, ServiceDefinition, ServiceKind};
use crate::parsers::{
    BuildFileParser, ComposeParser, ComposeService, DockerfileParser, Instruction, ManifestParser,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A later definition replaced an earlier one with the same name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameCollision {
    pub name: String,
    pub previous: PathBuf,
    pub replacement: PathBuf,
}

/// A definition file that could not be read or parsed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedDefinition {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct Reduction {
    pub services: BTreeMap<String, ServiceDefinition>,
    pub collisions: Vec<NameCollision>,
    pub skipped: Vec<SkippedDefinition>,
}

impl Reduction {
    fn insert(&mut self, definition: ServiceDefinition) {
        let name = definition.name.clone();
        let replacement = definition.source_path.clone();

        if let Some(previous) = self.services.insert(name.clone(), definition) {
            warn!(
                service = %name,
                previous = %previous.source_path.display(),
                replacement = %replacement.display(),
                "Duplicate service name detected, overwriting previous entry"
            );
            self.collisions.push(NameCollision {
                name,
                previous: previous.source_path,
                replacement,
            });
        }
    }

    fn skip(&mut self, path: &Path, reason: String) {
        self.skipped.push(SkippedDefinition {
            path: path.to_path_buf(),
            reason,
        });
    }
}

/// Reads and parses located definitions without writing anything
pub struct DefinitionReducer<F, B = DockerfileParser, M = ComposeParser> {
    fs: F,
    build_parser: B,
    manifest_parser: M,
}

impl<F: FileSystem> DefinitionReducer<F> {
    pub fn new(fs: F) -> Self {
        Self::with_parsers(fs, DockerfileParser::new(), ComposeParser::new())
    }
}

impl<F, B, M> DefinitionReducer<F, B, M>
where
    F: FileSystem,
    B: BuildFileParser,
    M: ManifestParser,
{
    pub fn with_parsers(fs: F, build_parser: B, manifest_parser: M) -> Self {
        Self {
            fs,
            build_parser,
            manifest_parser,
        }
    }

    /// Build files are folded first, then manifests, each in located order.
    /// The last definition processed for a name wins.
    pub fn reduce(&self, located: &LocatedDefinitions) -> Reduction {
        let mut reduction = Reduction::default();

        for path in &located.build_files {
            self.reduce_build_file(path, &mut reduction);
        }

        for path in &located.manifests {
            self.reduce_manifest(path, &mut reduction);
        }

        reduction
    }

    fn reduce_build_file(&self, path: &Path, reduction: &mut Reduction) {
        let Some(name) = service_name_for_build_file(path) else {
            warn!(path = %path.display(), "Cannot derive a service name from build file location");
            reduction.skip(path, "no parent directory name".to_string());
            return;
        };

        let content = match self.fs.read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read Dockerfile");
                reduction.skip(path, e.to_string());
                return;
            }
        };

        let instructions = match self.build_parser.parse(&content) {
            Ok(instructions) => instructions,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to parse Dockerfile");
                reduction.skip(path, e.to_string());
                return;
            }
        };

        let definition = fold_instructions(
            ServiceDefinition::new(name, ServiceKind::SingleContainer, path),
            &instructions,
        );
        debug!(service = %definition.name, path = %path.display(), "Reduced Dockerfile");
        reduction.insert(definition);
    }

    fn reduce_manifest(&self, path: &Path, reduction: &mut Reduction) {
        let content = match self.fs.read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read docker-compose file");
                reduction.skip(path, e.to_string());
                return;
            }
        };

        let manifest = match self.manifest_parser.parse(&content) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to parse docker-compose file");
                reduction.skip(path, e.to_string());
                return;
            }
        };

        for (name, service) in manifest.services {
            debug!(service = %name, path = %path.display(), "Reduced compose service");
            reduction.insert(composed_definition(name, service, path));
        }
    }
}

fn service_name_for_build_file(path: &Path) -> Option<String> {
    path.parent()?
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
}

fn fold_instructions(mut definition: ServiceDefinition, instructions: &[Instruction]) -> ServiceDefinition {
    for instruction in instructions {
        match instruction.name.as_str() {
            "EXPOSE" => {
                for arg in &instruction.args {
                    match PortToken::parse(arg) {
                        Some(token) => {
                            definition.exposed_ports.insert(token);
                        }
                        None => debug!(port = %arg, "Ignoring non-numeric EXPOSE token"),
                    }
                }
            }
            "ENV" => {
                for (key, value) in instruction.pairs() {
                    definition.environment.insert(key.to_string(), value.to_string());
                }
            }
            "WORKDIR" => definition.workdir = instruction.args.first().cloned(),
            "ENTRYPOINT" => definition.entrypoint = Some(instruction.args.clone()),
            "CMD" => definition.command = Some(instruction.args.clone()),
            _ => {}
        }
    }
    definition
}

fn composed_definition(name: String, service: ComposeService, path: &Path) -> ServiceDefinition {
    let mut definition = ServiceDefinition::new(name, ServiceKind::Composed, path);

    for spec in &service.ports {
        match spec.host_token().as_deref().and_then(PortToken::parse) {
            Some(token) => {
                definition.exposed_ports.insert(token);
            }
            None => debug!(service = %definition.name, port = ?spec, "Ignoring unusable port mapping"),
        }
    }

    definition.environment = service.environment.to_map();
    definition.image = service.image;
    definition.build_ref = service.build;
    definition
}
