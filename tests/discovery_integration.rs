//! Discovery against real directory trees
//!
//! Builds small repositories on disk and runs the full locate-then-reduce
//! pipeline over them through `RealFileSystem`.

use servicelens::discovery::{DiscoveryPipeline, ScanSource};
use servicelens::fs::RealFileSystem;
use servicelens::{ServiceKind, ServiceRegistry};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn scan(root: &Path) -> servicelens::Reduction {
    DiscoveryPipeline::new(root, RealFileSystem).scan().unwrap()
}

#[test]
fn test_dockerfile_service() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "app/Dockerfile", "FROM node:20\nEXPOSE 8080\nENV FOO=bar\n");

    let reduction = scan(temp.path());

    let app = &reduction.services["app"];
    assert_eq!(app.name, "app");
    assert_eq!(app.kind, ServiceKind::SingleContainer);
    assert_eq!(app.port_strings(), vec!["8080"]);
    assert_eq!(
        app.environment,
        BTreeMap::from([("FOO".to_string(), "bar".to_string())])
    );
    assert_eq!(app.source_path, temp.path().join("app/Dockerfile"));
}

#[test]
fn test_compose_service() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "docker-compose.yaml",
        r#"
services:
  web:
    ports: ["8080:80"]
    environment:
      X: "1"
"#,
    );

    let reduction = scan(temp.path());

    let web = &reduction.services["web"];
    assert_eq!(web.kind, ServiceKind::Composed);
    assert_eq!(web.port_strings(), vec!["8080"]);
    assert_eq!(
        web.environment,
        BTreeMap::from([("X".to_string(), "1".to_string())])
    );
}

#[test]
fn test_name_collision_last_definition_wins() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "web/Dockerfile", "FROM nginx\nEXPOSE 80\n");
    write(
        temp.path(),
        "docker-compose.yml",
        "services:\n  web:\n    image: nginx:alpine\n    ports:\n      - \"9090:80\"\n",
    );

    let reduction = scan(temp.path());

    assert_eq!(reduction.services.len(), 1);
    let web = &reduction.services["web"];
    assert_eq!(web.kind, ServiceKind::Composed);
    assert_eq!(web.port_strings(), vec!["9090"]);
    assert_eq!(web.image.as_deref(), Some("nginx:alpine"));

    assert_eq!(reduction.collisions.len(), 1);
    assert_eq!(reduction.collisions[0].previous, temp.path().join("web/Dockerfile"));
    assert_eq!(
        reduction.collisions[0].replacement,
        temp.path().join("docker-compose.yml")
    );
}

#[test]
fn test_skips_hidden_and_dependency_directories() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "api/Dockerfile", "FROM rust\nEXPOSE 3000\n");
    write(temp.path(), ".git/hooks/Dockerfile", "EXPOSE 1\n");
    write(temp.path(), "node_modules/pkg/Dockerfile", "EXPOSE 2\n");
    write(temp.path(), "api/.cache/docker-compose.yml", "services:\n  ghost: {}\n");

    let reduction = scan(temp.path());

    assert_eq!(reduction.services.keys().collect::<Vec<_>>(), vec!["api"]);
}

#[test]
fn test_suffix_build_files_use_parent_directory_name() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "worker/prod.dockerfile", "FROM python\nEXPOSE 5000/tcp\n");

    let reduction = scan(temp.path());

    assert_eq!(reduction.services["worker"].port_strings(), vec!["5000"]);
}

#[test]
fn test_buildkit_heredoc_dockerfile_is_discovered() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "app/Dockerfile",
        "# syntax=docker/dockerfile:1\nFROM debian\nRUN <<EOF\napt-get update\napt-get install -y curl\nEOF\nEXPOSE 8080\n",
    );

    let reduction = scan(temp.path());

    assert!(reduction.skipped.is_empty());
    assert_eq!(reduction.services["app"].port_strings(), vec!["8080"]);
}

#[test]
fn test_broken_manifest_does_not_affect_other_files() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "api/Dockerfile", "FROM rust\nEXPOSE 3000\n");
    write(temp.path(), "broken/docker-compose.yml", "services: [unterminated\n");

    let reduction = scan(temp.path());

    assert!(reduction.services.contains_key("api"));
    assert_eq!(reduction.skipped.len(), 1);
    assert_eq!(
        reduction.skipped[0].path,
        temp.path().join("broken/docker-compose.yml")
    );
}

#[test]
fn test_repeated_scans_are_idempotent() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "api/Dockerfile", "FROM rust\nEXPOSE 3000\nENV A=1 B=2\n");
    write(
        temp.path(),
        "stack/docker-compose.yml",
        "services:\n  db:\n    image: postgres\n    ports: [5432]\n",
    );

    let pipeline = DiscoveryPipeline::new(temp.path(), RealFileSystem);
    let registry = ServiceRegistry::new();

    registry.merge(pipeline.scan().unwrap().services);
    let first = registry.snapshot();
    let summary = registry.merge(pipeline.scan().unwrap().services);

    assert_eq!(*first, *registry.snapshot());
    assert!(summary.added.is_empty());
    assert!(summary.updated.is_empty());
}

#[test]
fn test_missing_root_is_an_error() {
    let temp = TempDir::new().unwrap();
    let pipeline = DiscoveryPipeline::new(temp.path().join("nope"), RealFileSystem);

    assert!(pipeline.scan().is_err());
}
