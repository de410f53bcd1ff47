//! Service module scaffolding (`parapet new`).

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use parapet_telemetry::log_scaffold_created;

#[derive(Debug, Error)]
pub enum ScaffoldError {
    #[error("invalid service name '{0}' (use lowercase letters, digits and underscores)")]
    InvalidName(String),

    #[error("{} already exists", .0.display())]
    Exists(PathBuf),

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A file to generate, relative to the service directory.
struct ServiceFile {
    path: &'static str,
    content: String,
}

const DIRECTORIES: &[&str] = &["views", "specs", "services"];

/// Create the skeleton of service `name` under `root`.
///
/// Nothing is overwritten: the call fails if the service directory or any
/// file in it already exists. Returns the created files.
pub fn create_service(root: &Path, name: &str) -> Result<Vec<PathBuf>, ScaffoldError> {
    if !is_module_name(name) {
        return Err(ScaffoldError::InvalidName(name.to_string()));
    }

    let service_dir = root.join(name);
    create_directory(&service_dir)?;
    for dir in DIRECTORIES {
        create_directory(&service_dir.join(dir))?;
    }

    let mut created = Vec::new();
    for file in service_files(name) {
        let path = service_dir.join(file.path);
        create_file(&path, &file.content)?;
        created.push(path);
    }

    log_scaffold_created!(
        service = name,
        path = %service_dir.display(),
        files = created.len(),
        "service scaffolded"
    );
    Ok(created)
}

fn is_module_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn create_directory(path: &Path) -> Result<(), ScaffoldError> {
    if path.exists() {
        return Err(ScaffoldError::Exists(path.to_path_buf()));
    }
    fs::create_dir(path).map_err(|source| ScaffoldError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn create_file(path: &Path, content: &str) -> Result<(), ScaffoldError> {
    let io = |source| ScaffoldError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => ScaffoldError::Exists(path.to_path_buf()),
            _ => io(e),
        })?;
    file.write_all(content.as_bytes()).map_err(io)
}

fn service_files(name: &str) -> Vec<ServiceFile> {
    vec![
        ServiceFile {
            path: "mod.rs",
            content: generate_mod(name),
        },
        ServiceFile {
            path: "routes.rs",
            content: generate_routes(),
        },
        ServiceFile {
            path: "errors.rs",
            content: generate_errors(name),
        },
        ServiceFile {
            path: "views/mod.rs",
            content: "//! Request handlers.\n".to_string(),
        },
        ServiceFile {
            path: "specs/mod.rs",
            content: "//! Request and response schemas.\n".to_string(),
        },
        ServiceFile {
            path: "services/mod.rs",
            content: "//! Business logic.\n".to_string(),
        },
    ]
}

fn generate_mod(name: &str) -> String {
    format!(
        r#"//! The `{name}` service.

mod errors;
mod routes;
mod services;
mod specs;
mod views;

use parapet::{{Api, ApiError, Blueprint}};

/// Define the service's operations and collect them into its blueprint.
pub fn blueprint(api: &mut Api) -> Result<Blueprint, ApiError> {{
    routes::register(api, Blueprint::new("{name}", "/{name}"))
}}
"#
    )
}

fn generate_routes() -> String {
    r#"use parapet::{Api, ApiError, Blueprint};

pub(super) fn register(api: &mut Api, blueprint: Blueprint) -> Result<Blueprint, ApiError> {
    let _ = api;
    Ok(blueprint)
}
"#
    .to_string()
}

fn generate_errors(name: &str) -> String {
    format!(
        r#"//! Errors raised by the `{name}` service.

use parapet::ApiException;

#[allow(dead_code)]
pub(super) fn not_found(what: &str) -> ApiException {{
    ApiException::not_found(format!("{{what}} not found"))
}}
"#
    )
}
