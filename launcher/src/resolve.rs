//! Finding a locally installed copy of the tool and deciding whether to hand off to it.
//!
//! Lookup mirrors the runtime's package resolution: walk from the working directory
//! up to the filesystem root probing `node_modules/<tool>/package.json`, then try
//! each `NODE_PATH` entry, then the runtime's global folders (`~/.node_modules`,
//! `~/.node_libraries`, `<prefix>/lib/node`). The `<prefix>` folder is only known when
//! the runtime is configured by path; a bare `node` skips it. A missing candidate is
//! not an error; any other I/O failure is, so a permission problem is never mistaken
//! for "no local install".

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const TOOL_NAME: &str = "wrangler";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("could not inspect {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid manifest {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInstallation {
    pub manifest_path: PathBuf,
    pub bin_path: PathBuf,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    NotFound,
    Found(LocalInstallation),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delegation {
    Bundled,
    Local(LocalInstallation),
}

#[derive(Deserialize)]
struct Manifest {
    version: String,
    bin: BinField,
}

/// `"bin": "cli.js"` or `"bin": { "wrangler": "cli.js", ... }`
#[derive(Deserialize)]
#[serde(untagged)]
enum BinField {
    Single(String),
    Named(BTreeMap<String, String>),
}

impl BinField {
    fn entry(&self) -> Option<&str> {
        match self {
            BinField::Single(path) => Some(path),
            BinField::Named(map) => map.get(TOOL_NAME).map(String::as_str),
        }
    }
}

/// Global package folders for a runtime at `runtime` (`<prefix>/bin/node`).
pub fn global_folders(home: Option<&Path>, runtime: &Path) -> Vec<PathBuf> {
    let mut folders = Vec::new();
    if let Some(home) = home {
        folders.push(home.join(".node_modules"));
        folders.push(home.join(".node_libraries"));
    }
    let prefix = runtime
        .parent()
        .filter(|bin| !bin.as_os_str().is_empty())
        .and_then(Path::parent);
    if let Some(prefix) = prefix {
        folders.push(prefix.join("lib").join("node"));
    }
    folders
}

/// Directories whose `<dir>/wrangler/package.json` would be probed, in order.
fn search_roots(cwd: &Path, node_path: Option<&OsStr>, global: &[PathBuf]) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = cwd
        .ancestors()
        .filter(|dir| dir.file_name() != Some(OsStr::new("node_modules")))
        .map(|dir| dir.join("node_modules"))
        .collect();
    if let Some(list) = node_path {
        roots.extend(std::env::split_paths(list).filter(|p| !p.as_os_str().is_empty()));
    }
    roots.extend(global.iter().cloned());
    roots
}

/// Look for the nearest installation of the tool reachable from `cwd`.
pub fn resolve_local_installation(
    cwd: &Path,
    node_path: Option<&OsStr>,
    global: &[PathBuf],
) -> Result<Resolution, ResolveError> {
    for root in search_roots(cwd, node_path, global) {
        let candidate = root.join(TOOL_NAME).join("package.json");
        match std::fs::metadata(&candidate) {
            Ok(meta) if meta.is_file() => {
                return load_installation(&candidate).map(Resolution::Found);
            }
            Ok(_) => continue,
            Err(e) if is_absent(&e) => continue,
            Err(source) => {
                return Err(ResolveError::Io {
                    path: candidate,
                    source,
                })
            }
        }
    }
    Ok(Resolution::NotFound)
}

fn is_absent(e: &std::io::Error) -> bool {
    // ENOTDIR: some component of the path is a regular file.
    matches!(e.kind(), ErrorKind::NotFound) || (cfg!(unix) && e.raw_os_error() == Some(20))
}

fn load_installation(candidate: &Path) -> Result<LocalInstallation, ResolveError> {
    let io_err = |source| ResolveError::Io {
        path: candidate.to_path_buf(),
        source,
    };
    let manifest_path = candidate.canonicalize().map_err(io_err)?;
    let raw = std::fs::read_to_string(&manifest_path).map_err(io_err)?;
    let manifest: Manifest =
        serde_json::from_str(&raw).map_err(|e| ResolveError::Manifest {
            path: manifest_path.clone(),
            reason: e.to_string(),
        })?;
    let entry = manifest.bin.entry().ok_or_else(|| ResolveError::Manifest {
        path: manifest_path.clone(),
        reason: format!("no \"{TOOL_NAME}\" entry in \"bin\""),
    })?;

    let package_dir = manifest_path.parent().unwrap_or(Path::new("/"));
    Ok(LocalInstallation {
        bin_path: package_dir.join(entry),
        version: manifest.version,
        manifest_path,
    })
}

/// Pick the bundled entry point unless a *different* installation was found.
///
/// `own_manifest` is this launcher's `package.json`; when resolution lands on it the
/// current process already is the nearest install, and delegating would recurse.
pub fn decide(resolution: Resolution, own_manifest: &Path) -> Delegation {
    match resolution {
        Resolution::NotFound => Delegation::Bundled,
        Resolution::Found(local) => {
            let own = own_manifest
                .canonicalize()
                .unwrap_or_else(|_| own_manifest.to_path_buf());
            if local.manifest_path == own {
                Delegation::Bundled
            } else {
                Delegation::Local(local)
            }
        }
    }
}
