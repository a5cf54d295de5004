use std::path::PathBuf;
use thiserror::Error;

use crate::cert::CERT_ENV_VAR;
use crate::resolve::global_folders;

#[derive(Debug, Clone)]
pub struct LauncherConfig {
    // Paths below hang off the distribution root (<exe>/../.. or WRANGLER_PACKAGE_ROOT).
    pub own_manifest: PathBuf,  // package_root/package.json
    pub bundled_entry: PathBuf, // package_root/wrangler-dist/cli.js
    pub bundled_cert: PathBuf,  // package_root/Cloudflare_CA.pem
    pub runtime: PathBuf,       // "node" (or WRANGLER_NODE)
    pub cert_override: Option<String>, // NODE_EXTRA_CA_CERTS, empty treated as unset
    pub temp_dir: PathBuf,      // platform temp dir (honours TMPDIR)
    pub node_path: Option<std::ffi::OsString>, // NODE_PATH search list
    pub global_folders: Vec<PathBuf>, // ~/.node_modules, ~/.node_libraries, <prefix>/lib/node
    pub debug: bool,            // WRANGLER_LOG=debug
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine the launcher's install location: {0}")]
    NoPackageRoot(String),
}

pub fn launcher_config() -> Result<LauncherConfig, ConfigError> {
    let package_root = match std::env::var_os("WRANGLER_PACKAGE_ROOT") {
        Some(v) if !v.is_empty() => PathBuf::from(v),
        _ => package_root_from_exe()?,
    };

    let runtime = std::env::var_os("WRANGLER_NODE")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("node"));

    let cert_override = std::env::var(CERT_ENV_VAR).ok().filter(|v| !v.is_empty());

    let debug = std::env::var("WRANGLER_LOG")
        .map(|v| v == "debug")
        .unwrap_or(false);

    Ok(LauncherConfig {
        own_manifest: package_root.join("package.json"),
        bundled_entry: package_root.join("wrangler-dist").join("cli.js"),
        bundled_cert: package_root.join("Cloudflare_CA.pem"),
        global_folders: global_folders(dirs::home_dir().as_deref(), &runtime),
        runtime,
        cert_override,
        temp_dir: std::env::temp_dir(),
        node_path: std::env::var_os("NODE_PATH").filter(|v| !v.is_empty()),
        debug,
    })
}

/// The launcher ships as `<root>/bin/wrangler`; the package root is two levels up
/// from the resolved executable.
fn package_root_from_exe() -> Result<PathBuf, ConfigError> {
    let exe = std::env::current_exe()
        .and_then(|p| p.canonicalize())
        .map_err(|e| ConfigError::NoPackageRoot(e.to_string()))?;
    exe.parent()
        .and_then(|bin_dir| bin_dir.parent())
        .map(|root| root.to_path_buf())
        .ok_or_else(|| ConfigError::NoPackageRoot(exe.display().to_string()))
}
