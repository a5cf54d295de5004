use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable the runtime reads for extra trusted root certificates.
pub const CERT_ENV_VAR: &str = "NODE_EXTRA_CA_CERTS";
pub const CERT_DIR_NAME: &str = "wrangler-cert";
pub const CERT_FILE_NAME: &str = "Cloudflare_CA.pem";

#[derive(Debug, Error)]
pub enum CertError {
    #[error("could not read bundled certificate {path}: {source}")]
    Source {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write certificate to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The bundled PEM and where it lives on disk.
#[derive(Debug, Clone)]
pub struct CertificateRecord {
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

impl CertificateRecord {
    pub fn load(path: &Path) -> Result<Self, CertError> {
        let contents = std::fs::read(path).map_err(|source| CertError::Source {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            contents,
        })
    }
}

/// `<temp_dir>/wrangler-cert/Cloudflare_CA.pem`
pub fn certificate_path(temp_dir: &Path) -> PathBuf {
    temp_dir.join(CERT_DIR_NAME).join(CERT_FILE_NAME)
}

/// Return the certificate path the bundled entry point should trust.
///
/// An override is returned untouched and nothing is written; the caller owns that
/// trust material and it is not merged with the bundled certificate. Otherwise the
/// bundled PEM is copied into the temp dir on first use.
pub fn provision_certificate(
    cert_override: Option<&str>,
    temp_dir: &Path,
    bundled_cert: &Path,
) -> Result<PathBuf, CertError> {
    if let Some(path) = cert_override.filter(|p| !p.is_empty()) {
        tracing::debug!(path, "using certificate override from {}", CERT_ENV_VAR);
        return Ok(PathBuf::from(path));
    }

    let target = certificate_path(temp_dir);
    if target.exists() {
        return Ok(target);
    }

    let record = CertificateRecord::load(bundled_cert)?;
    write_certificate(&target, &record.contents)?;
    tracing::debug!(
        source = %record.path.display(),
        path = %target.display(),
        "provisioned bundled certificate"
    );
    Ok(target)
}

/// Write to a per-process sibling, then rename over the target.
/// Concurrent launchers write identical bytes, so whichever rename lands last wins.
fn write_certificate(target: &Path, contents: &[u8]) -> Result<(), CertError> {
    let write_err = |source| CertError::Write {
        path: target.to_path_buf(),
        source,
    };

    let dir = target.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let staging = dir.join(format!("{}.{}.tmp", CERT_FILE_NAME, std::process::id()));
    std::fs::write(&staging, contents).map_err(write_err)?;
    std::fs::rename(&staging, target).map_err(|e| {
        let _ = std::fs::remove_file(&staging);
        write_err(e)
    })
}
