use std::fmt;
use std::path::Path;

use semver::Version;
use thiserror::Error;

/// Oldest runtime the bundled entry point supports.
pub const MIN_RUNTIME_VERSION: &str = "16.7.0";

/// A runtime version reduced to its numeric triple.
///
/// Field order matters: the derived `Ord` compares major, then minor, then patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RuntimeVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("malformed runtime version {input:?}: {reason}")]
    Malformed { input: String, reason: String },
    #[error(
        "Wrangler requires at least Node.js v{minimum}. You are using v{actual}.\n\
         You should use the latest Node.js version if possible, as Cloudflare Workers use a very up-to-date version of V8.\n\
         Consider using a Node.js version manager such as https://volta.sh/ or https://github.com/nvm-sh/nvm."
    )]
    TooOld {
        minimum: RuntimeVersion,
        actual: RuntimeVersion,
    },
    #[error("could not determine the version of runtime {runtime}: {reason}")]
    Probe { runtime: String, reason: String },
}

impl RuntimeVersion {
    /// Parse `16.7.0` or `v16.7.0`. Pre-release and build suffixes are accepted
    /// but take no part in ordering.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let v = Version::parse(bare).map_err(|e| VersionError::Malformed {
            input: input.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            major: v.major,
            minor: v.minor,
            patch: v.patch,
        })
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Reject `actual` when it is strictly older than `minimum`.
pub fn check_runtime_version(actual: &str, minimum: &str) -> Result<RuntimeVersion, VersionError> {
    let minimum = RuntimeVersion::parse(minimum)?;
    let actual = RuntimeVersion::parse(actual)?;
    if actual < minimum {
        return Err(VersionError::TooOld { minimum, actual });
    }
    Ok(actual)
}

/// Run `<runtime> --version` and return its trimmed stdout.
pub fn probe_runtime_version(runtime: &Path) -> Result<String, VersionError> {
    let probe_err = |reason: String| VersionError::Probe {
        runtime: runtime.display().to_string(),
        reason,
    };
    let output = std::process::Command::new(runtime)
        .arg("--version")
        .output()
        .map_err(|e| probe_err(e.to_string()))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(probe_err(format!(
            "exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_v_prefix() {
        let v = RuntimeVersion::parse("v16.7.0\n").unwrap();
        assert_eq!(
            v,
            RuntimeVersion {
                major: 16,
                minor: 7,
                patch: 0
            }
        );
    }

    #[test]
    fn parse_ignores_prerelease_for_ordering() {
        let pre = RuntimeVersion::parse("20.0.0-nightly2023").unwrap();
        assert_eq!(pre, RuntimeVersion::parse("20.0.0").unwrap());
    }

    #[test]
    fn parse_rejects_malformed() {
        for input in ["", "sixteen", "16.7", "v16.x.0", "16.7.0.1"] {
            let err = RuntimeVersion::parse(input).unwrap_err();
            assert!(matches!(err, VersionError::Malformed { .. }), "{input:?}");
        }
    }

    #[test]
    fn ordering_is_numeric_not_lexicographic() {
        let nine = RuntimeVersion::parse("9.0.0").unwrap();
        let ten = RuntimeVersion::parse("10.0.0").unwrap();
        assert!(nine < ten);
        let minor_2 = RuntimeVersion::parse("16.2.0").unwrap();
        let minor_10 = RuntimeVersion::parse("16.10.0").unwrap();
        assert!(minor_2 < minor_10);
    }

    #[test]
    fn gate_rejects_older_runtime() {
        let err = check_runtime_version("v14.0.0", MIN_RUNTIME_VERSION).unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, VersionError::TooOld { .. }));
        assert!(msg.contains("v16.7.0"), "{msg}");
        assert!(msg.contains("v14.0.0"), "{msg}");
    }

    #[test]
    fn gate_rejects_older_patch() {
        assert!(check_runtime_version("16.6.9", MIN_RUNTIME_VERSION).is_err());
    }

    #[test]
    fn gate_accepts_minimum_and_newer() {
        for ok in ["16.7.0", "16.7.1", "16.10.0", "v18.0.0", "22.3.1"] {
            assert!(check_runtime_version(ok, MIN_RUNTIME_VERSION).is_ok(), "{ok}");
        }
    }

    #[test]
    fn gate_surfaces_malformed_runtime_version() {
        let err = check_runtime_version("not-a-version", MIN_RUNTIME_VERSION).unwrap_err();
        assert!(matches!(err, VersionError::Malformed { .. }));
    }

    #[test]
    fn probe_nonexistent_runtime_returns_error() {
        let err = probe_runtime_version(Path::new("/nonexistent/runtime/node-does-not-exist"))
            .unwrap_err();
        assert!(matches!(err, VersionError::Probe { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn probe_reads_runtime_stdout() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let runtime = dir.path().join("node");
        std::fs::write(&runtime, "#!/bin/sh\necho v18.12.1\n").unwrap();
        std::fs::set_permissions(&runtime, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(probe_runtime_version(&runtime).unwrap(), "v18.12.1");
    }
}
