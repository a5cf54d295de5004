use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::process::{Child, Command};

use crate::cert::CERT_ENV_VAR;
use crate::resolve::LocalInstallation;

/// Flags the bundled entry point needs from the runtime.
const BUNDLED_RUNTIME_FLAGS: [&str; 2] = ["--no-warnings", "--experimental-vm-modules"];

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
}

/// Everything needed to start the child. The child's environment is the inherited
/// one plus `env`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub env: Vec<(OsString, OsString)>,
}

impl LaunchPlan {
    /// Run the bundled entry point, trusting `cert_path`.
    pub fn bundled(
        runtime: &Path,
        bundled_entry: &Path,
        cert_path: &Path,
        forwarded: &[OsString],
    ) -> Self {
        let mut args: Vec<OsString> = BUNDLED_RUNTIME_FLAGS.iter().map(OsString::from).collect();
        args.push(bundled_entry.as_os_str().to_owned());
        args.extend(forwarded.iter().cloned());
        Self {
            program: runtime.to_path_buf(),
            args,
            env: vec![(CERT_ENV_VAR.into(), cert_path.as_os_str().to_owned())],
        }
    }

    /// Hand off to a local installation; it does its own gating and certificate setup.
    pub fn delegated(runtime: &Path, local: &LocalInstallation, forwarded: &[OsString]) -> Self {
        let mut args = vec![local.bin_path.as_os_str().to_owned()];
        args.extend(forwarded.iter().cloned());
        Self {
            program: runtime.to_path_buf(),
            args,
            env: Vec::new(),
        }
    }

    /// Spawn with stdio inherited. Must be called inside a tokio runtime.
    pub fn spawn(&self) -> Result<Child, LaunchError> {
        tracing::debug!(program = %self.program.display(), args = ?self.args, "spawning child");
        Command::new(&self.program)
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str())))
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: self.program.display().to_string(),
                source,
            })
    }
}

/// Arguments after the program name, verbatim.
pub fn forwarded_args() -> Vec<OsString> {
    std::env::args_os().skip(1).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> LocalInstallation {
        LocalInstallation {
            manifest_path: PathBuf::from("/proj/node_modules/wrangler/package.json"),
            bin_path: PathBuf::from("/proj/node_modules/wrangler/dist/cli.js"),
            version: "3.1.0".to_string(),
        }
    }

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn bundled_plan_sets_flags_entry_and_cert() {
        let plan = LaunchPlan::bundled(
            Path::new("node"),
            Path::new("/opt/wrangler/wrangler-dist/cli.js"),
            Path::new("/tmp/wrangler-cert/Cloudflare_CA.pem"),
            &os(&["deploy", "--env", "production"]),
        );
        assert_eq!(plan.program, PathBuf::from("node"));
        assert_eq!(
            plan.args,
            os(&[
                "--no-warnings",
                "--experimental-vm-modules",
                "/opt/wrangler/wrangler-dist/cli.js",
                "deploy",
                "--env",
                "production",
            ])
        );
        assert_eq!(
            plan.env,
            vec![(
                OsString::from("NODE_EXTRA_CA_CERTS"),
                OsString::from("/tmp/wrangler-cert/Cloudflare_CA.pem")
            )]
        );
    }

    #[test]
    fn delegated_plan_forwards_args_without_extra_env() {
        let plan = LaunchPlan::delegated(Path::new("node"), &local(), &os(&["dev", "--local"]));
        assert_eq!(
            plan.args,
            os(&["/proj/node_modules/wrangler/dist/cli.js", "dev", "--local"])
        );
        assert!(plan.env.is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn spawn_nonexistent_program_returns_error() {
        let plan = LaunchPlan {
            program: PathBuf::from("/nonexistent/runtime/node-does-not-exist"),
            args: Vec::new(),
            env: Vec::new(),
        };
        let err = plan.spawn().unwrap_err();
        assert!(err.to_string().contains("node-does-not-exist"));
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "current_thread")]
    async fn spawned_child_sees_extra_env() {
        let plan = LaunchPlan {
            program: PathBuf::from("sh"),
            args: os(&["-c", r#"test "$NODE_EXTRA_CA_CERTS" = /custom/ca.pem"#]),
            env: vec![("NODE_EXTRA_CA_CERTS".into(), "/custom/ca.pem".into())],
        };
        let status = plan.spawn().unwrap().wait().await.unwrap();
        assert!(status.success());
    }
}
