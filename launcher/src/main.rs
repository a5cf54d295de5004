// main.rs — orchestration only.
// All I/O lives in the modules below; main.rs is the only file that wires them together.
mod cert;
mod config;
mod launch;
mod logging;
mod resolve;
mod supervisor;
mod version;

use anyhow::Context;

use cert::provision_certificate;
use config::{launcher_config, LauncherConfig};
use launch::{forwarded_args, LaunchPlan};
use logging::init_logging;
use resolve::{decide, resolve_local_installation, Delegation};
use supervisor::{ProcessSupervisor, TerminationSignals};
use version::{check_runtime_version, probe_runtime_version, VersionError, MIN_RUNTIME_VERSION};

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("[wrangler] error: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}

fn run() -> anyhow::Result<i32> {
    let config = launcher_config()?;
    init_logging(config.debug);

    let actual = probe_runtime_version(&config.runtime)?;
    match check_runtime_version(&actual, MIN_RUNTIME_VERSION) {
        Ok(v) => tracing::debug!(runtime = %v, "runtime version accepted"),
        Err(e @ VersionError::TooOld { .. }) => {
            eprintln!("{}", e);
            return Ok(1);
        }
        Err(e) => return Err(e.into()),
    }

    let cert_path = provision_certificate(
        config.cert_override.as_deref(),
        &config.temp_dir,
        &config.bundled_cert,
    )
    .context("could not provision the bundled CA certificate")?;

    let plan = launch_plan(&config, &cert_path)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("could not start the event loop")?;
    runtime.block_on(supervise(plan))
}

fn launch_plan(config: &LauncherConfig, cert_path: &std::path::Path) -> anyhow::Result<LaunchPlan> {
    let cwd = std::env::current_dir().context("could not read the working directory")?;
    let resolution =
        resolve_local_installation(&cwd, config.node_path.as_deref(), &config.global_folders)
        .context("could not look for a local wrangler installation")?;
    let forwarded = forwarded_args();

    Ok(match decide(resolution, &config.own_manifest) {
        Delegation::Local(local) => {
            tracing::debug!(
                "Delegating to locally-installed version of wrangler @ v{}",
                local.version
            );
            LaunchPlan::delegated(&config.runtime, &local, &forwarded)
        }
        Delegation::Bundled => {
            tracing::debug!(cert = %cert_path.display(), "running bundled wrangler");
            LaunchPlan::bundled(&config.runtime, &config.bundled_entry, cert_path, &forwarded)
        }
    })
}

async fn supervise(plan: LaunchPlan) -> anyhow::Result<i32> {
    // Listeners go in before the spawn so no signal slips past the child.
    let mut signals = TerminationSignals::install()?;
    let mut supervisor = ProcessSupervisor::new();
    supervisor.adopt(plan.spawn()?)?;
    let code = supervisor.wait(&mut signals).await?;
    tracing::debug!(state = ?supervisor.state(), code, "child finished");
    Ok(code)
}
