use std::{collections::HashMap, sync::Mutex, time::Duration};

use {
    async_trait::async_trait,
    mcpbox_config::SandboxConfig,
    secrecy::ExposeSecret,
    tokio::process::Command,
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    exec::{ExecOpts, ExecResult, run_to_completion},
    sandbox::{ExposedPort, Sandbox, SandboxId},
};

const DOCKER: &str = "docker";

/// Polls of `docker inspect` before giving up on a container start.
const READY_POLL_ATTEMPTS: u32 = 60;
const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Docker-backed sandbox: one long-lived container per [`SandboxId`].
///
/// Ports are exposed by resolving the container's bridge-network address,
/// which is routable from the host on Linux.
pub struct DockerSandbox {
    pub config: SandboxConfig,
    /// exposure id -> (container, port)
    exposures: Mutex<HashMap<String, (String, u16)>>,
}

impl DockerSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            exposures: Mutex::new(HashMap::new()),
        }
    }

    fn docker_args(&self, id: &SandboxId, command: &str, opts: &ExecOpts, detach: bool) -> Vec<String> {
        let mut args = vec!["exec".to_string()];
        if detach {
            args.push("-d".to_string());
        }
        if let Some(ref dir) = opts.working_dir {
            args.extend(["-w".to_string(), dir.display().to_string()]);
        }
        for (k, v) in &opts.env {
            args.extend(["-e".to_string(), format!("{k}={}", v.expose_secret())]);
        }
        args.push(id.key.clone());
        args.extend(["sh".to_string(), "-c".to_string(), command.to_string()]);
        args
    }

    async fn docker(&self, args: &[&str], action: &'static str, timeout: Duration) -> Result<String> {
        let mut cmd = Command::new(DOCKER);
        cmd.args(args);
        let opts = ExecOpts::default().with_timeout(timeout);
        let out = run_to_completion(cmd, &opts, DOCKER).await?;
        if !out.success() {
            return Err(Error::Cli {
                cli: DOCKER,
                action,
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(out.stdout.trim().to_string())
    }

    async fn container_ip(&self, id: &SandboxId) -> Result<String> {
        let raw = self
            .docker(
                &[
                    "inspect",
                    "--format",
                    "{{range .NetworkSettings.Networks}}{{.IPAddress}} {{end}}",
                    &id.key,
                ],
                "inspect",
                Duration::from_secs(30),
            )
            .await?;
        raw.split_whitespace()
            .next()
            .map(str::to_string)
            .ok_or_else(|| Error::message(format!("container '{id}' has no network address")))
    }

    fn lock_exposures(&self) -> std::sync::MutexGuard<'_, HashMap<String, (String, u16)>> {
        self.exposures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    fn backend_name(&self) -> &'static str {
        "docker"
    }

    async fn create(&self, name: &str) -> Result<SandboxId> {
        let short = uuid::Uuid::new_v4().simple().to_string();
        let id = SandboxId::new(format!("{name}-{}", &short[..8]));

        info!(
            container = %id,
            image = %self.config.image,
            "creating docker sandbox"
        );
        self.docker(
            &[
                "run",
                "-d",
                "--name",
                &id.key,
                &self.config.image,
                "sh",
                "-c",
                &self.config.keepalive_command,
            ],
            "run",
            Duration::from_secs(300),
        )
        .await?;
        Ok(id)
    }

    async fn wait_for_creation(&self, id: &SandboxId) -> Result<()> {
        for attempt in 0..READY_POLL_ATTEMPTS {
            let running = self
                .docker(
                    &["inspect", "--format", "{{.State.Running}}", &id.key],
                    "inspect",
                    Duration::from_secs(30),
                )
                .await;
            match running {
                Ok(state) if state == "true" => {
                    debug!(container = %id, attempt, "docker sandbox running");
                    return Ok(());
                },
                Ok(_) => {},
                Err(e) => debug!(container = %id, error = %e, "inspect failed, retrying"),
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
        Err(Error::NotReady(id.key.clone()))
    }

    async fn exec(&self, id: &SandboxId, command: &str, opts: &ExecOpts) -> Result<ExecResult> {
        let mut cmd = Command::new(DOCKER);
        cmd.args(self.docker_args(id, command, opts, false));
        run_to_completion(cmd, opts, DOCKER).await
    }

    async fn spawn_detached(&self, id: &SandboxId, command: &str, opts: &ExecOpts) -> Result<()> {
        let mut cmd = Command::new(DOCKER);
        cmd.args(self.docker_args(id, command, opts, true));
        let out = run_to_completion(cmd, opts, DOCKER).await?;
        if !out.success() {
            return Err(Error::Cli {
                cli: DOCKER,
                action: "exec -d",
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(())
    }

    async fn expose(&self, id: &SandboxId, port: u16, name: &str) -> Result<ExposedPort> {
        let ip = self.container_ip(id).await?;
        let exposure_id = uuid::Uuid::new_v4().to_string();
        self.lock_exposures()
            .insert(exposure_id.clone(), (id.key.clone(), port));

        let url = format!("http://{ip}:{port}");
        info!(container = %id, port, name, url = %url, "exposed sandbox port");
        Ok(ExposedPort {
            exposure_id,
            url,
            port,
            name: name.to_string(),
        })
    }

    async fn unexpose(&self, id: &SandboxId, exposure_id: &str) -> Result<()> {
        match self.lock_exposures().remove(exposure_id) {
            Some((container, port)) if container == id.key => {
                debug!(container = %id, port, exposure_id, "released exposure");
                Ok(())
            },
            _ => Err(Error::UnknownExposure(exposure_id.to_string())),
        }
    }

    async fn delete(&self, id: &SandboxId) -> Result<()> {
        self.lock_exposures()
            .retain(|_, (container, _)| container != &id.key);
        match self
            .docker(&["rm", "-f", &id.key], "rm", Duration::from_secs(60))
            .await
        {
            Ok(_) => {
                info!(container = %id, "docker sandbox removed");
                Ok(())
            },
            Err(e) => {
                warn!(container = %id, error = %e, "failed to remove docker sandbox");
                Err(e)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, secrecy::Secret};

    #[test]
    fn exec_args_include_env_and_detach() {
        let sandbox = DockerSandbox::new(SandboxConfig::default());
        let key = "API_KEY".to_string();
        let value = Secret::new("k".to_string());
        let opts = ExecOpts::default().with_env([(&key, &value)]);
        let args = sandbox.docker_args(&SandboxId::new("box-1"), "node server.js", &opts, true);
        assert_eq!(args, vec![
            "exec",
            "-d",
            "-e",
            "API_KEY=k",
            "box-1",
            "sh",
            "-c",
            "node server.js"
        ]);
    }

    #[tokio::test]
    async fn unexpose_unknown_id_errors() {
        let sandbox = DockerSandbox::new(SandboxConfig::default());
        let err = sandbox
            .unexpose(&SandboxId::new("box-1"), "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownExposure(_)));
    }
}
