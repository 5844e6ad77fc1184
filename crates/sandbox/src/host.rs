use std::{
    collections::HashMap,
    path::PathBuf,
    process::Stdio,
    sync::{Mutex, MutexGuard, PoisonError},
};

use {
    async_trait::async_trait,
    secrecy::ExposeSecret,
    tokio::process::{Child, Command},
    tracing::{debug, info, warn},
};

use crate::{
    error::{Context, Error, Result},
    exec::{ExecOpts, ExecResult, exec_command},
    sandbox::{ExposedPort, Sandbox, SandboxId},
};

#[derive(Default)]
struct HostState {
    /// sandbox key -> scratch directory
    dirs: HashMap<String, PathBuf>,
    /// sandbox key -> detached children
    children: HashMap<String, Vec<Child>>,
    /// exposure id -> sandbox key
    exposures: HashMap<String, String>,
}

/// Runs everything directly on the host, each sandbox rooted in a scratch
/// directory under the system temp dir. No isolation.
#[derive(Default)]
pub struct HostSandbox {
    state: Mutex<HostState>,
}

impl HostSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn scratch_dir(&self, id: &SandboxId) -> Result<PathBuf> {
        self.state()
            .dirs
            .get(&id.key)
            .cloned()
            .ok_or_else(|| Error::UnknownSandbox(id.key.clone()))
    }

    fn with_default_dir(&self, id: &SandboxId, opts: &ExecOpts) -> Result<ExecOpts> {
        let dir = self.scratch_dir(id)?;
        let mut opts = opts.clone();
        opts.working_dir.get_or_insert(dir);
        Ok(opts)
    }
}

#[async_trait]
impl Sandbox for HostSandbox {
    fn backend_name(&self) -> &'static str {
        "host"
    }

    async fn create(&self, name: &str) -> Result<SandboxId> {
        let short = uuid::Uuid::new_v4().simple().to_string();
        let id = SandboxId::new(format!("{name}-{}", &short[..8]));
        let dir = std::env::temp_dir().join(&id.key);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating scratch dir {}", dir.display()))?;

        info!(sandbox = %id, dir = %dir.display(), "created host sandbox");
        self.state().dirs.insert(id.key.clone(), dir);
        Ok(id)
    }

    async fn wait_for_creation(&self, id: &SandboxId) -> Result<()> {
        let dir = self.scratch_dir(id)?;
        if tokio::fs::try_exists(&dir).await? {
            Ok(())
        } else {
            Err(Error::NotReady(id.key.clone()))
        }
    }

    async fn exec(&self, id: &SandboxId, command: &str, opts: &ExecOpts) -> Result<ExecResult> {
        let opts = self.with_default_dir(id, opts)?;
        exec_command(command, &opts).await
    }

    async fn spawn_detached(&self, id: &SandboxId, command: &str, opts: &ExecOpts) -> Result<()> {
        let opts = self.with_default_dir(id, opts)?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        if let Some(ref dir) = opts.working_dir {
            cmd.current_dir(dir);
        }
        for (k, v) in &opts.env {
            cmd.env(k, v.expose_secret());
        }

        let child = cmd
            .spawn()
            .with_context(|| format!("spawning detached command in {id}"))?;
        debug!(sandbox = %id, pid = ?child.id(), "spawned detached process");
        self.state()
            .children
            .entry(id.key.clone())
            .or_default()
            .push(child);
        Ok(())
    }

    async fn expose(&self, id: &SandboxId, port: u16, name: &str) -> Result<ExposedPort> {
        self.scratch_dir(id)?;
        let exposure_id = uuid::Uuid::new_v4().to_string();
        self.state()
            .exposures
            .insert(exposure_id.clone(), id.key.clone());
        Ok(ExposedPort {
            exposure_id,
            url: format!("http://127.0.0.1:{port}"),
            port,
            name: name.to_string(),
        })
    }

    async fn unexpose(&self, id: &SandboxId, exposure_id: &str) -> Result<()> {
        let mut state = self.state();
        match state.exposures.get(exposure_id) {
            Some(owner) if owner == &id.key => {
                state.exposures.remove(exposure_id);
                Ok(())
            },
            _ => Err(Error::UnknownExposure(exposure_id.to_string())),
        }
    }

    async fn delete(&self, id: &SandboxId) -> Result<()> {
        let (dir, children) = {
            let mut state = self.state();
            state.exposures.retain(|_, owner| owner != &id.key);
            let children = state.children.remove(&id.key).unwrap_or_default();
            let dir = state
                .dirs
                .remove(&id.key)
                .ok_or_else(|| Error::UnknownSandbox(id.key.clone()))?;
            (dir, children)
        };

        for mut child in children {
            #[cfg(unix)]
            if let Some(pid) = child.id() {
                // Signal the whole group so grandchildren of `sh -c` go too.
                let _ = Command::new("kill")
                    .arg("-TERM")
                    .arg(format!("-{pid}"))
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status()
                    .await;
            }
            if let Err(e) = child.kill().await {
                debug!(sandbox = %id, error = %e, "child already exited");
            }
        }

        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            warn!(sandbox = %id, dir = %dir.display(), error = %e, "failed to remove scratch dir");
        }
        info!(sandbox = %id, "host sandbox deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::time::Duration};

    #[tokio::test]
    async fn exec_runs_in_scratch_dir() {
        let sandbox = HostSandbox::new();
        let id = sandbox.create("mcpbox-test").await.unwrap();
        sandbox.wait_for_creation(&id).await.unwrap();

        sandbox
            .exec(&id, "echo hi > marker.txt", &ExecOpts::default())
            .await
            .unwrap();
        let dir = sandbox.scratch_dir(&id).unwrap();
        assert!(dir.join("marker.txt").exists());

        sandbox.delete(&id).await.unwrap();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn expose_returns_loopback_url() {
        let sandbox = HostSandbox::new();
        let id = sandbox.create("mcpbox-test").await.unwrap();
        let exposed = sandbox.expose(&id, 3001, "mcp-server-a").await.unwrap();
        assert_eq!(exposed.url, "http://127.0.0.1:3001");

        sandbox.unexpose(&id, &exposed.exposure_id).await.unwrap();
        let err = sandbox
            .unexpose(&id, &exposed.exposure_id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownExposure(_)));
        sandbox.delete(&id).await.unwrap();
    }

    #[tokio::test]
    async fn delete_stops_detached_processes() {
        let sandbox = HostSandbox::new();
        let id = sandbox.create("mcpbox-test").await.unwrap();
        sandbox
            .spawn_detached(&id, "sleep 30", &ExecOpts::default())
            .await
            .unwrap();
        assert_eq!(sandbox.state().children[&id.key].len(), 1);

        tokio::time::timeout(Duration::from_secs(5), sandbox.delete(&id))
            .await
            .unwrap()
            .unwrap();
        assert!(sandbox.state().children.is_empty());
    }

    #[tokio::test]
    async fn unknown_sandbox_is_rejected() {
        let sandbox = HostSandbox::new();
        let err = sandbox
            .exec(&SandboxId::new("nope"), "true", &ExecOpts::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownSandbox(_)));
        assert!(sandbox.delete(&SandboxId::new("nope")).await.is_err());
    }
}
