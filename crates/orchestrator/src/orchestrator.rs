//! Drives every configured backend from sandbox creation to teardown.

use std::{
    collections::BTreeMap,
    sync::Arc,
    time::{Duration, Instant},
};

#[cfg(feature = "metrics")]
use mcpbox_metrics::{counter, gauge, histogram, labels, orchestrator as orch_metrics};
use {
    futures::future::join_all,
    mcpbox_config::{BackendConfig, McpboxConfig, OrchestratorConfig},
    mcpbox_mcp::{ToolBackend, ToolMap},
    mcpbox_sandbox::{ExecOpts, ExposedPort, Sandbox, SandboxId},
    serde_json::Value,
    tracing::{debug, error, info, warn},
};

use crate::{
    aggregate::{BackendOutcome, BackendReport, Discovered, SetupReport, SetupStage, aggregate},
    error::{Error, Result},
    factory::{ConnectionFactory, McpConnectionFactory},
    registry::ToolRegistry,
};

/// Where the orchestrator is in its one-way lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Allocating,
    ExposingAccess,
    WaitingNetworkReady,
    Provisioning,
    StartingBackends,
    Connecting,
    Ready,
    TearingDown,
    Terminated,
}

/// Multi-backend orchestrator.
///
/// Owns the sandbox handle, every exposure, every connection and the
/// aggregate tool map. Resources are recorded as soon as they are acquired
/// so that [`teardown`](Self::teardown) releases them even when setup failed
/// or was abandoned half way.
pub struct MultiServerOrchestrator {
    backends: Vec<BackendConfig>,
    settings: OrchestratorConfig,
    sandbox_name: String,
    sandbox: Arc<dyn Sandbox>,
    factory: Arc<dyn ConnectionFactory>,
    phase: Phase,
    sandbox_id: Option<SandboxId>,
    exposures: Vec<ExposedPort>,
    connections: Vec<Arc<dyn ToolBackend>>,
    registry: ToolRegistry,
    report: SetupReport,
}

impl MultiServerOrchestrator {
    pub fn new(
        backends: Vec<BackendConfig>,
        settings: OrchestratorConfig,
        sandbox_name: impl Into<String>,
        sandbox: Arc<dyn Sandbox>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Result<Self> {
        if backends.is_empty() {
            return Err(Error::MissingBackends);
        }
        Ok(Self {
            backends,
            settings,
            sandbox_name: sandbox_name.into(),
            sandbox,
            factory,
            phase: Phase::Idle,
            sandbox_id: None,
            exposures: Vec::new(),
            connections: Vec::new(),
            registry: ToolRegistry::new(),
            report: SetupReport::default(),
        })
    }

    /// Sandbox and HTTP connections as selected by `config`.
    pub fn from_config(config: &McpboxConfig) -> Result<Self> {
        Self::new(
            config.backends.clone(),
            config.orchestrator.clone(),
            config.sandbox.name.clone(),
            mcpbox_sandbox::from_config(&config.sandbox),
            Arc::new(McpConnectionFactory::from_settings(&config.orchestrator)),
        )
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn descriptors(&self) -> Vec<Value> {
        self.registry.descriptors()
    }

    pub fn report(&self) -> &SetupReport {
        &self.report
    }

    pub fn sandbox_id(&self) -> Option<&SandboxId> {
        self.sandbox_id.as_ref()
    }

    /// Bring up every backend and build the aggregate tool map.
    ///
    /// Only sandbox creation failures are returned; a backend that fails at
    /// any later stage is recorded in the report and contributes no tools.
    pub async fn setup(&mut self) -> Result<&SetupReport> {
        if self.phase != Phase::Idle {
            return Err(Error::InvalidPhase(self.phase));
        }
        let started = Instant::now();
        let mut failures: BTreeMap<usize, (SetupStage, String)> = BTreeMap::new();

        self.phase = Phase::Allocating;
        info!(
            sandbox = self.sandbox.backend_name(),
            backends = self.backends.len(),
            "creating sandbox"
        );
        let id = self.sandbox.create(&self.sandbox_name).await?;
        self.sandbox_id = Some(id.clone());
        self.sandbox.wait_for_creation(&id).await?;

        let urls = self.expose_all(&id, &mut failures).await;

        self.phase = Phase::WaitingNetworkReady;
        let delay = self.settings.network_ready_delay();
        if !delay.is_zero() {
            info!(delay_secs = delay.as_secs(), "waiting for exposed ports to become reachable");
            tokio::time::sleep(delay).await;
        }

        self.start_all(&id, &mut failures).await;

        self.phase = Phase::Connecting;
        let ready = self.connect_all(&urls, &mut failures).await;

        let tool_counts: BTreeMap<usize, usize> =
            ready.iter().map(|(i, _, tools)| (*i, tools.len())).collect();
        let discovered: Vec<Discovered<'_>> = ready
            .into_iter()
            .map(|(i, backend, tools)| Discovered {
                config: &self.backends[i],
                backend,
                tools,
            })
            .collect();
        let (registry, collisions) = aggregate(&discovered, self.settings.collision_policy);
        drop(discovered);

        let backends = self
            .backends
            .iter()
            .enumerate()
            .map(|(i, b)| {
                let outcome = match failures.remove(&i) {
                    Some((stage, error)) => BackendOutcome::Failed { stage, error },
                    None => BackendOutcome::Connected {
                        discovered: tool_counts.get(&i).copied().unwrap_or_default(),
                        registered: registry.count_for(&b.name),
                    },
                };
                BackendReport {
                    name: b.name.clone(),
                    outcome,
                }
            })
            .collect();
        self.report = SetupReport {
            backends,
            collisions,
        };
        self.registry = registry;
        self.phase = Phase::Ready;

        #[cfg(feature = "metrics")]
        {
            gauge!(orch_metrics::BACKENDS_CONNECTED).set(self.report.connected_count() as f64);
            gauge!(orch_metrics::TOOLS_REGISTERED).set(self.registry.len() as f64);
            histogram!(orch_metrics::SETUP_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        }

        info!(
            connected = self.report.connected_count(),
            failed = self.report.failures().count(),
            tools = self.registry.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "setup complete"
        );
        Ok(&self.report)
    }

    /// Expose every backend's port before anything is started, so the
    /// propagation wait is paid once.
    async fn expose_all(
        &mut self,
        id: &SandboxId,
        failures: &mut BTreeMap<usize, (SetupStage, String)>,
    ) -> Vec<Option<String>> {
        self.phase = Phase::ExposingAccess;
        let mut urls = vec![None; self.backends.len()];
        for (i, backend) in self.backends.iter().enumerate() {
            let port = backend.effective_port(i);
            match self
                .sandbox
                .expose(id, port, &backend.exposure_name())
                .await
            {
                Ok(exposed) => {
                    let url = backend.endpoint_url(&exposed.url);
                    debug!(server = %backend.name, port, url = %url, "backend endpoint");
                    urls[i] = Some(url);
                    self.exposures.push(exposed);
                },
                Err(e) => fail(failures, i, backend, SetupStage::Expose, e.to_string()),
            }
        }
        urls
    }

    /// Provision then launch each backend, in configuration order.
    async fn start_all(
        &mut self,
        id: &SandboxId,
        failures: &mut BTreeMap<usize, (SetupStage, String)>,
    ) {
        for (i, backend) in self.backends.iter().enumerate() {
            if failures.contains_key(&i) {
                continue;
            }

            self.phase = Phase::Provisioning;
            let opts = ExecOpts::default()
                .with_timeout(self.settings.command_timeout())
                .with_env(&backend.env);
            for command in &backend.provision {
                debug!(server = %backend.name, command = %command, "provisioning");
                let outcome = match self.sandbox.exec(id, command, &opts).await {
                    Ok(result) if result.success() => None,
                    Ok(result) => Some(format!(
                        "`{command}` exited with code {}: {}",
                        result.exit_code,
                        result.output().trim()
                    )),
                    Err(e) => Some(format!("`{command}` failed: {e}")),
                };
                if let Some(message) = outcome {
                    fail(failures, i, backend, SetupStage::Provision, message);
                    break;
                }
            }
            if failures.contains_key(&i) {
                continue;
            }

            self.phase = Phase::StartingBackends;
            let opts = opts.with_timeout(self.settings.start_timeout());
            info!(server = %backend.name, "starting backend");
            if let Err(e) = self
                .sandbox
                .spawn_detached(id, &backend.start_command, &opts)
                .await
            {
                fail(failures, i, backend, SetupStage::Start, e.to_string());
            }
        }
    }

    /// Open every surviving backend concurrently and wait for all of them.
    async fn connect_all(
        &mut self,
        urls: &[Option<String>],
        failures: &mut BTreeMap<usize, (SetupStage, String)>,
    ) -> Vec<(usize, Arc<dyn ToolBackend>, ToolMap)> {
        let mut candidates = Vec::new();
        for (i, backend) in self.backends.iter().enumerate() {
            if failures.contains_key(&i) {
                continue;
            }
            let Some(url) = urls.get(i).and_then(Option::as_ref) else {
                continue;
            };
            let connection = self.factory.build(backend, url);
            self.connections.push(Arc::clone(&connection));
            candidates.push((i, connection));
        }

        let timeout = self.settings.connect_timeout();
        let attempts = candidates.into_iter().map(move |(i, connection)| async move {
            let outcome = if timeout.is_zero() {
                connection.connect().await.map_err(|e| e.to_string())
            } else {
                match tokio::time::timeout(timeout, connection.connect()).await {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(_) => Err(format!("timed out after {}s", timeout.as_secs())),
                }
            };
            (i, connection, outcome)
        });

        let mut ready = Vec::new();
        for (i, backend, outcome) in join_all(attempts).await {
            let config = &self.backends[i];
            match outcome {
                Ok(tools) => {
                    info!(server = %config.name, tools = tools.len(), "backend connected");
                    ready.push((i, backend, tools));
                },
                Err(message) => fail(failures, i, config, SetupStage::Connect, message),
            }
        }
        ready
    }

    /// Invoke a registered tool by name.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<String> {
        self.registry.call(name, arguments).await
    }

    /// Tear down once `finished` holds. Returns whether teardown ran.
    pub async fn complete_if(&mut self, finished: bool) -> bool {
        if !finished || self.phase == Phase::Terminated {
            return false;
        }
        self.teardown().await;
        true
    }

    /// Disconnect every backend, release every exposure, delete the sandbox.
    ///
    /// Each step is best-effort; failures are logged and counted, never
    /// returned. Calling this again is a no-op.
    pub async fn teardown(&mut self) {
        if self.phase == Phase::Terminated {
            debug!("teardown already done");
            return;
        }
        self.phase = Phase::TearingDown;
        info!(
            connections = self.connections.len(),
            exposures = self.exposures.len(),
            "tearing down"
        );

        // Wrappers must stop resolving before their backends go away.
        self.registry.clear();

        let grace = self.settings.disconnect_timeout() + Duration::from_secs(1);
        for connection in self.connections.drain(..) {
            if tokio::time::timeout(grace, connection.disconnect())
                .await
                .is_err()
            {
                error!(server = %connection.name(), "disconnect did not finish, skipping");
                teardown_failure("disconnect");
            }
        }

        if let Some(id) = self.sandbox_id.take() {
            for exposure in self.exposures.drain(..) {
                if let Err(e) = self.sandbox.unexpose(&id, &exposure.exposure_id).await {
                    error!(exposure = %exposure.name, error = %e, "failed to release exposure");
                    teardown_failure("unexpose");
                }
            }
            match self.sandbox.delete(&id).await {
                Ok(()) => info!(sandbox = %id, "sandbox deleted"),
                Err(e) => {
                    error!(sandbox = %id, error = %e, "failed to delete sandbox");
                    teardown_failure("delete");
                },
            }
        }
        self.exposures.clear();

        #[cfg(feature = "metrics")]
        {
            gauge!(orch_metrics::BACKENDS_CONNECTED).set(0.0);
            gauge!(orch_metrics::TOOLS_REGISTERED).set(0.0);
        }
        self.phase = Phase::Terminated;
    }
}

impl Drop for MultiServerOrchestrator {
    fn drop(&mut self) {
        if self.phase != Phase::Terminated
            && let Some(id) = &self.sandbox_id
        {
            warn!(sandbox = %id, "orchestrator dropped without teardown, sandbox left running");
        }
    }
}

fn fail(
    failures: &mut BTreeMap<usize, (SetupStage, String)>,
    index: usize,
    backend: &BackendConfig,
    stage: SetupStage,
    message: String,
) {
    warn!(server = %backend.name, stage = %stage, error = %message, "backend setup failed");
    #[cfg(feature = "metrics")]
    counter!(
        orch_metrics::BACKEND_FAILURES_TOTAL,
        labels::SERVER => backend.name.clone(),
        labels::STAGE => stage.as_str()
    )
    .increment(1);
    failures.entry(index).or_insert((stage, message));
}

fn teardown_failure(step: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(orch_metrics::TEARDOWN_FAILURES_TOTAL, labels::STEP => step).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = step;
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        mcpbox_sandbox::HostSandbox,
    };

    struct NoBackends;

    impl ConnectionFactory for NoBackends {
        fn build(&self, backend: &BackendConfig, _url: &str) -> Arc<dyn ToolBackend> {
            Arc::new(mcpbox_mcp::SyntheticTransport::new(backend.name.clone()).failing_handshake("offline"))
        }
    }

    #[test]
    fn empty_backend_list_is_rejected() {
        let result = MultiServerOrchestrator::new(
            Vec::new(),
            OrchestratorConfig::default(),
            "sbx",
            Arc::new(HostSandbox::new()),
            Arc::new(NoBackends),
        );
        assert!(matches!(result, Err(Error::MissingBackends)));
    }

    #[tokio::test]
    async fn teardown_before_setup_terminates() {
        let mut orch = MultiServerOrchestrator::new(
            vec![BackendConfig::new("alpha", "true")],
            OrchestratorConfig::default(),
            "sbx",
            Arc::new(HostSandbox::new()),
            Arc::new(NoBackends),
        )
        .unwrap();
        orch.teardown().await;
        assert_eq!(orch.phase(), Phase::Terminated);
        assert!(matches!(
            orch.setup().await,
            Err(Error::InvalidPhase(Phase::Terminated))
        ));
    }

    #[tokio::test]
    async fn host_sandbox_end_to_end_with_failing_backend() {
        let settings = OrchestratorConfig {
            network_ready_delay_secs: 0,
            ..Default::default()
        };
        let backend = BackendConfig::new("alpha", "sleep 30").with_provision(["echo ready > marker"]);
        let mut orch = MultiServerOrchestrator::new(
            vec![backend],
            settings,
            "mcpbox-orch-test",
            Arc::new(HostSandbox::new()),
            Arc::new(NoBackends),
        )
        .unwrap();

        let report = orch.setup().await.unwrap().clone();
        assert!(matches!(
            report.outcome("alpha"),
            Some(BackendOutcome::Failed {
                stage: SetupStage::Connect,
                ..
            })
        ));
        assert!(orch.tools().is_empty());
        assert!(matches!(
            orch.call_tool("anything", Value::Null).await,
            Err(Error::UnknownTool(_))
        ));

        assert!(orch.complete_if(true).await);
        assert!(!orch.complete_if(true).await);
        assert!(orch.sandbox_id().is_none());
    }
}
