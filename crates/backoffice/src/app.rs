//! Application wiring.
//!
//! [`App::builder`] turns a [`BackofficeConfig`] plus the external
//! collaborators (database, session store) into a ready-to-serve server, a
//! job runner and an optional daily scheduler. Everything shared between them
//! is created here once: the contract table, the fan-out registry and the
//! runner.

use std::sync::Arc;

use anyhow::Context as _;
use backoffice_authz::Authorizer;
use backoffice_config::{BackofficeConfig, StreamSection};
use backoffice_core::{
    ContractDefinition, ContractHandler, ContractRegistry, Database, IdentityResolver,
    ServiceRegistry, SessionResolver, StaticSessions,
};
use backoffice_docs::OpenApiGenerator;
use backoffice_server::{Dispatcher, HandlerRegistry, Server, ShutdownSignal};
use backoffice_sse::{FanoutRegistry, StreamConfig};
use backoffice_tasks::{DailyScheduler, JobRunner};
use tracing::{info, warn};

use crate::contracts;

/// Stream settings from configuration.
fn stream_config(section: &StreamSection) -> StreamConfig {
    let config = StreamConfig::new().with_buffer_size(section.buffer_size);
    let config = match section.keep_alive() {
        Some(interval) => config.with_keep_alive(interval),
        None => config.without_keep_alive(),
    };
    match section.retry() {
        Some(retry) => config.with_retry(retry),
        None => config.without_retry(),
    }
}

/// A wired back-office instance.
pub struct App {
    server: Server,
    runner: Arc<JobRunner>,
    fanout: FanoutRegistry,
    scheduler: Option<DailyScheduler>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("contracts", &self.server.dispatcher().contracts().len())
            .field("stream_clients", &self.fanout.len())
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl App {
    /// Starts wiring an instance.
    pub fn builder(config: BackofficeConfig) -> AppBuilder {
        AppBuilder {
            config,
            database: None,
            sessions: None,
            contracts: ContractRegistry::new(),
            handlers: HandlerRegistry::new(),
        }
    }

    /// The HTTP server.
    pub fn server(&self) -> &Server {
        &self.server
    }

    /// The contract dispatcher.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        self.server.dispatcher()
    }

    /// The aggregation runner.
    pub fn runner(&self) -> &Arc<JobRunner> {
        &self.runner
    }

    /// The fan-out registry shared by the dispatcher and the runner.
    pub fn fanout(&self) -> &FanoutRegistry {
        &self.fanout
    }

    /// The daily scheduler, when `jobs.enabled`.
    pub fn scheduler(&self) -> Option<&DailyScheduler> {
        self.scheduler.as_ref()
    }

    /// Serves until SIGTERM or SIGINT.
    pub async fn run(self) -> anyhow::Result<()> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals()).await
    }

    /// Serves until `shutdown` triggers, running the scheduler alongside.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> anyhow::Result<()> {
        let Self {
            server, scheduler, ..
        } = self;

        if let Some(scheduler) = &scheduler {
            scheduler.start()?;
        }
        let served = server.run_with_shutdown(shutdown).await;
        if let Some(scheduler) = &scheduler {
            scheduler.stop().await;
        }

        served.context("server failed")
    }
}

/// Builder for [`App`].
pub struct AppBuilder {
    config: BackofficeConfig,
    database: Option<Arc<dyn Database>>,
    sessions: Option<Arc<dyn SessionResolver>>,
    contracts: ContractRegistry,
    handlers: HandlerRegistry,
}

impl AppBuilder {
    /// Sets the database. Required.
    pub fn database(mut self, database: Arc<dyn Database>) -> Self {
        self.database = Some(database);
        self
    }

    /// Sets the POS session store. Without one no caller resolves to `pos`.
    pub fn sessions(mut self, sessions: Arc<dyn SessionResolver>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Adds an application contract with its handler.
    pub fn contract(
        mut self,
        contract: ContractDefinition,
        handler: impl ContractHandler,
    ) -> anyhow::Result<Self> {
        let name = contract.name().to_string();
        self.contracts
            .register(contract)
            .with_context(|| format!("registering contract '{name}'"))?;
        self.handlers.register(name, handler)?;
        Ok(self)
    }

    /// Wires everything. Fails on an invalid contract table, an unknown
    /// policy, a missing handler, a bad cron expression or a document that
    /// cannot be generated.
    pub fn build(self) -> anyhow::Result<App> {
        let Self {
            config,
            database,
            sessions,
            mut contracts,
            mut handlers,
        } = self;
        let database = database.context("a database is required")?;

        let fanout = FanoutRegistry::new(stream_config(&config.stream));
        let runner = Arc::new(JobRunner::daily().with_publisher(Arc::new(fanout.clone())));
        contracts::register(&mut contracts, &mut handlers)?;
        let contracts = Arc::new(contracts);

        let sessions = sessions.unwrap_or_else(|| Arc::new(StaticSessions::new()));
        let identity = IdentityResolver::new(
            config.auth.bot_token.clone(),
            config.auth.admin_token.clone(),
            sessions,
        );

        let dispatcher = Dispatcher::builder(Arc::clone(&contracts))
            .handlers(handlers)
            .authorizer(Authorizer::default())
            .identity(identity)
            .database(Arc::clone(&database))
            .services(Arc::new(ServiceRegistry::new().with(Arc::clone(&runner))))
            .fanout(fanout.clone())
            .build()?;

        let mut server = Server::new(Arc::new(dispatcher), config.server.clone())
            .service_name(config.telemetry.service_name.clone());

        if config.docs_served() {
            let docs = OpenApiGenerator::new()
                .title("Back office API")
                .unrepresentable(config.docs.unrepresentable)
                .generate(&contracts)?;
            for skipped in &docs.skipped {
                warn!(contract = %skipped.contract, reason = %skipped.reason, "contract left out of documentation");
            }
            server = server.with_docs(config.docs.path.clone(), docs.document.to_json()?);
            info!(path = %config.docs.path, "documentation endpoint mounted");
        }

        let scheduler = if config.jobs.enabled {
            Some(DailyScheduler::new(
                Arc::clone(&runner),
                database,
                &config.jobs.daily_cron,
            )?)
        } else {
            None
        };

        info!(
            environment = ?config.environment,
            contracts = contracts.len(),
            scheduler = scheduler.is_some(),
            "back office wired"
        );

        Ok(App {
            server,
            runner,
            fanout,
            scheduler,
        })
    }
}
