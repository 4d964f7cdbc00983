use crate::{
    init_logging,
    Args,
};
use color_eyre::Result;
use eyre::Context as _;
use ldap_stats_config::{
    ConfigNode,
    Settings,
};
use ldap_stats_exporter::{
    Exporters,
    ViewStore,
};
use ldap_stats_gatherer::{
    compile_configuration,
    MetricSet,
    Reconfiguration,
    Scheduler,
    ServerRegistry,
};
use std::{
    path::PathBuf,
    sync::Arc,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Owns everything that lives for the whole process: the server registry,
/// the view store and the running exporters.
pub struct App {
    config_path: PathBuf,
    tree: ConfigNode,
    settings: Settings,
    registry: ServerRegistry,
    store: ViewStore,
}

enum Event {
    Reload,
    Shutdown,
}

impl App {
    /// Loads the configuration and initializes logging from it.
    pub fn new(args: Args) -> Result<Self> {
        let (tree, settings) = ldap_stats_config::load(&args.config)
            .wrap_err_with(|| format!("Failed to load the configuration from {}", args.config.display()))?;
        init_logging(&settings.log_config.clone().unwrap_or_default())?;
        info!(
            path = %args.config.display(),
            servers = settings.ldap_servers.len(),
            period = ?settings.period,
            "loaded configuration"
        );

        Ok(Self {
            config_path: args.config,
            tree,
            settings,
            registry: ServerRegistry::default(),
            store: ViewStore::new(),
        })
    }

    pub async fn run(mut self) -> Result<()> {
        let token = CancellationToken::new();
        let mut signals = Signals::new()?;

        let metric_sets = compile_configuration(self.tree.clone(), &self.registry, &self.store)
            .await
            .inspect_err(|err| error!("{err}"))
            .wrap_err("Invalid configuration")?;
        let mut exporters = Exporters::start(&self.settings.exporters, &self.store, &token)
            .await
            .inspect_err(|err| error!("{err}"))
            .wrap_err("Failed to start the exporters")?;

        let scheduler = Scheduler::new(metric_sets, self.settings.period, Arc::new(self.store.clone()))
            .with_parallel_collection(self.settings.parallel_collection);
        let (updates, receiver) = mpsc::channel(1);
        let scheduler = tokio::spawn(scheduler.run(token.clone(), receiver));

        loop {
            match signals.next().await {
                Event::Shutdown => break,
                Event::Reload => {
                    exporters = self.reload(exporters, &updates, &token).await;
                }
            }
        }

        info!("shutting down");
        token.cancel();
        scheduler.await.wrap_err("The scheduler task failed")?;
        exporters.stop().await;
        Ok(())
    }

    /// Rebuilds everything from the configuration file. On failure the
    /// running configuration stays in place.
    async fn reload(
        &mut self,
        exporters: Exporters,
        updates: &mpsc::Sender<Reconfiguration>,
        token: &CancellationToken,
    ) -> Exporters {
        info!(path = %self.config_path.display(), "reloading configuration");
        let (tree, settings, metric_sets) = match self.prepare_reload().await {
            Ok(prepared) => prepared,
            Err(err) => {
                error!("Reload failed, keeping the running configuration: {err:#}");
                return exporters;
            }
        };

        if settings.log_config != self.settings.log_config {
            warn!("logging cannot be reconfigured at runtime, restart to apply the new log_config");
        }

        let metric_names = metric_sets
            .iter()
            .flat_map(MetricSet::statistics)
            .map(|statistic| statistic.metric_name().to_string())
            .collect::<Vec<_>>();
        let reconfiguration = Reconfiguration {
            metric_sets,
            period: settings.period,
            parallel: settings.parallel_collection,
        };
        if updates.send(reconfiguration).await.is_err() {
            warn!("scheduler is no longer running, the new configuration is not applied");
        }
        self.store.retain_views(&metric_names);

        let exporters = if exporters.configs() == settings.exporters.as_slice() {
            exporters
        } else {
            self.restart_exporters(exporters, &settings, token).await
        };

        self.tree = tree;
        self.settings = settings;
        exporters
    }

    async fn prepare_reload(&self) -> Result<(ConfigNode, Settings, Vec<MetricSet>)> {
        let (tree, settings) = ldap_stats_config::load(&self.config_path)?;
        let metric_sets = compile_configuration(tree.clone(), &self.registry, &self.store).await?;
        Ok((tree, settings, metric_sets))
    }

    async fn restart_exporters(
        &self,
        running: Exporters,
        settings: &Settings,
        token: &CancellationToken,
    ) -> Exporters {
        info!("exporter configuration changed, restarting exporters");
        let previous = running.configs().to_vec();
        running.stop().await;

        match Exporters::start(&settings.exporters, &self.store, token).await {
            Ok(exporters) => exporters,
            Err(err) => {
                error!("Failed to start the new exporters, restoring the previous ones: {err}");
                match Exporters::start(&previous, &self.store, token).await {
                    Ok(exporters) => exporters,
                    Err(err) => {
                        error!("Failed to restore the previous exporters: {err}");
                        Exporters::stopped(token)
                    }
                }
            }
        }
    }
}

struct Signals {
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl Signals {
    fn new() -> Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{
                signal,
                SignalKind,
            };
            Ok(Self {
                hangup: signal(SignalKind::hangup()).wrap_err("Failed to listen for SIGHUP")?,
                terminate: signal(SignalKind::terminate()).wrap_err("Failed to listen for SIGTERM")?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    async fn next(&mut self) -> Event {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => Event::Shutdown,
                _ = self.terminate.recv() => Event::Shutdown,
                _ = self.hangup.recv() => Event::Reload,
            }
        }
        #[cfg(not(unix))]
        {
            // A failure to listen means no signal can arrive, shut down.
            let _ = tokio::signal::ctrl_c().await;
            Event::Shutdown
        }
    }
}
