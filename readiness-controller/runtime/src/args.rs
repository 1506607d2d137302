use crate::{
    core::{Category, SharedTracker, Tracker},
    index::{self, DynamicWatches, KubeLister},
    k8s, probe,
};
use anyhow::{bail, Result};
use clap::Parser;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use std::net::SocketAddr;
use tokio::time;
use tracing::{info_span, Instrument};

/// The maximum number of unobserved objects logged per kind.
const REPORT_LIMIT: usize = 10;

#[derive(Debug, Parser)]
#[clap(
    name = "readiness",
    about = "Tracks whether existing policy resources have been observed"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "readiness=info,warn",
        env = "READINESS_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    #[clap(long, default_value = "0.0.0.0:9090")]
    readiness_addr: SocketAddr,

    /// Tracks external data providers.
    #[clap(long)]
    enable_external_data: bool,

    /// Tracks mutators.
    #[clap(long)]
    enable_mutation: bool,

    /// Only lists namespaced resources in this namespace.
    #[clap(long)]
    list_namespace: Option<String>,

    /// How often unsatisfied expectations are logged.
    #[clap(
        long,
        default_value = "30",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    report_interval_secs: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            readiness_addr,
            enable_external_data,
            enable_mutation,
            list_namespace,
            report_interval_secs,
        } = self;

        let kinds = index::kinds::tracked(enable_external_data, enable_mutation);
        let tracker = Tracker::shared(kinds.clone());

        let mut prom = <Registry>::default();
        crate::core::metrics::register(
            prom.sub_registry_with_prefix("readiness"),
            tracker.clone(),
        );
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        // Spawn watches on the governing resources.

        let templates = runtime.watch_all::<k8s::ConstraintTemplate>(watcher::Config::default());
        tokio::spawn(
            kubert::index::cluster(index::templates::Index::shared(tracker.clone()), templates)
                .instrument(info_span!("constrainttemplates")),
        );

        let configs_index = index::config::Index::shared(tracker.clone());
        match &list_namespace {
            Some(ns) => {
                let configs =
                    runtime.watch_namespaced::<k8s::Config>(ns.clone(), watcher::Config::default());
                tokio::spawn(
                    kubert::index::namespaced(configs_index, configs)
                        .instrument(info_span!("configs")),
                );
            }
            None => {
                let configs = runtime.watch_all::<k8s::Config>(watcher::Config::default());
                tokio::spawn(
                    kubert::index::namespaced(configs_index, configs)
                        .instrument(info_span!("configs")),
                );
            }
        }

        if let Some(providers_index) = index::providers::Index::shared(tracker.clone()) {
            let providers = runtime.watch_all::<k8s::Provider>(watcher::Config::default());
            tokio::spawn(
                kubert::index::cluster(providers_index, providers)
                    .instrument(info_span!("providers")),
            );
        }

        // Spawn watches on the kinds the governing resources require.
        for category in [Category::Objects, Category::Data] {
            let watches = DynamicWatches::new(
                runtime.client(),
                tracker.clone(),
                category,
                list_namespace.clone(),
            );
            tokio::spawn(
                watches
                    .run(runtime.shutdown_handle())
                    .instrument(info_span!("dynamic", %category)),
            );
        }

        let lister = KubeLister::new(runtime.client(), kinds, list_namespace);
        tokio::spawn(
            track(tracker.clone(), lister, runtime.shutdown_handle())
                .instrument(info_span!("tracker")),
        );

        tokio::spawn(
            report(
                tracker.clone(),
                time::Duration::from_secs(report_interval_secs),
            )
            .instrument(info_span!("report")),
        );

        tokio::spawn(probe::serve(
            readiness_addr,
            tracker,
            runtime.shutdown_handle(),
        ));

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

async fn track(tracker: SharedTracker, lister: KubeLister, shutdown: drain::Watch) {
    match tracker.run(lister, shutdown).await {
        Ok(()) => tracing::debug!("Tracker stopped"),
        Err(error) => tracing::warn!(%error, "Tracker stopped"),
    }
}

/// Periodically logs the expectations that hold back readiness, along with
/// changes in readiness.
async fn report(tracker: SharedTracker, period: time::Duration) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    let mut was_satisfied = false;
    loop {
        interval.tick().await;

        let satisfied = tracker.satisfied();
        if satisfied != was_satisfied {
            tracing::info!(satisfied, "Readiness changed");
            was_satisfied = satisfied;
        }
        if !satisfied {
            tracker.log_unsatisfied(REPORT_LIMIT);
        }
    }
}
