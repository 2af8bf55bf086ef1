pub mod config;
pub mod metrics;

use crate::{config::LogFormat, metrics::Metrics};
use alloy_provider::Provider;
use ::config::{MonitorConfig, NetworkConfig};
use detector::{resolve_start_height, Detector, MonitorState};
use eyre::WrapErr;
use proxy::{L1Proxy, L1Reader, L2Endpoint, L2Proxy, L2Reader};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::time::MissedTickBehavior;
use tokio_retry::{strategy::ExponentialBackoff, Retry};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

/// Seconds since the unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

/// Connect to every configured node and build the chain readers.
pub async fn connect(
    config: &MonitorConfig,
) -> eyre::Result<(L1Proxy<impl Provider + Clone>, L2Proxy<impl Provider + Clone>)> {
    let portal = config.portal_address()?;

    let (l1_provider, l1_chain_id) = client::connect_provider(&config.l1_geth_url)
        .await
        .wrap_err("failed to connect to L1")?;
    let l1 = L1Proxy::connect(l1_provider, portal)
        .await
        .wrap_err("failed to read the dispute game factory")?;
    info!(l1_chain_id, portal = %l1.portal(), factory = %l1.factory(), "L1 proxy ready");

    let mut backups = Vec::with_capacity(config.l2_geth_backup_urls.len());
    for endpoint in &config.l2_geth_backup_urls {
        let provider = client::create_provider(&endpoint.url).await?;
        backups.push(L2Endpoint::new(endpoint.name.clone(), provider));
    }
    let mut l2 = L2Proxy::new(client::create_provider(&config.l2_geth_url).await?)
        .with_backups(backups)
        .with_withdrawal_check(config.withdrawal_check);
    if let Some(url) = &config.l2_node_url {
        l2 = l2.with_rollup_node(client::create_provider(url).await?);
    }
    let l2_chain_id = l2
        .chain_id()
        .await
        .wrap_err("failed to connect to L2")?;
    info!(
        l2_chain_id,
        backups = config.l2_geth_backup_urls.len(),
        rollup_node = config.l2_node_url.is_some(),
        withdrawal_check = ?config.withdrawal_check,
        "L2 proxy ready"
    );

    if let Some(network) = config.network {
        let preset = NetworkConfig::from_network_type(network);
        if preset.ethereum.chain_id != l1_chain_id || preset.op_chain.chain_id != l2_chain_id {
            warn!(
                %network,
                expected_l1_chain_id = preset.ethereum.chain_id,
                expected_l2_chain_id = preset.op_chain.chain_id,
                l1_chain_id,
                l2_chain_id,
                "Nodes do not match the network preset"
            );
        }
    }

    Ok((l1, l2))
}

/// Read both heads and derive the first L1 block to scan.
///
/// These reads retry with exponential backoff, the cycle loop itself never
/// retries.
pub async fn bootstrap<L1: L1Reader, L2: L2Reader>(
    l1: &L1,
    l2: &L2,
    config: &MonitorConfig,
) -> eyre::Result<MonitorState> {
    let strategy = || ExponentialBackoff::from_millis(100).take(5);

    let latest_l1_height = Retry::start(strategy(), || l1.latest_block_height())
        .await
        .wrap_err("failed to read the L1 head")?;
    let latest_l2_height = Retry::start(strategy(), || l2.latest_block_height())
        .await
        .wrap_err("failed to read the L2 head")?;

    let start = Retry::start(strategy(), || async {
        resolve_start_height(
            l1,
            config.start_block_height,
            config.start_block_hours_ago,
            latest_l1_height,
            unix_now(),
        )
        .await
        .map_err(|e| {
            warn!(error = %e, "Start block search failed, will retry");
            e
        })
    })
    .await
    .wrap_err("failed to find the starting L1 block")?;

    info!(
        start_l1_height = start,
        latest_l1_height, latest_l2_height, "Monitor state initialised"
    );
    Ok(MonitorState::new(start, latest_l1_height, latest_l2_height))
}

/// Run cycles every `interval` until `cancel` fires.
///
/// A failed cycle is logged and retried from the same cursor on the next tick.
pub async fn run<L1: L1Reader, L2: L2Reader>(
    mut detector: Detector<L1, L2>,
    mut state: MonitorState,
    metrics: &mut Metrics,
    interval: Duration,
    cancel: CancellationToken,
) -> MonitorState {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    metrics.update_from_state(&state);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Cancellation requested, stopping monitor loop");
                return state;
            }
            _ = ticker.tick() => {
                let started = Instant::now();
                let result = detector.run_cycle(&mut state, unix_now()).await;
                metrics.record_cycle(result.is_ok(), started.elapsed());

                match result {
                    Ok(report) => {
                        for transition in &report.transitions {
                            metrics.record_transition(transition);
                        }
                    }
                    Err(e) => error!(
                        error = %e,
                        transient = e.is_transient(),
                        next_l1_height = state.next_l1_height,
                        "Monitor cycle failed, retrying next tick"
                    ),
                }

                metrics.update_from_state(&state);
                state.log_state();
            }
        }
    }
}

/// Resolve when SIGINT or SIGTERM arrives.
pub async fn shutdown_signal() -> eyre::Result<()> {
    use tokio::signal;

    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .wrap_err("failed to register SIGTERM handler")?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result.wrap_err("failed to listen for SIGINT")?;
                info!("Received SIGINT, shutting down");
            }
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        }
    }
    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .wrap_err("failed to listen for SIGINT")?;
        info!("Received SIGINT, shutting down");
    }

    Ok(())
}
