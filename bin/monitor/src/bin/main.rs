use clap::Parser;
use detector::Detector;
use monitor::{
    bootstrap, config::MonitorArgs, connect, init_tracing,
    metrics::{gauge_idle_timeout, install_prometheus_exporter, Metrics},
    run, shutdown_signal,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "faultproof-monitor")]
#[command(about = "Detect forged withdrawals proven against the OptimismPortal")]
struct Cli {
    #[command(flatten)]
    monitor: MonitorArgs,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.monitor.log_format);

    let config = cli.monitor.resolve()?;
    info!(
        l1 = %config.l1_geth_url,
        l2 = %config.l2_geth_url,
        portal = %config.portal_address()?,
        event_block_range = config.event_block_range,
        poll_interval_secs = config.poll_interval_secs,
        "Starting faultproof withdrawal monitor"
    );

    let poll_interval = Duration::from_secs(config.poll_interval_secs);
    install_prometheus_exporter(config.metrics_port, gauge_idle_timeout(poll_interval))?;
    info!(port = config.metrics_port, "Metrics exporter listening");
    let mut metrics = Metrics::new();

    let (l1, l2) = connect(&config).await?;
    let state = bootstrap(&l1, &l2, &config).await?;
    let detector = Detector::new(l1, l2, config.event_block_range);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!(error = %e, "Signal handler failed");
        }
        on_signal.cancel();
    });

    let state = run(
        detector,
        state,
        &mut metrics,
        poll_interval,
        cancel,
    )
    .await;

    state.log_state();
    info!("Monitor stopped");
    Ok(())
}
