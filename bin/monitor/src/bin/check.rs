//! One-shot inspection of proven withdrawals.
//!
//! - `withdrawal`: enrich and validate a single proof submission
//! - `range`: run the detection pipeline over an L1 block range, without state

use alloy_primitives::{Address, B256};
use clap::{Parser, Subcommand};
use detector::{Detector, ScanWindow, Validated};
use monitor::{config::MonitorArgs, connect, init_tracing};
use tracing::info;
use withdrawal::WithdrawalProvenEvent;

#[derive(Parser)]
#[command(name = "check")]
#[command(about = "Validate proven withdrawals without running the monitor")]
struct Cli {
    #[command(flatten)]
    monitor: MonitorArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate one proof submission
    Withdrawal {
        /// Withdrawal hash
        #[arg(long)]
        hash: B256,

        /// Account that submitted the proof
        #[arg(long)]
        submitter: Address,
    },

    /// Validate every withdrawal proven in an inclusive L1 block range
    Range {
        #[arg(long)]
        from: u64,

        #[arg(long)]
        to: u64,
    },
}

fn print(validated: &Validated) -> eyre::Result<()> {
    let report = serde_json::json!({
        "outcome": validated.outcome.as_str(),
        "event": validated.event,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.monitor.log_format);

    let config = cli.monitor.resolve()?;
    let (l1, l2) = connect(&config).await?;
    let mut detector = Detector::new(l1, l2, config.event_block_range);

    match cli.command {
        Command::Withdrawal { hash, submitter } => {
            info!(withdrawal_hash = %hash, proof_submitter = %submitter, "Checking withdrawal");

            // Not tied to a particular log, so block and tx are left empty.
            let event = WithdrawalProvenEvent {
                withdrawal_hash: hash,
                proof_submitter: submitter,
                block_number: 0,
                tx_hash: B256::ZERO,
            };
            let validated = detector.process(event).await?;
            print(&validated)?;
        }
        Command::Range { from, to } => {
            eyre::ensure!(from <= to, "--from {from} is above --to {to}");
            info!(from, to, "Checking block range");

            let mut total = 0;
            let mut cursor = from;
            while cursor <= to {
                let window = ScanWindow {
                    from: cursor,
                    to: cursor
                        .saturating_add(config.event_block_range - 1)
                        .min(to),
                };
                for validated in detector.scan(window).await? {
                    print(&validated)?;
                    total += 1;
                }
                if window.to == u64::MAX {
                    break;
                }
                cursor = window.next_cursor();
            }
            info!(from, to, withdrawals = total, "Range checked");
        }
    }

    info!(
        l1_requests = detector.l1().stats().calls(),
        l1_failures = detector.l1().stats().failures(),
        l2_requests = detector.l2().stats().calls(),
        l2_failures = detector.l2().stats().failures(),
        "Node usage"
    );
    Ok(())
}
