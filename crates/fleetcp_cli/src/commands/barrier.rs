//! Copy through the relay fleet, waiting on the completion barrier.

use crate::error::CliResult;
use crate::output::{render, OutputFormat};
use fleetcp_core::{load_files, CopyConfig};
use fleetcp_engine::{BarrierConfig, BarrierReport, FleetSyncBarrier, LoopbackExecutor};
use fleetcp_protocol::TransferResult;
use fleetcp_relay::{MemoryBroker, Relay, RelayConfig, RelayHandle};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Publishes the copy to `relays` relays over the loopback fleet under `root`.
pub fn run(
    config: &CopyConfig,
    barrier_config: BarrierConfig,
    root: &Path,
    relays: usize,
    format: OutputFormat,
) -> CliResult<()> {
    let report = execute(config, barrier_config, root, relays, |result| {
        match render(result, format) {
            Ok(text) => print!("{text}"),
            Err(e) => warn!("Unable to render result: {}", e),
        }
    })?;
    info!(
        "{} relay(s) finished, {} interrupted, {} undecodable event(s)",
        report.finished.len(),
        report.interrupted.len(),
        report.decode_errors
    );
    Ok(())
}

/// Runs the barrier and streams every partial result to `sink`.
pub fn execute<F>(
    config: &CopyConfig,
    barrier_config: BarrierConfig,
    root: &Path,
    relays: usize,
    sink: F,
) -> CliResult<BarrierReport>
where
    F: FnMut(&TransferResult),
{
    let files = load_files(&config.sources)?;
    let workers = LoopbackExecutor::discover(root)?.workers().to_vec();
    let broker = Arc::new(MemoryBroker::new());
    let handles = spawn_relays(&broker, root, &workers, relays, config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let barrier = FleetSyncBarrier::new(Arc::clone(&broker), barrier_config);
    let outcome = runtime.block_on(barrier.run(config, files, sink));

    for handle in handles {
        handle.shutdown(&broker);
    }
    Ok(outcome?)
}

/// Starts `count` relays, splitting the workers between them round-robin.
fn spawn_relays(
    broker: &Arc<MemoryBroker>,
    root: &Path,
    workers: &[String],
    count: usize,
    config: &CopyConfig,
) -> CliResult<Vec<RelayHandle>> {
    let count = count.max(1);
    let mut handles = Vec::with_capacity(count);
    for i in 0..count {
        let share: Vec<String> = workers.iter().skip(i).step_by(count).cloned().collect();
        let executor = Arc::new(LoopbackExecutor::new(root, share));
        let relay_config =
            RelayConfig::new(format!("relay{}", i + 1)).with_call_timeout(config.timeout);
        let relay = Relay::new(relay_config, Arc::clone(broker), executor);
        match relay.spawn() {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                for handle in handles {
                    handle.shutdown(broker);
                }
                return Err(e.into());
            }
        }
    }
    Ok(handles)
}
