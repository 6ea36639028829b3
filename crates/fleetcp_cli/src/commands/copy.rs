//! Direct copy: chunked transfer or a single receive-files call.

use crate::error::CliResult;
use crate::output::{render, OutputFormat};
use fleetcp_core::{CopyConfig, StaticResolver, TargetResolver};
use fleetcp_engine::{send_files, ChunkedTransferEngine, LoopbackExecutor};
use fleetcp_protocol::TransferResult;
use std::path::Path;
use tracing::info;

/// Copies the configured sources to the loopback fleet under `root`.
pub fn run(config: &CopyConfig, root: &Path, format: OutputFormat) -> CliResult<()> {
    let result = execute(config, root)?;
    print!("{}", render(&result, format)?);
    Ok(())
}

/// Runs the copy and returns the per-worker result.
pub fn execute(config: &CopyConfig, root: &Path) -> CliResult<TransferResult> {
    let executor = LoopbackExecutor::discover(root)?;
    info!("Loopback fleet at {:?} with {} worker(s)", root, executor.workers().len());

    if !config.chunked {
        return Ok(send_files(config, &executor)?);
    }

    let targets = StaticResolver::new(executor.workers()).resolve(&config.target);
    let engine = ChunkedTransferEngine::new(config.clone(), executor);
    let result = engine.run(&targets)?;
    let stats = engine.stats();
    info!(
        "Sent {} file(s) in {} chunk(s), {} skipped",
        stats.files, stats.chunks, stats.skipped
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetcp_protocol::{Outcome, TargetExpr};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn chunked_copy_into_loopback_fleet() {
        let fleet = TempDir::new().unwrap();
        fs::create_dir(fleet.path().join("web1")).unwrap();
        fs::create_dir(fleet.path().join("db1")).unwrap();

        let src = TempDir::new().unwrap();
        let conf = src.path().join("conf");
        fs::create_dir_all(conf.join("sites")).unwrap();
        fs::write(conf.join("app.ini"), "port = 80\n").unwrap();
        fs::write(conf.join("sites/default"), "root /srv\n").unwrap();

        let config = CopyConfig::new(vec![conf], "/etc", TargetExpr::glob("web*"))
            .with_chunked(true)
            .with_chunk_size(4);
        let result = execute(&config, fleet.path()).unwrap();

        assert_eq!(result.get("web1", "/etc/conf/app.ini"), Some(&Outcome::Success));
        assert!(result.worker("db1").is_none());
        let copied = fs::read_to_string(fleet.path().join("web1/etc/conf/sites/default")).unwrap();
        assert_eq!(copied, "root /srv\n");
    }

    #[test]
    fn one_shot_copy_into_loopback_fleet() {
        let fleet = TempDir::new().unwrap();
        fs::create_dir(fleet.path().join("w1")).unwrap();

        let src = TempDir::new().unwrap();
        let motd = src.path().join("motd");
        fs::write(&motd, "welcome\n").unwrap();

        let config = CopyConfig::new(vec![motd], "/etc/", TargetExpr::list(["w1"]));
        let result = execute(&config, fleet.path()).unwrap();
        assert!(result.all_succeeded());
        assert_eq!(
            fs::read_to_string(fleet.path().join("w1/etc/motd")).unwrap(),
            "welcome\n"
        );
    }
}
