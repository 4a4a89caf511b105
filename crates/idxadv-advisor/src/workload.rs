//! # Workload Ingestion
//!
//! A background reader enumerates numerically named workload files
//! (`1.sql`, `2.sql`, ..., one statement per file) and publishes each
//! statement onto a bounded channel. The channel is both the transfer queue
//! and the end-of-workload signal: when the reader finishes, the sending
//! side drops and the receiver drains to disconnection. The consumer awaits
//! each statement's completion before taking the next, so statements observe
//! program order.

use crate::error::AdvisorError;
use crate::session::AdvisorRegistry;
use crossbeam_channel::{bounded, Receiver};
use idxadv_core::engine::{Engine, EngineSession};
use std::path::PathBuf;
use std::thread;
use tracing::{error, info, warn};

/// Capacity of the statement queue between reader and driver.
pub const QUERY_QUEUE_CAPACITY: usize = 10_000;

/// Spawn the workload reader for a directory of `<n>.sql` files. Returns
/// the receiving end of the statement queue; the queue closes when every
/// file has been published.
pub fn spawn_workload_reader(dir: PathBuf) -> Receiver<String> {
    let (tx, rx) = bounded(QUERY_QUEUE_CAPACITY);
    thread::spawn(move || {
        let count = match std::fs::read_dir(&dir) {
            Ok(entries) => entries.count(),
            Err(err) => {
                error!(dir = %dir.display(), error = %err, "cannot read workload directory");
                return;
            }
        };
        info!(dir = %dir.display(), files = count, "reading workload");

        for i in 1..=count {
            let path = dir.join(format!("{i}.sql"));
            match std::fs::read_to_string(&path) {
                Ok(contents) => {
                    let statement = contents.trim().to_string();
                    if tx.send(statement).is_err() {
                        // Receiver is gone; stop reading.
                        return;
                    }
                }
                Err(err) => {
                    error!(file = %path.display(), error = %err, "cannot read workload file");
                }
            }
        }
    });
    rx
}

/// Drive a workload directory through an engine session, one statement at a
/// time in file order, awaiting each statement before taking the next. A
/// failed statement contributes no cost signals and is skipped. Queue
/// closure ends the workload and finalizes every bound advisor session.
///
/// The advisor session must be ready (session variable acknowledged via
/// `AdvisorRegistry::mark_ready`) before the workload starts; driving an
/// unready session is an error.
pub fn run_workload(
    engine: &Engine,
    session: &mut EngineSession,
    dir: PathBuf,
    registry: &AdvisorRegistry,
) -> Result<u64, AdvisorError> {
    let advisor = registry.get_or_register(&session.conn_id.to_string())?;
    if !advisor.lock().expect("session lock poisoned").is_ready() {
        return Err(AdvisorError::SessionVar(
            "advisor session is not ready; check that the session variable has been set".into(),
        ));
    }

    let rx = spawn_workload_reader(dir);
    let mut count = 0u64;
    for statement in rx {
        count += 1;
        info!(query = count, "evaluating statement");
        if let Err(err) = engine.execute(session, &statement) {
            warn!(query = count, error = %err, "statement failed, skipping");
        }
    }
    registry.finalize_all()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_arrive_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1.sql"), "select 1\n").unwrap();
        std::fs::write(dir.path().join("2.sql"), "select 2  ").unwrap();
        std::fs::write(dir.path().join("3.sql"), "select 3").unwrap();

        let rx = spawn_workload_reader(dir.path().to_path_buf());
        let statements: Vec<String> = rx.iter().collect();
        assert_eq!(statements, vec!["select 1", "select 2", "select 3"]);
    }

    #[test]
    fn test_queue_closes_after_last_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1.sql"), "select 1").unwrap();
        let rx = spawn_workload_reader(dir.path().to_path_buf());
        assert_eq!(rx.recv().unwrap(), "select 1");
        assert!(rx.recv().is_err());
    }

    #[test]
    fn test_missing_directory_closes_queue() {
        let rx = spawn_workload_reader(PathBuf::from("/nonexistent/workload"));
        assert!(rx.recv().is_err());
    }
}
