//! # idxadv-client: Workload Driver for the Index Advisor
//!
//! Connects to a MySQL-compatible server, enables the index-advisor session
//! variable, and submits a workload of SELECT statements read from
//! numerically named files (`<sql-dir>/1.sql`, `2.sql`, ...). The server
//! side does the actual advising; this binary only drives the workload and
//! reports progress.
//!
//! Before connecting it polls the server's `/status` HTTP endpoint until the
//! server is up. Statements that fail are logged and skipped; the advisor
//! records nothing for them. Exit code is 0 on success, 1 on any fatal
//! connection or configuration error.

use clap::Parser;
use idxadv_advisor::error::AdvisorError;
use idxadv_advisor::workload::spawn_workload_reader;
use idxadv_core::engine::ENABLE_INDEX_ADVISOR;
use mysql::prelude::Queryable;
use mysql::{Conn, OptsBuilder};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const STATUS_POLL_RETRIES: u32 = 100;
const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Parser)]
#[command(
    name = "idxadv-client",
    about = "Drive a SELECT workload through a server in index-advisor mode"
)]
struct Args {
    /// Directory holding the workload as 1.sql, 2.sql, ...
    sql_dir: PathBuf,
    /// Status port of the server, polled before the workload starts.
    status_port: u16,
    /// Directory the server writes advisor results into.
    output_dir: PathBuf,
    /// MySQL user.
    user: String,
    /// Server address as host:port.
    addr: String,
    /// MySQL password (may be empty).
    password: String,
    /// Database the workload runs against.
    dbname: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("idxadv=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    if let Err(err) = run(args) {
        error!(error = %err, "index advisor client failed");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), AdvisorError> {
    if !args.sql_dir.is_dir() {
        return Err(AdvisorError::Config(format!(
            "workload directory {} does not exist",
            args.sql_dir.display()
        )));
    }
    std::fs::create_dir_all(&args.output_dir)?;

    let (host, port) = parse_addr(&args.addr)?;
    wait_until_server_online(args.status_port)?;

    let opts = OptsBuilder::new()
        .ip_or_hostname(Some(host))
        .tcp_port(port)
        .user(Some(args.user))
        .pass(Some(args.password))
        .db_name(Some(args.dbname));
    let mut conn =
        Conn::new(opts).map_err(|e| AdvisorError::Connection(e.to_string()))?;

    conn.query_drop(format!("SET {ENABLE_INDEX_ADVISOR} = 1"))
        .map_err(|e| AdvisorError::SessionVar(e.to_string()))?;
    info!("index advisor session variable set");

    let rx = spawn_workload_reader(args.sql_dir);
    let mut count = 0u64;
    for statement in rx {
        count += 1;
        info!(query = count, "evaluating statement");
        // A failed statement contributes no cost signals; move on.
        if let Err(err) = conn.query_drop(&statement) {
            warn!(query = count, error = %err, "statement failed, skipping");
        }
    }
    info!(statements = count, "workload complete");
    Ok(())
}

fn parse_addr(addr: &str) -> Result<(String, u16), AdvisorError> {
    let (host, port) = addr
        .split_once(':')
        .ok_or_else(|| AdvisorError::Config(format!("address {addr} is not host:port")))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| AdvisorError::Config(format!("malformed port in {addr}")))?;
    Ok((host.to_string(), port))
}

/// Poll the server's status endpoint until it answers.
fn wait_until_server_online(status_port: u16) -> Result<(), AdvisorError> {
    let url = format!("http://127.0.0.1:{status_port}/status");
    for _ in 0..STATUS_POLL_RETRIES {
        if ureq::get(&url).call().is_ok() {
            return Ok(());
        }
        std::thread::sleep(STATUS_POLL_INTERVAL);
    }
    Err(AdvisorError::Connection(format!(
        "server status endpoint {url} not reachable"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_addr() {
        assert_eq!(
            parse_addr("127.0.0.1:4000").unwrap(),
            ("127.0.0.1".to_string(), 4000)
        );
        assert!(parse_addr("127.0.0.1").is_err());
        assert!(parse_addr("127.0.0.1:notaport").is_err());
    }

    #[test]
    fn test_args_parse_in_positional_order() {
        let args = Args::parse_from([
            "idxadv-client",
            "/tmp/workload",
            "10080",
            "/tmp/out",
            "root",
            "127.0.0.1:4000",
            "",
            "test",
        ]);
        assert_eq!(args.status_port, 10080);
        assert_eq!(args.addr, "127.0.0.1:4000");
        assert_eq!(args.dbname, "test");
        assert!(args.password.is_empty());
    }
}
