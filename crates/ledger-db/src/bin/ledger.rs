//! # Ledger CLI
//!
//! Command-line front end over [`TransferService`].
//!
//! ## Usage
//! ```bash
//! # Open two accounts
//! cargo run -p ledger-db --bin ledger -- seed memberA 10000
//! cargo run -p ledger-db --bin ledger -- seed memberB 10000
//!
//! # Move money
//! cargo run -p ledger-db --bin ledger -- transfer memberA memberB 2000
//!
//! # Inspect
//! cargo run -p ledger-db --bin ledger -- show memberA
//! cargo run -p ledger-db --bin ledger -- --db ./data/ledger.db list
//! cargo run -p ledger-db --bin ledger -- status
//! ```
//!
//! Records are printed to stdout as JSON. Logs go to stderr; set `RUST_LOG`
//! (default `info`) to change the level.

use std::env;

use serde_json::json;
use tracing_subscriber::EnvFilter;

use ledger_db::{Database, DbConfig, TransferService};

const USAGE: &str = "\
Usage: ledger [OPTIONS] <COMMAND>

Commands:
  seed <KEY> <BALANCE>             Open an account (alias: open)
  transfer <FROM> <TO> <AMOUNT>    Move AMOUNT from FROM to TO
  show <KEY>                       Print one account
  list                             Print all accounts
  status                           Print health and migration counts

Options:
  -d, --db <PATH>    Database file path (default: $LEDGER_DB_PATH or ./ledger.db)
  -h, --help         Show this help message";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let invocation = match parse_args(&args) {
        Ok(invocation) => invocation,
        Err(message) => {
            eprintln!("error: {message}\n\n{USAGE}");
            std::process::exit(2);
        }
    };
    if invocation.help {
        println!("{USAGE}");
        return Ok(());
    }
    let Invocation { db_path, command, .. } = invocation;

    let mut config = DbConfig::from_env()?;
    if let Some(path) = db_path {
        config.database_path = path.into();
    }

    let db = Database::new(config).await?;
    let service = TransferService::new(db.clone());

    let output = match command.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["seed" | "open", key, balance] => {
            let account = service.create_account(key, parse_amount(balance)?).await?;
            serde_json::to_value(account)?
        }
        ["transfer", from, to, amount] => {
            let amount = parse_amount(amount)?;
            service.transfer(from, to, amount).await?;
            json!({
                "from": service.account(from).await?,
                "to": service.account(to).await?,
                "amount": amount,
            })
        }
        ["show", key] => serde_json::to_value(service.account(key).await?)?,
        ["list"] => serde_json::to_value(service.accounts().await?)?,
        ["status"] => {
            let (total, applied) = db.migration_status().await?;
            json!({
                "healthy": db.health_check().await,
                "migrations": { "total": total, "applied": applied },
            })
        }
        _ => {
            eprintln!("{USAGE}");
            db.close().await;
            std::process::exit(2);
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    tracing::debug!(stats = ?db.stats(), "Pool counters at exit");
    db.close().await;
    Ok(())
}

#[derive(Debug, Default, PartialEq)]
struct Invocation {
    db_path: Option<String>,
    command: Vec<String>,
    help: bool,
}

fn parse_args(args: &[String]) -> Result<Invocation, String> {
    let mut invocation = Invocation::default();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                let path = args
                    .get(i + 1)
                    .ok_or_else(|| format!("{} requires a path", args[i]))?;
                invocation.db_path = Some(path.clone());
                i += 1;
            }
            "--help" | "-h" => {
                invocation.help = true;
                return Ok(invocation);
            }
            other => invocation.command.push(other.to_string()),
        }
        i += 1;
    }

    Ok(invocation)
}

fn parse_amount(raw: &str) -> Result<i64, String> {
    raw.parse()
        .map_err(|_| format!("'{raw}' is not a whole number"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_db_flag_takes_a_path() {
        let invocation = parse_args(&args(&["--db", "./data/ledger.db", "list"])).unwrap();
        assert_eq!(invocation.db_path.as_deref(), Some("./data/ledger.db"));
        assert_eq!(invocation.command, vec!["list"]);
        assert!(!invocation.help);
    }

    #[test]
    fn test_db_flag_without_path_is_rejected() {
        let err = parse_args(&args(&["list", "--db"])).unwrap_err();
        assert!(err.contains("--db"));

        assert!(parse_args(&args(&["-d"])).is_err());
    }

    #[test]
    fn test_help_stops_parsing() {
        let invocation = parse_args(&args(&["-h", "--db"])).unwrap();
        assert!(invocation.help);
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("2000"), Ok(2000));
        assert!(parse_amount("2k").is_err());
    }
}
