//! CLI smoke entry point.
//!
//! # Responsibility
//! - Open the store configured through `CONDUIT_*` variables and report
//!   its schema and pool state.
//! - Keep output deterministic for quick local sanity checks.

use conduit_core::{
    core_version, init_logging, open_store, ArticleRepository, CallContext, LogConfig,
    SqliteArticleRepository, StoreConfig,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    match probe() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("conduit_core probe failed: {message}");
            ExitCode::FAILURE
        }
    }
}

fn probe() -> Result<(), String> {
    init_logging(&LogConfig::from_env())?;
    let config = StoreConfig::from_env().map_err(|err| err.to_string())?;
    let conn = open_store(&config).map_err(|err| err.to_string())?;
    let ctx = CallContext::background();

    let schema_version = conn
        .schema_version(&ctx)
        .map_err(|err| err.to_string())?;
    let tags = SqliteArticleRepository::new(conn.clone())
        .get_tags(&ctx)
        .map_err(|err| err.to_string())?;
    let pool = conn.pool_state();

    println!("conduit_core version={}", core_version());
    println!("conduit_core store={}", config.location.mode());
    println!("conduit_core schema_version={schema_version}");
    println!(
        "conduit_core pool connections={} idle={}",
        pool.connections, pool.idle_connections
    );
    let names = tags.iter().map(|tag| tag.name.as_str()).collect::<Vec<_>>();
    println!("conduit_core tags=[{}]", names.join(","));
    Ok(())
}
