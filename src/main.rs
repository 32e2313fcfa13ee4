//! liveconf daemon.
//!
//! Loads the three configuration tiers, logs every Dynamic change and keeps
//! the State file flushed until Ctrl-C or SIGTERM.
//!
//! ```text
//! liveconf --conf-dir ./conf --dyn-url https://conf.example.com/app.json
//! liveconf --settings liveconf.toml --metrics-address 127.0.0.1:9090
//! LIVECONF_DYNCONFURL=https://conf.example.com/app.json LIVECONF_DEVMODE=1 liveconf
//! ```
//!
//! Precedence: settings file, then `<APP>_*` environment variables, then flags.

use clap::Parser;
use serde_json::Value;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::PathBuf;

use liveconf::config::{apply_env_overrides, load_settings, validate_settings, ConfSettings};
use liveconf::lifecycle::signals::wait_for_signal;
use liveconf::observability::{logging, metrics};
use liveconf::LiveConf;

#[derive(Parser)]
#[command(name = "liveconf")]
#[command(about = "Self-updating configuration daemon", long_about = None)]
struct Cli {
    /// TOML settings file; environment and flags below override it.
    #[arg(short, long, env = "LIVECONF_SETTINGS")]
    settings: Option<PathBuf>,

    /// Directory holding dyn.json, local.json and state.json.
    #[arg(short, long)]
    conf_dir: Option<String>,

    /// Dynamic config URL or path ("-" disables).
    #[arg(short, long)]
    dyn_url: Option<String>,

    /// Development mode.
    #[arg(long)]
    dev: bool,

    /// Serve Prometheus metrics on this address.
    #[arg(long, env = "LIVECONF_METRICS_ADDRESS")]
    metrics_address: Option<SocketAddr>,

    /// Default log filter when RUST_LOG is unset
    /// [default: liveconf=info, liveconf=debug in dev mode].
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => load_settings(path)?,
        None => ConfSettings::default(),
    };
    let mut settings = apply_env_overrides(settings);
    if let Some(dir) = cli.conf_dir {
        settings.conf_dir = dir;
    }
    if let Some(url) = cli.dyn_url {
        settings.dyn_conf_url = Some(url);
    }
    if cli.dev {
        settings.dev_mode = true;
    }

    let default_filter = match (&cli.log_level, settings.dev_mode) {
        (Some(level), _) => level.as_str(),
        (None, true) => "liveconf=debug",
        (None, false) => "liveconf=info",
    };
    logging::init_logging(default_filter);

    if let Err(errors) = validate_settings(&settings) {
        for e in &errors {
            tracing::error!(error = %e, "Invalid settings");
        }
        return Err("invalid settings".into());
    }

    if let Some(addr) = cli.metrics_address {
        metrics::init_metrics(addr);
    }

    tracing::info!(
        app = %settings.app_name,
        conf_dir = %settings.conf_dir,
        dev_mode = settings.dev_mode,
        "liveconf starting"
    );

    let conf = tokio::select! {
        loaded = LiveConf::load_with_handler(settings, log_dynamic_change) => loaded?,
        _ = wait_for_signal() => {
            tracing::info!("Interrupted before configuration finished loading");
            return Ok(());
        }
    };

    tracing::info!(
        local_keys = key_count(&conf.local()),
        dynamic_keys = key_count(&conf.dynamic()),
        state_keys = conf.state().len(),
        "Serving configuration"
    );

    wait_for_signal().await;
    conf.close().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn log_dynamic_change(conf: &LiveConf, previous: std::sync::Arc<Value>) {
    let current = conf.dynamic();
    let changed = changed_keys(&previous, &current);
    tracing::info!(changed = ?changed, "Dynamic configuration updated");
}

/// Top-level keys added, removed or modified between two documents.
fn changed_keys(old: &Value, new: &Value) -> BTreeSet<String> {
    let (Some(old), Some(new)) = (old.as_object(), new.as_object()) else {
        return BTreeSet::new();
    };
    old.keys()
        .chain(new.keys())
        .filter(|key| old.get(*key) != new.get(*key))
        .cloned()
        .collect()
}

fn key_count(doc: &Value) -> usize {
    doc.as_object().map_or(0, |map| map.len())
}
