mod stress;

use anyhow::{Context, bail};
use quartz_config::StressConfig;
use std::thread;
use tracing::info;
use tracing_subscriber::EnvFilter;

// Rings embed their slots, so the largest ones are built on this thread's
// stack before they are boxed.
const STRESS_STACK_BYTES: usize = 256 << 20;

fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => StressConfig::load(&path).with_context(|| format!("loading {path}"))?,
        None => {
            let config = StressConfig::default();
            config.validate()?;
            config
        }
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    info!(?config, "quartz stress starting");

    let worker = thread::Builder::new()
        .name("quartz-stress".into())
        .stack_size(STRESS_STACK_BYTES)
        .spawn(move || run(&config))
        .context("spawning stress thread")?;

    match worker.join() {
        Ok(result) => result,
        Err(_) => bail!("stress thread panicked"),
    }
}

fn run(config: &StressConfig) -> anyhow::Result<()> {
    match config.capacity {
        1024 => stress::run_all::<1024>(config),
        4096 => stress::run_all::<4096>(config),
        16384 => stress::run_all::<16384>(config),
        65536 => stress::run_all::<65536>(config),
        other => bail!("capacity {other} is not compiled in"),
    }
}
