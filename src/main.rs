use anyhow::Result;
use tiborwatch::{
    config::Config,
    run::{self, RunOutcome},
};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tiborwatch=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    std::panic::set_hook(Box::new(|info| {
        eprintln!("panic: {:?}", info);
    }));

    // ─── 2) config ───────────────────────────────────────────────────
    let cfg = Config::from_env_or_args()?;
    let date = run::run_date(&cfg);
    info!(%date, data_dir = %cfg.data_dir.display(), "configured");

    // ─── 3) run ──────────────────────────────────────────────────────
    match run::run(&cfg).await {
        Ok(RunOutcome::AlreadyFetched) => info!(%date, "already handled; nothing to do"),
        Ok(RunOutcome::NotPublished) => info!(%date, "no document published; exit"),
        Ok(RunOutcome::NoData) => info!(%date, "document had no rates; no notification"),
        Ok(RunOutcome::Notified { records, changed }) => {
            info!(%date, records, ?changed, "notification sent")
        }
        Err(e) => {
            error!(%date, "run failed: {:#}", e);
            return Err(e);
        }
    }

    info!("all done");
    Ok(())
}
