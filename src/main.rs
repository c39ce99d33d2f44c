use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use devicehub::config::{self, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if config::has_flag(&args, "--help") || config::has_flag(&args, "-h") {
        print!("{}", config::USAGE);
        return Ok(());
    }

    // Init logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let cfg = Config::load(&args)?;
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "devicehub",
        "devicehub starting: RUST_LOG='{}', listen={}, session_key_field='{}'",
        rust_log, cfg.listen_addr(), cfg.session_key_field
    );
    debug!(target: "devicehub", "configuration: {:?}", cfg);
    if cfg.generated_secret {
        warn!(target: "devicehub", "DEVICEHUB_SESSION_SECRET is not set; using a random secret, sessions will not survive a restart");
    }

    devicehub::server::run(cfg).await
}
