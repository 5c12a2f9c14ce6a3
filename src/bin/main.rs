use tradelink::{cli, config, telemetry};

fn main() {
    let cli = cli::parse_from(std::env::args_os());

    let logging = match cli
        .config
        .as_deref()
        .map(config::load)
        .unwrap_or_else(|| config::load(std::path::Path::new("tradelink.toml")))
    {
        Ok(cfg) => cfg.logging,
        Err(err) => {
            eprintln!("config load failed, using defaults: {err}");
            config::Config::default().logging
        }
    };
    telemetry::init(cli.verbose, &logging);

    if let Err(e) = cli::run(cli) {
        tracing::error!("error: {e}");
        std::process::exit(1);
    }
}
