use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use intake_core::{IntakeConfig, IntakeService};
use intake_server::{request_timeout, router, serve, AppState};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    let config_arg = Arg::new("config")
        .long("config")
        .short('c')
        .env("INTAKE_CONFIG")
        .value_parser(value_parser!(PathBuf))
        .help("Path to a TOML configuration file");

    Command::new("intake-server")
        .version(intake_server::VERSION)
        .about("Insurance application intake service")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .default_value("info")
                .help("Default log filter when RUST_LOG is unset"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("serve")
                .about("Run the HTTP server")
                .arg(config_arg.clone())
                .arg(
                    Arg::new("bind")
                        .long("bind")
                        .help("Listen address, overriding the configuration"),
                ),
        )
        .subcommand(
            Command::new("check-config")
                .about("Load the configuration and secrets, then exit")
                .arg(config_arg),
        )
}

fn init_logging(matches: &ArgMatches) {
    let default_level = matches
        .get_one::<String>("log-level")
        .map_or("info", String::as_str);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    if matches.get_flag("json-logs") {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn load_config(args: &ArgMatches) -> anyhow::Result<IntakeConfig> {
    let config = match args.get_one::<PathBuf>("config") {
        Some(path) => IntakeConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => IntakeConfig::new(),
    };
    Ok(config.with_env_secrets())
}

async fn run_serve(args: &ArgMatches) -> anyhow::Result<()> {
    let mut config = load_config(args)?;
    if let Some(bind) = args.get_one::<String>("bind") {
        config = config.with_bind_addr(bind.clone());
    }

    let service = IntakeService::from_config(&config)
        .await
        .context("building intake service")?;
    let app = router(AppState::new(service), request_timeout(&config));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    serve(listener, app).await.context("server stopped")
}

async fn run_check(args: &ArgMatches) -> anyhow::Result<()> {
    let config = load_config(args)?;
    IntakeService::from_config(&config)
        .await
        .context("building intake service")?;
    tracing::info!(
        bind_addr = %config.bind_addr,
        token_ttl_secs = config.token_ttl_secs,
        recipients = config.mail.recipients.len(),
        "configuration ok"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_logging(&matches);

    match matches.subcommand() {
        Some(("check-config", args)) => run_check(args).await,
        Some(("serve", args)) => run_serve(args).await,
        _ => unreachable!("subcommand is required"),
    }
}
