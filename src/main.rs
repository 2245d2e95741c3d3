//! shelf-rs server entry point.

use clap::Parser;
use shelf_rs::{
    config::{Cli, Command, Config},
    convert::CommandConverter,
    library::{Order, find_recent_files, parse_count},
    server,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };

    match cli.command {
        Some(Command::Init { force }) => cmd_init(force),
        Some(Command::Recent {
            n,
            ascending,
            root,
        }) => cmd_recent(config, n, ascending, root),
        Some(Command::Serve {
            bind,
            root,
            base_url,
        }) => cmd_serve(config, bind, root, base_url).await,
        None => {
            // Default: start server
            cmd_serve(config, None, None, None).await
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shelf_rs=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Write a default config file.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());
    println!("\nSet server.base_url and library.root, then run: shelf-rs serve");

    Ok(())
}

/// Print the most recently modified files, one path per line.
fn cmd_recent(
    config: Config,
    n: Option<String>,
    ascending: bool,
    root: Option<PathBuf>,
) -> anyhow::Result<()> {
    let root = root.unwrap_or(config.library.root);
    let count = parse_count(n.as_deref(), config.library.recent_count);
    let order = if ascending {
        Order::Ascending
    } else {
        Order::Descending
    };

    for entry in find_recent_files(&root, count, order)? {
        println!("{}", entry.path.display());
    }

    Ok(())
}

/// Start the server.
async fn cmd_serve(
    mut config: Config,
    bind: Option<std::net::SocketAddr>,
    root: Option<PathBuf>,
    base_url: Option<String>,
) -> anyhow::Result<()> {
    if let Some(addr) = bind {
        config.server.bind = addr;
    }
    if let Some(root) = root {
        config.library.root = root;
    }
    if let Some(url) = base_url {
        config.server.base_url = Some(url);
    }

    init_tracing();

    config.validate()?;

    let converter = CommandConverter::new(
        &config.convert.program,
        config.convert.timeout_seconds,
    );

    tracing::info!(
        bind = %config.server.bind,
        root = %config.library.root.display(),
        base_url = %config.base_url(),
        converter = %converter.program().display(),
        formats = ?config.convert.formats,
        "Starting shelf-rs server"
    );

    let bind = config.server.bind;
    let state = server::AppState::new(config, Arc::new(converter))?;
    let app = server::create_router(state);

    let listener = TcpListener::bind(bind).await?;
    tracing::info!(address = %bind, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
