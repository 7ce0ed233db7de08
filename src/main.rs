mod cli;

use watchforge::{
    config,
    context::AppContext,
    conversion::Dispatcher,
    probe, scanner, server, watch,
};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, StartArgs};
use std::path::Path;
use tokio_util::sync::CancellationToken;

async fn start(args: StartArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;
    args.apply(&mut config);
    config::validate_config(&config)?;

    for dir in [&config.watch.dir, &config.output.dir, &config.upload.dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {:?}", dir))?;
    }
    // Watcher events carry absolute paths; keep scanned paths comparable.
    config.watch.dir = std::fs::canonicalize(&config.watch.dir)
        .with_context(|| format!("Failed to resolve watch directory: {:?}", config.watch.dir))?;

    tracing::info!("Starting Watchforge");
    tracing::info!(
        watch = %config.watch.dir.display(),
        output = %config.output.dir.display(),
        max_concurrent = config.conversion.max_concurrent,
        "Pipeline configured"
    );

    let shutdown = CancellationToken::new();
    let (ctx, rx) = AppContext::with_ffmpeg(config, shutdown.clone());

    let dispatcher = Dispatcher::new(ctx.clone(), rx).spawn();

    let mut watcher = watch::FileWatcher::new(ctx.clone());
    watcher.start()?;

    // Watcher first, so files landing during the scan are not missed
    let scan_ctx = ctx.clone();
    tokio::spawn(async move {
        match scanner::scan_directory(&scan_ctx).await {
            Ok(summary) => tracing::info!(
                files = summary.files_found,
                queued = summary.queued,
                already_converted = summary.already_converted,
                "Initial scan complete"
            ),
            Err(e) => tracing::error!("Initial scan failed: {:#}", e),
        }
    });

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        server::shutdown_signal().await;
        signal_token.cancel();
    });

    let result = if ctx.config.server.headless {
        tracing::info!("Running headless, HTTP server disabled");
        shutdown.cancelled().await;
        Ok(())
    } else {
        server::start_server(ctx.clone()).await
    };

    tracing::info!("Shutting down...");
    shutdown.cancel();
    watcher.stop();
    let _ = dispatcher.await;
    ctx.tasks.close();
    ctx.tasks.wait().await;
    tracing::info!(
        in_flight = ctx.registry.len(),
        "All conversion tasks stopped"
    );

    result
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "watchforge=trace,watchforge_av=debug,tower_http=debug".to_string()
        } else {
            "watchforge=info,watchforge_av=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start(args) => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start(args, cli.config.as_deref()))
        }
        Commands::Probe { file, json } => probe_file(&file, cli.config.as_deref(), json),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("watchforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn probe_file(file: &Path, config_path: Option<&Path>, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = config::load_config_or_default(config_path)?;
    let info = watchforge_av::probe::probe_with_ffprobe(file, &config.tools.ffprobe)
        .with_context(|| format!("Failed to probe {:?}", file))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    let secs = info.duration_secs as u64;
    println!("File: {}", file.display());
    println!(
        "Duration: {:02}:{:02}:{:02} ({:.3}s)",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        info.duration_secs
    );
    println!("Dimensions: {}x{}", info.width, info.height);
    match watchforge_av::scale_filter(info.width, info.height) {
        Some(filter) => println!("Scale filter: {}", filter),
        None => println!("Scale filter: none"),
    }
    println!(
        "Output: {}",
        watchforge_common::paths::converted_output_path(file, &config.output.dir).display()
    );

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let tools = probe::check_tools(&config.tools.ffmpeg, &config.tools.ffprobe);
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Conversions will fail until they are installed.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            print_summary(&config);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            print_summary(&config);
        }
    }

    Ok(())
}

fn print_summary(config: &config::Config) {
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Headless: {}", config.server.headless);
    println!("  Watch dir: {}", config.watch.dir.display());
    println!("  Output dir: {}", config.output.dir.display());
    println!("  Upload dir: {}", config.upload.dir.display());
    println!(
        "  Conversion: max_concurrent={}, max_queue_size={}, auto_convert={}",
        config.conversion.max_concurrent,
        config.conversion.max_queue_size,
        config.conversion.auto_convert
    );
}
