mod cli;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use hf_av::{FfprobeInspector, ToolRegistry};
use hf_core::config::{Config, QUALITY_PROFILES};
use hf_core::MetadataInspector;
use hf_package::{plan, JobOutcome, QualityProfile};
use hf_server::context::AppContext;
use tokio_util::sync::CancellationToken;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "hlsforge=trace,hf_core=trace,hf_av=trace,hf_package=trace,hf_server=trace,tower_http=debug"
                .to_string()
        } else {
            "hlsforge=info,hf_core=info,hf_av=info,hf_package=info,hf_server=info,tower_http=info"
                .to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let mut config = Config::load_or_default(cli.config.as_deref());
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            tracing::info!("Starting hlsforge server");
            tracing::info!(
                "Server will listen on {}:{}",
                config.server.host,
                config.server.port
            );
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(hf_server::start(config))?;
            Ok(())
        }
        Commands::Package { files, output } => {
            let mut config = Config::load_or_default(cli.config.as_deref());
            if let Some(output) = output {
                config.packaging.output_root = output;
            }
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(package_files(config, files))
        }
        Commands::Probe { file, json } => {
            let config = Config::load_or_default(cli.config.as_deref());
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&config, &file, json))
        }
        Commands::Ladder {
            height,
            width,
            profile,
        } => {
            let config = Config::load_or_default(cli.config.as_deref());
            let profile = profile.unwrap_or(config.packaging.quality_profile);
            print_ladder(height, width, &profile)
        }
        Commands::CheckTools => {
            let config = Config::load_or_default(cli.config.as_deref());
            check_tools(&config)
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("hlsforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn package_files(config: Config, files: Vec<PathBuf>) -> Result<()> {
    std::fs::create_dir_all(&config.packaging.output_root)?;
    let output_root = config.packaging.output_root.clone();

    let cancel = CancellationToken::new();
    let (ctx, scheduler_task) = AppContext::build(config, cancel.clone())?;

    tracing::info!("Packaging {} file(s)", files.len());
    let mut handles = Vec::new();
    let mut failures = 0usize;
    for file in &files {
        match ctx.scheduler.submit(file).await {
            Ok(handle) => handles.push((file.clone(), handle)),
            Err(e) => {
                failures += 1;
                println!("✗ {}: {e}", file.display());
            }
        }
    }

    for (file, handle) in handles {
        match handle.wait().await {
            JobOutcome::Completed(report) => {
                if report.already_complete {
                    println!("✓ {} (already packaged)", file.display());
                } else {
                    println!(
                        "✓ {} -> {} (encoded: {}, reused: {})",
                        file.display(),
                        report.package_dir.display(),
                        list_or_dash(&report.encoded),
                        list_or_dash(&report.reused)
                    );
                }
            }
            JobOutcome::Failed {
                reason,
                failed_renditions,
            } => {
                failures += 1;
                println!("✗ {}: {reason}", file.display());
                if !failed_renditions.is_empty() {
                    println!("  failed renditions: {}", failed_renditions.join(", "));
                }
            }
        }
    }

    // Thumbnails requested during encoding run detached; make sure every
    // package has one before exiting.
    ctx.thumbnails.scan_missing(&output_root).await;

    cancel.cancel();
    let _ = scheduler_task.await;

    if failures > 0 {
        anyhow::bail!("{failures} of {} files failed", files.len());
    }
    Ok(())
}

fn list_or_dash(names: &[String]) -> String {
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(", ")
    }
}

async fn probe_file(config: &Config, file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let tools = ToolRegistry::discover(&config.tools);
    let inspector = FfprobeInspector::from_registry(&tools)?;
    let info = inspector.inspect(file).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        let secs = info.duration_secs.max(0.0) as u64;
        println!("File: {}", file.display());
        println!("Video: {}x{}", info.width, info.height);
        println!(
            "Duration: {:02}:{:02}:{:02}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60
        );
        if let Some(bitrate) = info.bitrate {
            println!("Bitrate: {} kb/s", bitrate / 1000);
        }
        let ladder = plan(
            info.height,
            info.width,
            QualityProfile::from_name(&config.packaging.quality_profile),
        );
        let names: Vec<&str> = ladder.iter().map(|r| r.name.as_str()).collect();
        println!("Ladder: {}", names.join(", "));
    }

    Ok(())
}

fn print_ladder(height: u32, width: u32, profile: &str) -> Result<()> {
    if !QUALITY_PROFILES.contains(&profile) {
        println!("Unknown profile {profile:?}, using medium");
    }
    let ladder = plan(height, width, QualityProfile::from_name(profile));
    if ladder.is_empty() {
        anyhow::bail!("A source with height {height} gets no renditions");
    }

    for r in &ladder {
        println!(
            "{:>6}  {:>4}x{:<4}  {:>6} kb/s  preset={} crf={}",
            r.name, r.width, r.height, r.bitrate_kbps, r.preset, r.quality
        );
    }
    Ok(())
}

fn check_tools(config: &Config) -> Result<()> {
    println!("Checking external tools...\n");

    let tools = ToolRegistry::discover(&config.tools);
    let mut all_ok = true;

    for tool in tools.check_all() {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
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
        println!("Some tools are missing. ffmpeg and ffprobe are both required.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = Config::load(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    let packaging = &config.packaging;
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Watch enabled: {}", config.watch.enabled);
    println!("  Watch paths: {}", config.watch.paths.len());
    println!("  Output root: {}", packaging.output_root.display());
    println!(
        "  Max concurrent jobs: {}",
        packaging.effective_max_concurrent_jobs()
    );
    println!("  Quality profile: {}", packaging.quality_profile);
    println!(
        "  Hardware acceleration: {}",
        if packaging.hw_accel {
            packaging.hw_accel_method.as_str()
        } else {
            "off"
        }
    );

    for warning in config.validate() {
        println!("  ⚠ {warning}");
    }

    Ok(())
}
