use anyhow::Context;
use clap::Parser;
use pkl_convert::utils::error::error_chain;
use pkl_convert::utils::{logger, validation::Validate};
use pkl_convert::{CliConfig, ConversionEngine, NpzReader};
use std::path::Path;

fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    if let Some(path) = &cli.inspect {
        logger::init_cli_logger(cli.verbose);
        return inspect(path);
    }

    let config = match cli.resolve() {
        Ok(config) => config,
        Err(e) => {
            logger::init_cli_logger(cli.verbose);
            tracing::error!("❌ Configuration failed: {}", e);
            eprintln!("❌ {}", e);
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(1);
        }
    };

    // 初始化日誌
    logger::init_cli_logger(config.verbose);
    tracing::debug!("Resolved config: {:?}", config);

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e);
        eprintln!("💡 {}", e.recovery_suggestion());
        std::process::exit(1);
    }

    let engine = ConversionEngine::new(config);

    if cli.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No files will be written");
        engine.dry_run()?;
        return Ok(());
    }

    println!("Starting conversion process...");
    match engine.run() {
        // Per-file failures only show up in the printed counts.
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::error!("❌ Conversion aborted: {}", e);
            eprintln!("❌ {}", error_chain(&e));
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(1);
        }
    }
}

fn inspect(path: &Path) -> anyhow::Result<()> {
    let mut reader = NpzReader::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    println!("{}", path.display());
    for dataset in reader.read_all()? {
        println!(
            "  {}: {} {:?}",
            dataset.name,
            dataset.array.data().type_name(),
            dataset.array.shape()
        );
    }
    Ok(())
}
