use std::env;
use std::sync::Arc;
use tracing::{error, info};

use lectern::playback::backend::{classify, HttpManifestEngine, SourceKind, StreamingEngine};
use lectern::playback::progress::{
    JsonFileProgressStorage, ProgressStorage, SqliteProgressStorage,
};
use lectern::PlayerConfig;

fn print_usage(program: &str) {
    eprintln!("Usage:");
    eprintln!("  {} probe <url>                 Classify a source and check its manifest", program);
    eprintln!("  {} progress list [--json]      List stored viewing positions", program);
    eprintln!("  {} progress show <id> [--json] Show one stored position", program);
    eprintln!("  {} progress clear <id> [--json] Forget one stored position", program);
    eprintln!();
    eprintln!("Progress is read from progress.db (or progress.json with --json) in");
    eprintln!("LECTERN_PROGRESS_DIR, defaulting to the platform data directory.");
}

#[tokio::main]
async fn main() {
    // Use RUST_LOG env var if set, otherwise default to info for this crate
    let log_filter = env::var("RUST_LOG").unwrap_or_else(|_| "lectern=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(log_filter))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        print_usage(&args[0]);
        std::process::exit(1);
    }

    let config = PlayerConfig::from_env();
    let result = match args[1].as_str() {
        "probe" => probe(&config, &args[2]).await,
        "progress" => progress(&config, &args[2..]).await,
        other => {
            error!("Unknown command: {}", other);
            print_usage(&args[0]);
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn probe(config: &PlayerConfig, url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let kind = classify(url);
    println!("Source kind: {:?}", kind);

    let SourceKind::Manifest(format) = kind else {
        println!("Progressive source, played directly by the media surface");
        return Ok(());
    };

    let engine = HttpManifestEngine::new(config.manifest_timeout);
    let manifest = engine.open(url, format).await?;
    println!("Manifest OK, playback locator: {}", manifest.playback_locator);
    for level in &manifest.levels {
        match (level.width, level.height) {
            (Some(width), Some(height)) => println!(
                "  level {}: {} bps, {}x{}",
                level.index, level.bandwidth, width, height
            ),
            _ => println!("  level {}: {} bps", level.index, level.bandwidth),
        }
    }
    Ok(())
}

async fn progress(config: &PlayerConfig, args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let use_json = args.iter().any(|arg| arg == "--json");
    let positional: Vec<&String> = args.iter().filter(|arg| *arg != "--json").collect();

    let dir = config.get_progress_dir();
    std::fs::create_dir_all(&dir)?;
    let storage: Arc<dyn ProgressStorage> = if use_json {
        Arc::new(JsonFileProgressStorage::new(dir.join("progress.json")).await?)
    } else {
        let db_path = dir.join("progress.db");
        Arc::new(SqliteProgressStorage::new(&db_path.to_string_lossy()).await?)
    };

    match (positional.first().map(|s| s.as_str()), positional.get(1)) {
        (Some("list"), _) => {
            let records = storage.list().await?;
            if records.is_empty() {
                println!("No stored progress");
            }
            for (video_id, record) in records {
                println!(
                    "{}\t{}\t{:.1}s / {:.1}s\t{:.1}%\t{}",
                    video_id,
                    record.video_type.as_str(),
                    record.current_time,
                    record.duration,
                    record.percentage,
                    record.updated_at.to_rfc3339()
                );
            }
        }
        (Some("show"), Some(video_id)) => match storage.load(video_id).await? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => println!("No stored progress for {}", video_id),
        },
        (Some("clear"), Some(video_id)) => {
            storage.remove(video_id).await?;
            info!("Cleared progress for {}", video_id);
        }
        _ => {
            return Err("expected `progress list`, `progress show <id>` or `progress clear <id>`".into());
        }
    }
    Ok(())
}
