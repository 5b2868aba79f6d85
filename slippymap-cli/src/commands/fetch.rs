//! `slippymap fetch` - acquire a view through the cache chain.

use std::path::PathBuf;

use clap::Args;
use slippymap::acquire::{ImagePipeline, NetworkSource, PipelineConfig};
use slippymap::cache::{EntryOrigin, DEFAULT_PURGE_INTERVAL};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::common::{connect_provider, http_fetcher, load_config, open_cache_chain, ViewArgs};
use crate::error::CliError;
use crate::GlobalArgs;

#[derive(Debug, Args)]
pub struct FetchArgs {
    #[command(flatten)]
    pub view: ViewArgs,

    /// Directory the fragments are written to
    #[arg(long, short, default_value = ".")]
    pub output: PathBuf,
}

pub async fn run(global: &GlobalArgs, args: FetchArgs) -> Result<(), CliError> {
    let config = load_config(global.config.as_deref())?;
    let fetcher = http_fetcher(&config)?;
    let provider = connect_provider(args.view.provider.as_deref(), &config, &fetcher).await?;
    let projection = provider.projection();
    projection.set_scale(args.view.scale);

    let chain = open_cache_chain(&config).await?;
    let mut source = NetworkSource::for_provider(&provider, fetcher)
        .with_policy(config.download.fetch_policy);
    if let Some(latency) = config.download.max_latency() {
        source = source.with_max_latency(latency);
    }
    let pipeline = ImagePipeline::new(
        chain.clone(),
        source,
        PipelineConfig {
            write_through: config.download.write_through,
            ..Default::default()
        },
    );

    let shutdown = CancellationToken::new();
    let purge = slippymap::cache::spawn_purge_daemon(chain, DEFAULT_PURGE_INTERVAL, shutdown.clone());

    let acquired = pipeline
        .acquire_view(projection, &args.view.request(), &shutdown)
        .await;

    std::fs::create_dir_all(&args.output).map_err(|error| CliError::FileWrite {
        path: args.output.display().to_string(),
        error,
    })?;

    let (mut written, mut cached, mut failed) = (0, 0, 0);
    for fragment in &acquired {
        let Some(entry) = fragment.entry.as_ref().filter(|e| e.is_populated()) else {
            println!("  {:<40} failed", fragment.key.to_string());
            failed += 1;
            continue;
        };
        let Some(bytes) = entry.fragment().image() else {
            failed += 1;
            continue;
        };

        let extension = entry
            .fragment()
            .image_format()
            .and_then(|format| format.extensions_str().first().copied())
            .unwrap_or("bin");
        let path = args.output.join(format!("{}.{}", fragment.key, extension));
        std::fs::write(&path, &bytes).map_err(|error| CliError::FileWrite {
            path: path.display().to_string(),
            error,
        })?;

        let origin = match entry.origin() {
            EntryOrigin::Tier(level) => {
                cached += 1;
                format!("cache L{}", level)
            }
            EntryOrigin::Network => "network".to_string(),
        };
        println!("  {:<40} {:>8} bytes  {}", fragment.key.to_string(), bytes.len(), origin);
        written += 1;
    }

    shutdown.cancel();
    let _ = purge.await;

    let coalescer = pipeline.source().coalescer_stats();
    info!(
        written,
        cached,
        failed,
        coalesced = coalescer.coalesced_requests,
        "Fetch complete"
    );
    println!();
    println!(
        "Wrote {} of {} fragments to {} ({} from cache, {} failed)",
        written,
        acquired.len(),
        args.output.display(),
        cached,
        failed
    );
    Ok(())
}
