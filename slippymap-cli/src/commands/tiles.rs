//! `slippymap tiles` - resolve a view to tiles without fetching.

use slippymap::viewport::{self, ViewportResolution};

use super::common::{connect_provider, http_fetcher, load_config, ViewArgs};
use crate::error::CliError;
use crate::GlobalArgs;

pub async fn run(global: &GlobalArgs, args: ViewArgs) -> Result<(), CliError> {
    let config = load_config(global.config.as_deref())?;
    let fetcher = http_fetcher(&config)?;
    let provider = connect_provider(args.provider.as_deref(), &config, &fetcher).await?;

    let projection = provider.projection();
    let scale = projection.set_scale(args.scale);
    if scale != args.scale {
        println!("Zoom {} clamped to {} for {}", args.scale, scale, provider.name());
    }

    let request = args.request();
    let resolution = viewport::resolve(projection, &request).ok_or_else(|| {
        CliError::InvalidArgument("view could not be resolved to any fragment".to_string())
    })?;

    println!("Provider: {}", provider.name());
    println!("Center:   {}", request.center);
    println!("View:     {}x{} @ {}°", request.width, request.height, request.normalized_heading());
    println!("Zoom:     {}", scale);

    match &resolution {
        ViewportResolution::Tiled(range) => {
            println!(
                "Tiles:    x {}..={}, y {}..={} ({} tiles)",
                range.min_x,
                range.max_x,
                range.min_y,
                range.max_y,
                range.len()
            );
            for key in range.keys() {
                match key.tile_coord() {
                    Some(tile) => println!("  {:<14} {}", tile.to_string(), key),
                    None => println!("  {}", key),
                }
            }
        }
        ViewportResolution::Static(view) => {
            println!("Static:   {}x{} image", view.width, view.height);
            println!("  {}", view.key());
        }
    }
    Ok(())
}
