//! `slippymap quadkey` - tile coordinates to quadkey.

use clap::Args;
use slippymap::coord::{QuadKey, TileCoord, MAX_SCALE};

use crate::error::CliError;

#[derive(Debug, Args)]
pub struct QuadkeyArgs {
    /// Tile column
    #[arg(long)]
    pub x: u32,

    /// Tile row
    #[arg(long)]
    pub y: u32,

    /// Zoom level (0-23)
    #[arg(long)]
    pub scale: u8,
}

pub fn run(args: QuadkeyArgs) -> Result<(), CliError> {
    if args.scale > MAX_SCALE {
        return Err(CliError::InvalidArgument(format!(
            "zoom {} is above the maximum of {}",
            args.scale, MAX_SCALE
        )));
    }

    let tile = TileCoord::new(args.x, args.y, args.scale);
    if !tile.is_valid() {
        return Err(CliError::InvalidArgument(format!(
            "tile {} is outside the {}x{} grid at zoom {}",
            tile,
            tile.tiles_per_side(),
            tile.tiles_per_side(),
            args.scale
        )));
    }

    let key = QuadKey::from(tile);
    if !key.is_addressable() {
        println!("Tile {} has no quadkey (zoom 0 is not addressable)", tile);
        return Ok(());
    }

    println!("Tile:     {}", tile);
    println!("Quadkey:  {}", key.compact());
    println!("Padded:   {}", key.padded());
    Ok(())
}
