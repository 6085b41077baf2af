use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tilekeep::core::geo::{lat_lng_to_tile, tile_to_lat_lng};
use tilekeep::{ArchiveBuilder, ArchiveConfig, LatLng, PixelAddress, SchedulerEvent, TileArchive, TileRect, TileStatus, Viewport};

/// Keep a local copy of the wplace tile grid
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory holding tiles, documents and exports
    #[arg(short, long)]
    root: Option<PathBuf>,
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download every tile of a rectangle, nearest to its center first
    Fetch {
        start_x: i64,
        start_y: i64,
        end_x: i64,
        end_y: i64,
        /// Tiles per second
        #[arg(long)]
        rate: Option<f64>,
        /// Refetch tiles older than this many hours
        #[arg(long)]
        refresh_after: Option<f64>,
    },
    /// Download what a map view centered on a coordinate would show
    View {
        lat: f64,
        lng: f64,
        #[arg(long, default_value_t = 11.0)]
        zoom: f64,
        #[arg(long, default_value_t = 1280.0)]
        width: f64,
        #[arg(long, default_value_t = 800.0)]
        height: f64,
    },
    /// Stitch a tile rectangle into one PNG
    Export {
        start_x: i64,
        start_y: i64,
        end_x: i64,
        end_y: i64,
    },
    /// Export an exact pixel rectangle; corners are `tileX-tileY-pixelX-pixelY`
    Crop {
        #[arg(value_parser = parse_address)]
        start: PixelAddress,
        #[arg(value_parser = parse_address)]
        end: PixelAddress,
    },
    /// Manage bookmarked pixels
    Favorite {
        #[command(subcommand)]
        action: FavoriteAction,
    },
    /// Summarize downloaded tiles for a column range
    Stats {
        #[arg(long, default_value_t = 0)]
        from_x: u32,
        #[arg(long, default_value_t = 2047)]
        to_x: u32,
        /// Only count rows above this one
        #[arg(long, default_value_t = 2048)]
        below_row: u32,
    },
    /// Print the tile and pixel under a coordinate
    Locate { lat: f64, lng: f64 },
    /// Show a downloaded tile in the file manager
    Reveal { tile_x: i64, tile_y: i64 },
}

#[derive(Subcommand, Debug)]
enum FavoriteAction {
    Add {
        #[arg(value_parser = parse_address)]
        address: PixelAddress,
        #[arg(long)]
        name: Option<String>,
    },
    Remove {
        #[arg(value_parser = parse_address)]
        address: PixelAddress,
    },
    List,
}

/// Parse `tileX-tileY-pixelX-pixelY`. Only tile X may be negative (an
/// unwrapped column west of the seam), so the string is split from the right.
fn parse_address(value: &str) -> Result<PixelAddress, String> {
    let parts: Vec<&str> = value.rsplitn(4, '-').collect();
    let [pixel_y, pixel_x, tile_y, tile_x] = parts.as_slice() else {
        return Err(format!("expected tileX-tileY-pixelX-pixelY, got {value}"));
    };
    let number = |s: &str| s.parse::<i64>().map_err(|e| format!("{s}: {e}"));
    let pixel = |s: &str| s.parse::<u32>().map_err(|e| format!("{s}: {e}"));
    Ok(PixelAddress::new(number(tile_x)?, number(tile_y)?, pixel(pixel_x)?, pixel(pixel_y)?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ArchiveConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => ArchiveConfig::default(),
    };
    let mut builder = ArchiveBuilder::new().with_config(config);
    if let Some(root) = &cli.root {
        builder = builder.with_root(root.clone());
    }
    let archive = builder
        .open()
        .await
        .context("opening tile archive")?;

    match cli.command {
        Command::Fetch {
            start_x,
            start_y,
            end_x,
            end_y,
            rate,
            refresh_after,
        } => {
            configure(&archive, rate, refresh_after);
            let rect = TileRect::new(start_x, start_y, end_x, end_y);
            let center = ((start_x + end_x) / 2, (start_y + end_y) / 2);
            let queued = archive.fetch_rect(rect, center);
            drain(&archive, queued).await?;
        }
        Command::View {
            lat,
            lng,
            zoom,
            width,
            height,
        } => {
            let viewport = Viewport::from_center(LatLng::new(lat, lng), zoom, width, height);
            let queued = archive.update_viewport(&viewport);
            drain(&archive, queued).await?;
        }
        Command::Export {
            start_x,
            start_y,
            end_x,
            end_y,
        } => {
            let path = archive.export_tiles(start_x, start_y, end_x, end_y).await?;
            println!("{}", path.display());
        }
        Command::Crop { start, end } => {
            let path = archive.export_crop(start, end).await?;
            println!("{}", path.display());
        }
        Command::Favorite { action } => favorite(&archive, action).await?,
        Command::Stats {
            from_x,
            to_x,
            below_row,
        } => {
            let summary = archive.range_summary(from_x..=to_x, below_row).await?;
            println!("Tiles in range:   {}", summary.tiles);
            println!("Empty tiles:      {}", summary.empty);
            println!("Non-empty tiles:  {}", summary.non_empty);
            println!("Missing files:    {}", summary.missing_files);
            println!("Total size:       {} bytes", summary.total_bytes);
            println!("Average size:     {:.1} bytes", summary.average_file_size());
        }
        Command::Locate { lat, lng } => {
            let address = lat_lng_to_tile(lat, lng).ok_or_else(|| anyhow!("{lat}, {lng} is outside the grid"))?;
            let corner = tile_to_lat_lng(address.tile_x, address.tile_y, 0, 0);
            println!(
                "Tile ({}, {}) pixel ({}, {}); tile corner at {:.6}, {:.6}",
                address.tile_x, address.tile_y, address.pixel_x, address.pixel_y, corner.lat, corner.lng
            );
            if archive.is_favorite(&address) {
                println!("This pixel is a favorite");
            }
        }
        Command::Reveal { tile_x, tile_y } => {
            let path = archive.reveal_tile(tile_x, tile_y).await?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

fn configure(archive: &TileArchive, rate: Option<f64>, refresh_after: Option<f64>) {
    let scheduler = archive.scheduler();
    if let Some(rate) = rate {
        let applied = scheduler.set_tiles_per_second(rate);
        log::info!("Downloading at {} tiles per second", applied);
    }
    if let Some(hours) = refresh_after {
        scheduler.set_stale_after_hours(hours);
        scheduler.set_auto_refresh(true);
    }
}

/// Wait for the queue to drain, printing progress. Ctrl-C pauses the
/// scheduler and lets in-flight transfers finish.
async fn drain(archive: &TileArchive, queued: usize) -> anyhow::Result<()> {
    println!("Queued {} tiles", queued);
    let scheduler = archive.scheduler().clone();
    let events = scheduler.subscribe();
    std::thread::spawn(move || {
        for event in events {
            if let SchedulerEvent::Status { tile_x, tile_y, status } = event {
                match status {
                    TileStatus::Downloaded => println!("  {tile_x},{tile_y} downloaded"),
                    TileStatus::Cleared => println!("  {tile_x},{tile_y} empty"),
                    TileStatus::Failed => println!("  {tile_x},{tile_y} failed"),
                    TileStatus::Downloading { .. } => {}
                }
            }
        }
    });

    tokio::select! {
        _ = scheduler.wait_until_idle() => {}
        _ = tokio::signal::ctrl_c() => {
            log::warn!(
                "Interrupted, pausing downloads ({} transfers still in flight)",
                scheduler.in_flight_count()
            );
            scheduler.pause();
            scheduler.wait_until_idle().await;
        }
    }

    archive.save().await.context("saving tile cache")?;
    println!(
        "{} tiles downloaded ({} empty)",
        archive.downloaded_count(),
        archive.empty_count()
    );
    Ok(())
}

async fn favorite(archive: &TileArchive, action: FavoriteAction) -> anyhow::Result<()> {
    match action {
        FavoriteAction::Add { address, name } => {
            let favorite = archive.add_favorite(address, name).await?;
            println!("Added {}", favorite.name);
        }
        FavoriteAction::Remove { address } => match archive.remove_favorite(&address).await? {
            Some(favorite) => println!("Removed {}", favorite.name),
            None => println!("No favorite at {}", address_label(&address)),
        },
        FavoriteAction::List => {
            for favorite in archive.favorites() {
                let address = favorite.address();
                println!("{}  {}", address_label(&address), favorite.name);
            }
        }
    }
    Ok(())
}

fn address_label(address: &PixelAddress) -> String {
    format!(
        "{}-{}-{}-{}",
        address.tile_x, address.tile_y, address.pixel_x, address.pixel_y
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("12-34-5-6"), Ok(PixelAddress::new(12, 34, 5, 6)));
        assert!(parse_address("12-34-5").is_err());
        assert!(parse_address("12-34-x-6").is_err());
    }

    #[test]
    fn test_parse_address_with_negative_tile_x() {
        let address = PixelAddress::new(-1, 3, 4, 5);
        assert_eq!(parse_address("-1-3-4-5"), Ok(address));
        assert_eq!(parse_address(&address_label(&address)), Ok(address));
    }
}
