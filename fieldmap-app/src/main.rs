use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use fieldmap::prelude::*;
use std::path::PathBuf;

/// Offline field data: prefetch map regions and manage recorded GPS tracks
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file; defaults plus environment overrides otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Overrides `storage.data_dir`
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Estimate tile count and storage for an area
    Estimate(AreaArgs),
    /// Download every tile of an area for offline use
    Download {
        #[command(flatten)]
        area: AreaArgs,
        /// Region name (defaults to the preset name)
        #[arg(long)]
        name: Option<String>,
    },
    /// List downloaded regions
    Regions,
    /// Delete a region and the tiles no other region uses
    DeleteRegion { id: String },
    /// Inspect or prune the tile cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// List recorded tracks
    Tracks,
    /// Write a track as GPX
    Export {
        id: String,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// Delete a recorded track
    DeleteTrack { id: String },
    /// Record a track by replaying the points of a GPX file
    Replay {
        file: PathBuf,
        #[arg(long)]
        name: Option<String>,
    },
    /// List the built-in regions
    Presets,
}

#[derive(Args, Debug)]
struct AreaArgs {
    /// Built-in region id, see `presets`
    #[arg(long, conflicts_with_all = ["north", "south", "east", "west"])]
    preset: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    north: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    south: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    east: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    west: Option<f64>,
    /// Zoom level, repeatable
    #[arg(short, long = "zoom")]
    zooms: Vec<u8>,
}

impl AreaArgs {
    fn request(&self, name: Option<String>) -> Result<RegionRequest> {
        if let Some(id) = &self.preset {
            let preset = find_preset(id).with_context(|| format!("unknown preset '{id}'"))?;
            let mut request = preset.to_request();
            if !self.zooms.is_empty() {
                request.zoom_levels = self.zooms.clone();
            }
            if let Some(name) = name {
                request.name = name;
            }
            return Ok(request);
        }

        let (Some(north), Some(south), Some(east), Some(west)) =
            (self.north, self.south, self.east, self.west)
        else {
            bail!("give either --preset or all of --north, --south, --east and --west");
        };
        if self.zooms.is_empty() {
            bail!("give at least one --zoom level");
        }
        Ok(RegionRequest::new(
            name.unwrap_or_else(|| "Custom region".to_string()),
            Bounds::new(north, south, east, west),
            self.zooms.clone(),
        ))
    }
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Total size of cached tiles
    Size,
    /// Remove tiles older than the configured maximum age
    Prune,
    /// Evict oldest tiles until the cache fits the configured budget
    Evict,
    /// Remove every tile and region
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => FieldConfig::load(path)?,
        None => FieldConfig::from_env(),
    };
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }
    let data_dir = config.storage.data_dir.clone();

    match cli.command {
        Command::Estimate(area) => {
            let request = area.request(None)?;
            let estimate = estimate_region_size(&request.bounds, &request.zoom_levels)?;
            println!(
                "{}: {} tiles, about {}",
                request.name,
                estimate.tile_count,
                estimate.human_size()
            );
        }
        Command::Download { area, name } => {
            let request = area.request(name)?;
            download(&config, request).await?;
        }
        Command::Regions => {
            let store = TileStore::open(&data_dir, 0).await?;
            for region in store.list_regions().await? {
                println!(
                    "{}  {:<28} {:?}  {}/{} tiles ({} missing)  zoom {:?}",
                    region.id,
                    region.name,
                    region.status,
                    region.downloaded_tile_count,
                    region.expected_tile_count,
                    region.expected_tile_count - region.downloaded_tile_count.min(region.expected_tile_count),
                    region.zoom_levels
                );
            }
        }
        Command::DeleteRegion { id } => {
            let downloader = downloader(&config).await?;
            downloader.store().require_region(&id).await?;
            let removed = downloader.delete_region(&id).await?;
            println!("deleted region {id} and {removed} tiles");
        }
        Command::Cache { action } => cache(&config, action).await?,
        Command::Tracks => {
            let store = TrackStore::open(&data_dir).await?;
            for track in store.list().await? {
                println!(
                    "{}  {:<24} {:>5} fixes {:>3} waypoints  {:>9}  {:>8}  {}",
                    track.id,
                    track.name,
                    track.fixes.len(),
                    track.waypoints.len(),
                    format_distance(track.distance_meters.unwrap_or(0.0)),
                    format_duration(track.duration_seconds.unwrap_or(0)),
                    format_speed(track.avg_speed_mps.unwrap_or(0.0))
                );
            }
        }
        Command::Export { id, out } => {
            let store = TrackStore::open(&data_dir).await?;
            let track = store.require(&id).await?;
            let path = out.join(gpx_file_name(&track));
            tokio::fs::write(&path, export_gpx(&track))
                .await
                .with_context(|| format!("cannot write {}", path.display()))?;
            println!("wrote {}", path.display());
        }
        Command::DeleteTrack { id } => {
            let store = TrackStore::open(&data_dir).await?;
            if !store.delete(&id).await? {
                bail!("no track {id}");
            }
            println!("deleted track {id}");
        }
        Command::Replay { file, name } => replay(&data_dir, file, name).await?,
        Command::Presets => {
            for preset in PRESET_REGIONS {
                let request = preset.to_request();
                let estimate = estimate_region_size(&request.bounds, &request.zoom_levels)?;
                println!(
                    "{:<14} {:<26} zoom {}-{}  {} tiles, about {}",
                    preset.id,
                    preset.name,
                    preset.min_zoom,
                    preset.max_zoom,
                    estimate.tile_count,
                    estimate.human_size()
                );
            }
        }
    }
    Ok(())
}

async fn downloader(config: &FieldConfig) -> Result<RegionDownloader> {
    let store = TileStore::open(&config.storage.data_dir, config.cache.memory_tiles).await?;
    let provider = HttpTileProvider::from_config(&config.provider);
    Ok(RegionDownloader::new(
        Arc::new(store),
        Arc::new(provider),
        config.downloader.clone(),
    ))
}

async fn download(config: &FieldConfig, request: RegionRequest) -> Result<()> {
    if config.provider.access_token.is_empty()
        && config.provider.url_template.contains("{token}")
    {
        log::warn!("no access token configured; the tile provider will likely refuse requests");
    }
    let estimate = estimate_region_size(&request.bounds, &request.zoom_levels)?;
    log::info!(
        "{}: {} tiles, about {}",
        request.name,
        estimate.tile_count,
        estimate.human_size()
    );

    let downloader = downloader(config).await?;
    let cancel = CancellationFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("interrupt received, stopping after the current tile");
                cancel.cancel();
            }
        });
    }

    let mut last_reported = -1i64;
    let region = downloader
        .download_region_with(
            request,
            |percent, region| {
                let step = (percent / 5.0).floor() as i64;
                if step > last_reported {
                    last_reported = step;
                    log::info!(
                        "{:>5.1}%  {}/{} tiles",
                        percent,
                        region.downloaded_tile_count,
                        region.expected_tile_count
                    );
                }
            },
            &cancel,
        )
        .await?;

    println!(
        "region {} {:?}: {}/{} tiles ({} already cached, {} failed), {} fetched",
        region.id,
        region.status,
        region.downloaded_tile_count,
        region.expected_tile_count,
        region.cached_tile_count,
        region.failed_tile_count,
        format_size(region.total_size_bytes)
    );
    if region.status == RegionStatus::Complete && !region.is_fully_cached() {
        log::warn!("some tiles are missing; run the download again to retry them");
    }
    Ok(())
}

async fn cache(config: &FieldConfig, action: CacheAction) -> Result<()> {
    let store = TileStore::open(&config.storage.data_dir, 0).await?;
    match action {
        CacheAction::Size => {
            let bytes = store.total_size_bytes().await?;
            println!(
                "{} tiles, {} of {}",
                store.len().await?,
                format_size(bytes),
                format_size(config.cache.max_bytes)
            );
        }
        CacheAction::Prune => {
            let now = SystemClock.now_ms();
            let summary = store
                .clear_expired(config.cache.tile_max_age(), now)
                .await?;
            println!(
                "removed {} expired tiles, freed {}",
                summary.removed_tiles,
                format_size(summary.freed_bytes)
            );
        }
        CacheAction::Evict => {
            let summary = store.evict_to_budget(config.cache.max_bytes).await?;
            println!(
                "evicted {} tiles, freed {}",
                summary.removed_tiles,
                format_size(summary.freed_bytes)
            );
        }
        CacheAction::Clear => {
            store.clear_all().await?;
            println!("cleared all tiles and regions");
        }
    }
    Ok(())
}

fn fix_from_gpx(point: &gpx::Waypoint, fallback_ms: i64) -> GeoFix {
    let timestamp_ms = point
        .time
        .as_ref()
        .and_then(|time| time.format().ok())
        .and_then(|text| chrono::DateTime::parse_from_rfc3339(&text).ok())
        .map(|time| time.timestamp_millis())
        .unwrap_or(fallback_ms);
    let location = point.point();
    let fix = GeoFix::new(location.y(), location.x(), timestamp_ms);
    match point.elevation {
        Some(elevation) => fix.with_altitude(elevation),
        None => fix,
    }
}

/// Feed the first track of a GPX file through the recorder as if it were live
async fn replay(data_dir: &std::path::Path, file: PathBuf, name: Option<String>) -> Result<()> {
    let reader = std::io::BufReader::new(
        std::fs::File::open(&file).with_context(|| format!("cannot open {}", file.display()))?,
    );
    let document = gpx::read(reader).with_context(|| format!("invalid GPX {}", file.display()))?;

    let now = SystemClock.now_ms();
    let points: Vec<GeoFix> = document
        .tracks
        .iter()
        .flat_map(|track| &track.segments)
        .flat_map(|segment| &segment.points)
        .enumerate()
        .map(|(i, point)| fix_from_gpx(point, now + i as i64 * 1_000))
        .collect();
    let Some(first) = points.first() else {
        bail!("{} has no track points", file.display());
    };

    let name = name
        .or_else(|| document.tracks.first().and_then(|t| t.name.clone()))
        .unwrap_or_else(|| "Replayed track".to_string());

    let clock = Arc::new(ManualClock::new(first.timestamp_ms));
    let source = SimulatedLocationSource::new();
    let store = Arc::new(TrackStore::open(data_dir).await?);
    let recorder = TrackRecorder::new(Arc::new(source.clone()), store).with_clock(clock.clone());

    recorder.start_tracking(name, None).await?;
    for fix in &points {
        clock.set(fix.timestamp_ms.max(clock.now_ms()));
        source.push(*fix);
    }
    for waypoint in &document.waypoints {
        let fix = fix_from_gpx(waypoint, clock.now_ms());
        source.set_current(fix);
        let category = waypoint
            .type_
            .as_deref()
            .and_then(|t| t.parse().ok())
            .unwrap_or_default();
        let mut new_waypoint = NewWaypoint::new(
            waypoint.name.clone().unwrap_or_else(|| "Waypoint".to_string()),
            category,
        );
        new_waypoint.description = waypoint.description.clone();
        recorder.add_waypoint(new_waypoint).await?;
    }
    let track = recorder.stop_tracking().await?;

    println!(
        "recorded track {} ({}): {} fixes, {}, {}",
        track.id,
        track.name,
        track.fixes.len(),
        format_distance(track.distance_meters.unwrap_or(0.0)),
        format_duration(track.duration_seconds.unwrap_or(0))
    );
    Ok(())
}
