/// Offline harness: build a kite surface from a JSON profile file and print
/// its geometry and site distances as JSON.
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use kite_core::{GeoPoint, KiteSurface, MeshParams, Profile, SiteCollection};
use log::info;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "kite-test", about = "Build a kite fault surface and report its geometry")]
struct Args {
    /// JSON file with a list of profiles, each a list of [lon, lat, depth].
    #[arg(short, long)]
    profiles: PathBuf,

    /// JSON file with {"lons": [...], "lats": [...], "depths": [...]}.
    #[arg(short, long)]
    sites: Option<PathBuf>,

    /// Spacing along the profiles (km).
    #[arg(long, default_value_t = 2.0)]
    profile_sampling: f64,

    /// Spacing between profiles (km).
    #[arg(long, default_value_t = 2.0)]
    edge_sampling: f64,

    /// Align profiles vertically before stitching.
    #[arg(long)]
    align: bool,

    /// The surface crosses the International Date Line.
    #[arg(long)]
    idl: bool,
}

#[derive(Serialize)]
struct SiteDistances {
    rrup: Vec<f64>,
    rjb: Vec<f64>,
    rx: Vec<f64>,
    ry0: Vec<f64>,
}

#[derive(Serialize)]
struct Report {
    shape: (usize, usize),
    strike: f64,
    dip: f64,
    width: f64,
    area: f64,
    top_edge_depth: f64,
    center: GeoPoint,
    boundary: Vec<(f64, f64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    distances: Option<SiteDistances>,
}

fn read_profiles(path: &PathBuf) -> Result<Vec<Profile>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let raw: Vec<Vec<[f64; 3]>> =
        serde_json::from_str(&text).with_context(|| format!("parsing profiles in {}", path.display()))?;
    raw.into_iter()
        .enumerate()
        .map(|(i, pts)| {
            let points = pts.into_iter().map(|[lon, lat, depth]| GeoPoint::new(lon, lat, depth)).collect();
            Profile::new(points).with_context(|| format!("profile {i}"))
        })
        .collect()
}

fn read_sites(path: &PathBuf) -> Result<SiteCollection> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing sites in {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let profiles = read_profiles(&args.profiles)?;
    let params = MeshParams::new(args.profile_sampling, args.edge_sampling)
        .with_align(args.align)
        .with_idl(args.idl);
    info!("building surface from {} profiles with {params:?}", profiles.len());

    let surface = KiteSurface::from_profiles(&profiles, &params).context("building kite surface")?;

    let distances = match &args.sites {
        Some(path) => {
            let sites = read_sites(path)?;
            info!("computing distances for {} sites", sites.len());
            Some(SiteDistances {
                rrup: surface.get_min_distance(&sites),
                rjb: surface.get_joyner_boore_distance(&sites),
                rx: surface.get_rx_distance(&sites),
                ry0: surface.get_ry0_distance(&sites),
            })
        }
        None => None,
    };

    let (lons, lats) = surface.get_external_boundary();
    let report = Report {
        shape: surface.mesh().shape(),
        strike: surface.get_strike(),
        dip: surface.get_dip(),
        width: surface.get_width(),
        area: surface.get_area(),
        top_edge_depth: surface.get_top_edge_depth(),
        center: surface.get_center(),
        boundary: lons.into_iter().zip(lats).collect(),
        distances,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
