use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use hmux_core::{BaseMux, DrawSource, Mux, MuxConfig, MuxOptions, RngDraw};
use hmux_store::{Client, InMemoryStore};
use hmux_types::Hash;
use serde::Serialize;

use crate::cli::*;

const DEFAULT_BACKENDS: [&str; 2] = ["127.0.0.1:6379", "127.0.0.1:6380"];

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    match &cli.command {
        Command::Route(args) => cmd_route(&cli, config, args),
        Command::Simulate(args) => cmd_simulate(&cli, config, args),
        Command::Config(_) => cmd_config(&cli, &config),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<MuxConfig> {
    let config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            MuxConfig::from_toml_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => MuxConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// In-memory coordination store plus one in-memory store per backend.
fn build_mux(cli: &Cli, config: MuxConfig) -> anyhow::Result<(BaseMux, InMemoryStore)> {
    let coord = InMemoryStore::new("coordination");
    let addrs: Vec<&str> = if cli.backends.is_empty() {
        DEFAULT_BACKENDS.to_vec()
    } else {
        cli.backends.iter().map(String::as_str).collect()
    };
    let draw: Arc<dyn DrawSource> = match cli.seed {
        Some(seed) => Arc::new(RngDraw::seeded(seed)),
        None => Arc::new(RngDraw::from_entropy()),
    };
    let mux = BaseMux::new(
        MuxOptions::new(Arc::new(coord.clone()))
            .clients(addrs.into_iter().map(|a| Arc::new(InMemoryStore::new(a)) as Arc<dyn Client>))
            .config(config)
            .draw(draw),
    )?;
    Ok((mux, coord))
}

// ---- route ----

#[derive(Debug, Serialize)]
struct RouteRow {
    hash: String,
    key: String,
    backend: Option<String>,
    error: Option<String>,
}

fn route_row(mux: &BaseMux, hash: &Hash, client: &Arc<dyn Client>) -> RouteRow {
    RouteRow {
        hash: hash.to_string(),
        key: mux.key_for(hash),
        backend: client.addr().map(str::to_string),
        error: client.failure().map(ToString::to_string),
    }
}

fn route(mux: &BaseMux, args: &RouteArgs) -> anyhow::Result<Vec<RouteRow>> {
    let hashes = args
        .hashes
        .iter()
        .map(|h| Hash::try_new(h.as_str()))
        .collect::<Result<Vec<_>, _>>()?;
    let mut rows = Vec::with_capacity(hashes.len());
    match hashes.split_first() {
        Some((primary, satellites)) if args.group => {
            let client = mux.on_many(primary, satellites);
            rows.push(route_row(mux, primary, &client));
            for sat in satellites {
                let mapped = mux.get_mapping(sat);
                rows.push(match mapped {
                    Some(client) => route_row(mux, sat, &client),
                    None => RouteRow {
                        hash: sat.to_string(),
                        key: mux.key_for(sat),
                        backend: None,
                        error: Some("unmapped".into()),
                    },
                });
            }
        }
        _ => {
            for hash in &hashes {
                rows.push(route_row(mux, hash, &mux.on(hash)));
            }
        }
    }
    if args.invalidate {
        mux.invalidate_many(&hashes)?;
        for hash in &hashes {
            rows.push(route_row(mux, hash, &mux.on(hash)));
        }
    }
    Ok(rows)
}

fn cmd_route(cli: &Cli, config: MuxConfig, args: &RouteArgs) -> anyhow::Result<()> {
    let (mux, _coord) = build_mux(cli, config)?;
    let rows = route(&mux, args)?;
    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Text => {
            for row in &rows {
                match (&row.backend, &row.error) {
                    (Some(backend), _) => println!("{} → {}  ({})", row.hash.bold(), backend.green(), row.key.dimmed()),
                    (None, Some(err)) => println!("{} {} {}", "✗".red().bold(), row.hash.bold(), err.red()),
                    (None, None) => println!("{} {}", "?".yellow(), row.hash.bold()),
                }
            }
        }
    }
    let failed = rows.iter().filter(|r| r.backend.is_none()).count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} routes failed", rows.len());
    }
    Ok(())
}

// ---- simulate ----

#[derive(Debug, Serialize)]
struct Simulation {
    keys: usize,
    /// Keys per backend address.
    distribution: BTreeMap<String, usize>,
    /// Keys whose second route disagreed with the first.
    moved: usize,
    failed: usize,
}

fn simulate(mux: &BaseMux, args: &SimulateArgs) -> Simulation {
    let mut distribution: BTreeMap<String, usize> = mux
        .all()
        .iter()
        .filter_map(|c| c.addr())
        .map(|a| (a.to_string(), 0))
        .collect();
    let mut moved = 0;
    let mut failed = 0;
    for i in 0..args.keys {
        let hash = Hash::new(format!("{}{i}", args.key_prefix));
        let first = mux.on(&hash);
        let Some(addr) = first.addr() else {
            failed += 1;
            continue;
        };
        *distribution.entry(addr.to_string()).or_default() += 1;
        if mux.on(&hash).addr() != Some(addr) {
            moved += 1;
        }
    }
    Simulation {
        keys: args.keys,
        distribution,
        moved,
        failed,
    }
}

fn cmd_simulate(cli: &Cli, config: MuxConfig, args: &SimulateArgs) -> anyhow::Result<()> {
    let (mux, coord) = build_mux(cli, config)?;
    let sim = simulate(&mux, args);
    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&sim)?),
        OutputFormat::Text => {
            println!("Routed {} keys over {} backends", sim.keys.to_string().bold(), mux.all().len());
            for (backend, count) in &sim.distribution {
                let share = if sim.keys == 0 { 0.0 } else { *count as f64 * 100.0 / sim.keys as f64 };
                println!("  {:<24} {:>8}  {:>5.1}%", backend.cyan(), count, share);
            }
            println!("  Mappings stored: {}", coord.len());
            if sim.moved == 0 && sim.failed == 0 {
                println!("{} Every key stayed on its backend", "✓".green().bold());
            } else {
                println!("{} {} moved, {} failed", "✗".red().bold(), sim.moved, sim.failed);
            }
        }
    }
    Ok(())
}

// ---- config ----

fn cmd_config(cli: &Cli, config: &MuxConfig) -> anyhow::Result<()> {
    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => print!("{}", config.to_toml_string()?),
    }
    Ok(())
}
