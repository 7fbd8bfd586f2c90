use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "hmux",
    about = "Hash multiplexer: sticky routing of hashes to backend stores",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML file with mux settings
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend address; repeat for each backend
    #[arg(short, long = "backend", global = true)]
    pub backends: Vec<String>,

    /// Seed for backend draws
    #[arg(long, global = true)]
    pub seed: Option<u64>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Resolve hashes to backends
    Route(RouteArgs),
    /// Route many generated keys and report how they spread
    Simulate(SimulateArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct RouteArgs {
    #[arg(required = true)]
    pub hashes: Vec<String>,
    /// Bind every hash to the backend of the first one
    #[arg(short, long)]
    pub group: bool,
    /// Route a second time after invalidating, to show redraws
    #[arg(long)]
    pub invalidate: bool,
}

#[derive(Args)]
pub struct SimulateArgs {
    #[arg(short = 'n', long, default_value = "1000")]
    pub keys: usize,
    #[arg(long, default_value = "key-")]
    pub key_prefix: String,
}

#[derive(Args)]
pub struct ConfigArgs {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_route() {
        let cli = Cli::try_parse_from(["hmux", "route", "user:1"]).unwrap();
        if let Command::Route(args) = cli.command {
            assert_eq!(args.hashes, vec!["user:1"]);
            assert!(!args.group);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_route_requires_hash() {
        assert!(Cli::try_parse_from(["hmux", "route"]).is_err());
    }

    #[test]
    fn parse_route_group() {
        let cli = Cli::try_parse_from(["hmux", "route", "--group", "p", "s1", "s2"]).unwrap();
        if let Command::Route(args) = cli.command {
            assert!(args.group);
            assert_eq!(args.hashes, vec!["p", "s1", "s2"]);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_simulate() {
        let cli = Cli::try_parse_from(["hmux", "simulate", "-n", "50", "--seed", "7"]).unwrap();
        assert_eq!(cli.seed, Some(7));
        if let Command::Simulate(args) = cli.command {
            assert_eq!(args.keys, 50);
            assert_eq!(args.key_prefix, "key-");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_backends() {
        let cli = Cli::try_parse_from(["hmux", "-b", "a:1", "--backend", "b:2", "config"]).unwrap();
        assert_eq!(cli.backends, vec!["a:1", "b:2"]);
        assert!(matches!(cli.command, Command::Config(_)));
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::try_parse_from(["hmux", "--verbose", "config"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["hmux", "--format", "json", "route", "k"]).unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
    }
}
