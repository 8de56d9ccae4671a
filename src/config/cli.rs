use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "partida-service")]
#[command(about = "Resolve coordinates to municipal partidas and verify they are still active")]
#[command(version)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Resolve a coordinate to its partida(s), optionally emailing the result
    Resolve {
        #[command(flatten)]
        coordinate: CoordinateArgs,
        /// Send the result to this address
        #[arg(long)]
        email: Option<String>,
    },
    /// Check whether the partida at a coordinate is still active
    Verify {
        #[command(flatten)]
        coordinate: CoordinateArgs,
    },
}

#[derive(Debug, Args, Default)]
pub struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Debug, Args)]
pub struct CoordinateArgs {
    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,
    #[arg(long, allow_hyphen_values = true)]
    pub lng: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_serve() {
        let cli = Cli::try_parse_from(["partida-service"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_parses_negative_coordinates() {
        let cli = Cli::try_parse_from([
            "partida-service",
            "verify",
            "--lat",
            "-34.6",
            "--lng",
            "-58.4",
        ])
        .unwrap();

        match cli.command {
            Some(Command::Verify { coordinate }) => {
                assert_eq!(coordinate.lat, -34.6);
                assert_eq!(coordinate.lng, -58.4);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "partida-service",
            "resolve",
            "--lat=-34.6",
            "--lng=-58.4",
            "--email",
            "vecino@example.com",
            "--config",
            "partida.toml",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("partida.toml")));
        assert!(matches!(cli.command, Some(Command::Resolve { email: Some(_), .. })));
    }
}
