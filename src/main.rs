use anyhow::Context;
use clap::Parser;
use partida_service::app::{build_engine, server};
use partida_service::config::cli::{Cli, Command, CoordinateArgs, ServeArgs};
use partida_service::config::AppConfig;
use partida_service::domain::model::Coordinate;
use partida_service::utils::error::{AppError, ErrorSeverity};
use partida_service::utils::logger;
use partida_service::utils::validation::is_valid_email;
use serde::Serialize;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(1);
        }
    };

    logger::init_logger(&config.logging, cli.verbose);
    tracing::info!("Starting partida-service {}", env!("CARGO_PKG_VERSION"));
    if cli.verbose {
        tracing::debug!("Config: {:?}", config);
    }

    let outcome = match cli.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => serve(config, args).await,
        Command::Resolve { coordinate, email } => resolve(&config, coordinate, email).await,
        Command::Verify { coordinate } => verify(&config, coordinate).await,
    };

    if let Err(e) = outcome {
        let app_error = match e.downcast::<AppError>() {
            Ok(app_error) => app_error,
            Err(other) => return Err(other),
        };
        tracing::error!(
            "❌ {} (Category: {:?}, Severity: {:?})",
            app_error,
            app_error.category(),
            app_error.severity()
        );
        eprintln!("❌ {}", app_error.user_friendly_message());
        eprintln!("💡 {}", app_error.recovery_suggestion());

        // Exit code by severity; 4 means the lookup simply found nothing.
        let exit_code = match app_error.severity() {
            ErrorSeverity::Low => 4,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        std::process::exit(exit_code);
    }

    Ok(())
}

async fn serve(mut config: AppConfig, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    server::run(config).await?;
    Ok(())
}

async fn resolve(
    config: &AppConfig,
    coordinate: CoordinateArgs,
    email: Option<String>,
) -> anyhow::Result<()> {
    if let Some(email) = email.as_deref() {
        if !is_valid_email(email) {
            return Err(AppError::InvalidRequest {
                message: format!("'{}' no es un email válido", email),
            }
            .into());
        }
    }

    let (engine, pool) = build_engine(config)?;
    let coord = Coordinate::new(coordinate.lat, coordinate.lng);

    let work = async {
        match email.as_deref() {
            Some(email) => engine
                .resolve_and_notify(coord, email)
                .await
                .map_err(AppError::from),
            None => engine
                .resolver()
                .resolve_parcel(coord)
                .await
                .map_err(AppError::from),
        }
    };
    let outcome = server::until_shutdown(work, server::shutdown_signal()).await;

    if let Some(pool) = pool {
        pool.shutdown().await;
    }
    print_json(&interrupted_or(outcome)?)
}

async fn verify(config: &AppConfig, coordinate: CoordinateArgs) -> anyhow::Result<()> {
    let (engine, pool) = build_engine(config)?;
    let work = engine.verify(Coordinate::new(coordinate.lat, coordinate.lng));
    let outcome = server::until_shutdown(work, server::shutdown_signal()).await;

    if let Some(pool) = pool {
        pool.shutdown().await;
    }
    print_json(&interrupted_or(outcome.map(|r| r.map_err(AppError::from)))?)
}

fn interrupted_or<T>(outcome: Option<Result<T, AppError>>) -> anyhow::Result<T> {
    match outcome {
        Some(result) => Ok(result?),
        None => anyhow::bail!("Interrupted before the lookup finished"),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render result")?;
    println!("{}", rendered);
    Ok(())
}
