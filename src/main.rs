use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

mod app;
mod auth;
mod config;
mod error;
mod extract;
mod favorites;
mod images;
mod ingredients;
mod pagination;
mod recipes;
mod shopping;
mod state;
mod tags;
mod users;

use crate::config::AppConfig;
use crate::state::AppState;
use crate::users::repo_types::User;

#[derive(Parser, Debug)]
#[command(name = "foodgram", version, about = "Recipe sharing API server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run migrations and start the HTTP server (default).
    Serve,
    /// Bulk-import ingredients from a CSV or JSON file.
    LoadIngredients {
        /// `name,measurement_unit` CSV or a JSON array of objects.
        path: PathBuf,
    },
    /// Grant staff rights, letting the user edit or delete any recipe.
    PromoteStaff {
        email: String,
        /// Take staff rights away instead.
        #[arg(long)]
        revoke: bool,
    },
}

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "foodgram=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let state = AppState::init(config.clone()).await?;
            sqlx::migrate!("./migrations")
                .run(&state.db)
                .await
                .context("run migrations")?;
            tracing::info!("migrations applied");

            let app = app::build_app(state);
            app::serve(app, &config).await
        }
        Command::LoadIngredients { path } => {
            let db = AppState::connect_db(&config).await?;
            let inserted = ingredients::loader::load_file(&db, &path)
                .await
                .with_context(|| format!("load ingredients from {}", path.display()))?;
            tracing::info!(inserted, path = %path.display(), "ingredients loaded");
            Ok(())
        }
        Command::PromoteStaff { email, revoke } => {
            let db = AppState::connect_db(&config).await?;
            if !User::set_staff(&db, &email, !revoke).await? {
                anyhow::bail!("no user with email {email}");
            }
            tracing::info!(%email, is_staff = !revoke, "staff flag updated");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["foodgram"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn parses_load_ingredients_path() {
        let cli = Cli::try_parse_from(["foodgram", "load-ingredients", "data/ingredients.csv"])
            .unwrap();
        match cli.command {
            Some(Command::LoadIngredients { path }) => {
                assert_eq!(path, PathBuf::from("data/ingredients.csv"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_promote_staff_with_optional_revoke() {
        let cli = Cli::try_parse_from(["foodgram", "promote-staff", "chef@example.com"]).unwrap();
        match cli.command {
            Some(Command::PromoteStaff { email, revoke }) => {
                assert_eq!(email, "chef@example.com");
                assert!(!revoke);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli =
            Cli::try_parse_from(["foodgram", "promote-staff", "chef@example.com", "--revoke"])
                .unwrap();
        assert!(matches!(cli.command, Some(Command::PromoteStaff { revoke: true, .. })));
    }
}
