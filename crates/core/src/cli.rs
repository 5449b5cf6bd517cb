use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "vitalcore-server", version, about = "VitalCore health-signal processing backend")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default if no subcommand is given).
    Serve,
    /// Apply pending database migrations and exit.
    Migrate,
}

pub async fn dispatch(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Serve => crate::run_server().await,
        Commands::Migrate => {
            let config = crate::config::AppConfig::load()?;
            let pool = crate::db::connect(&config.database_url).await?;
            crate::db::init_db(&pool).await?;
            tracing::info!("migrations applied");
            Ok(())
        }
    }
}
