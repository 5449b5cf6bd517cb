fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;

    let cli = vitalcore_core::cli::Cli::parse();
    load_dotenv();
    tracing_subscriber::fmt::init();

    match cli.command {
        None => vitalcore_core::run_server().await,
        Some(cmd) => vitalcore_core::cli::dispatch(cmd).await,
    }
}

#[cfg(not(feature = "cli"))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    tracing_subscriber::fmt::init();
    vitalcore_core::run_server().await
}
