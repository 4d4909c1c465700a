use anyhow::Result;
use skyward_core::Config;

#[tokio::main]
async fn main() -> Result<()> {
    skyward_core::init()?;

    let (config, validation) = Config::load_validated()?;
    if !validation.warnings.is_empty() {
        tracing::info!("Loaded configuration with {} warning(s)", validation.warnings.len());
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown requested");
    };

    if let Err(e) = skyward_server::run(config, shutdown).await {
        tracing::error!("{} ({})", e.user_message(), e);
        return Err(e.into());
    }
    Ok(())
}
