use kb_core::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    kb_observability::init_tracing(&config.log_level.to_lowercase());

    kb_server::run(config).await
}
