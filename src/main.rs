#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with explicit filter to suppress sqlx debug logs
    use env_logger::{Builder, Env};
    use log::LevelFilter;

    Builder::from_env(Env::default().default_filter_or("info"))
        .filter_module("sqlx", LevelFilter::Warn)
        .init();

    println!("GRISERA: research data API server");

    grisera_api::run_server().await
}
