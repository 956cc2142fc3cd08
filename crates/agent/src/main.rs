mod config;
mod containers;
mod control;
mod metrics;
mod runtime;
mod state;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    runtime::boot::init_logging();

    let (state, config) = runtime::boot::boot().await?;
    runtime::serve::serve(state, &config).await
}
