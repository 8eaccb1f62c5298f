use anyhow::Context;

use tablepos_infra::PipelineConfig;
use tablepos_infra::jobs::RunnerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tablepos_observability::init();

    let config = PipelineConfig::from_env().context("reading configuration")?;
    let (app, services) = tablepos_api::app::build_app(&config)
        .await
        .context("wiring services")?;

    let runner = services
        .spawn_export_runner(RunnerConfig::default(), tokio::runtime::Handle::current())
        .context("starting export runner")?;

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    let served = axum::serve(listener, app).await;
    runner.shutdown();
    served.context("server error")
}
