use actix_web::{get, middleware, web::Data, App, HttpRequest, HttpResponse, HttpServer, Responder};
use whisk_operator::components::ComponentContext;
use whisk_operator::config::ConfigStore;
use whisk_operator::k8s::adapter::KubeAdapter;
use whisk_operator::quota;
use whisk_operator::reconcile::{self, State};
use whisk_operator::telemetry;
use whisk_operator::template::Renderer;
use whisk_operator::templates;
use whisk_operator_k8s_util::client::new_client_with_metrics;

use clap::{crate_authors, crate_description, crate_version, Parser, Subcommand};
use kube::Config;
use prometheus_client::registry::Registry;
use std::sync::Arc;

#[get("/metrics")]
async fn metrics(c: Data<State>, _req: HttpRequest) -> impl Responder {
    HttpResponse::Ok()
        .content_type("application/openmetrics-text; version=1.0.0; charset=utf-8")
        .body(c.metrics())
}

#[get("/health")]
async fn health(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json("healthy")
}

#[derive(Parser, Debug)]
#[command(
    name="whisk-operator",
    about = crate_description!(),
    version = crate_version!(),
    author = crate_authors!("\n"),
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Listen on given port
    #[arg(short, long, default_value_t = 8080, env)]
    port: u32,

    /// Set logging filter directive for `tracing_subscriber::filter::EnvFilter`. Example: "info,kube=debug,whisk_operator=debug"
    #[arg(long, default_value = "info", env)]
    log_filter: String,

    /// Set log format
    #[arg(long, value_enum, default_value_t = telemetry::LogFormat::Text, env)]
    log_format: telemetry::LogFormat,

    /// URL for the OpenTelemetry tracing endpoint.
    ///
    /// This optional argument specifies the URL to which traces will be sent using
    /// OpenTelemetry. If not provided, tracing will be disabled.
    #[arg(short, long, env = "OPENTELEMETRY_ENDPOINT_URL")]
    tracing_url: Option<String>,

    /// Sampling ratio for tracing.
    ///
    /// Specifies the ratio of traces to sample. A value of `1.0` will sample all traces,
    /// while a lower value will sample fewer traces. The default is `0.1`, meaning 10%
    /// of traces are sampled.
    #[arg(short, long, default_value_t = 0.1, env)]
    sample_ratio: f64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Runs a single quota-enforcement pass against every `WhiskUser` and
    /// exits. This is what the `quotaEnforcer` component's CronJob runs.
    QuotaTick,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = Args::parse();

    telemetry::init(
        &args.log_filter,
        args.log_format,
        args.tracing_url.as_deref(),
        args.sample_ratio,
    )
    .await?;

    let mut registry = Registry::with_prefix("whisk-operator");
    let config = Config::infer().await?;
    let client = new_client_with_metrics(config, &mut registry).await?;

    if matches!(args.command, Some(Command::QuotaTick)) {
        let adapter = Arc::new(KubeAdapter::new(client.clone()).await?);
        let renderer = Arc::new(Renderer::new(&templates::catalog())?);
        let config_store = Arc::new(ConfigStore::bootstrap()?);
        let ctx = ComponentContext {
            adapter,
            renderer,
            config: config_store,
        };
        quota::run_tick(&client, &ctx).await?;
        return Ok(());
    }

    let state = State::bootstrap(client, registry).await?;
    let controller = reconcile::run(state.clone());

    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(state.clone()))
            .wrap(middleware::Logger::default().exclude("/health"))
            .service(health)
            .service(metrics)
    })
    .bind(format!("0.0.0.0:{}", args.port))?
    .shutdown_timeout(5);

    // Both runtimes implement graceful shutdown, so poll until both are done
    tokio::join!(controller, server.run()).1?;
    Ok(())
}
