use satellite_dispatch::client::JobClient;
use satellite_dispatch::comm::types::{ConnectivityInfo, Job};
use satellite_dispatch::config::{self, EnvConfig, LayeredConfig, PropertiesConfig};
use satellite_dispatch::satellite::service::Satellite;
use satellite_dispatch::server::dispatcher::Dispatcher;
use satellite_dispatch::tool::CodeFetcher;
use satellite_dispatch::tool::builtin::{FIBONACCI_LEGACY_ID, register_builtin_tools};
use satellite_dispatch::tool::catalog::ToolCatalog;
use satellite_dispatch::tool::remote::{CodeRepository, RemoteCodeFetcher, serve_code_repository};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        usage(&args[0]);
    }

    match args[1].as_str() {
        "dispatcher" => run_dispatcher(&args[2]).await,
        "satellite" if args.len() >= 5 => run_satellite(&args[2], &args[3], &args[4]).await,
        "client" if args.len() >= 5 => {
            let count = match args.get(5) {
                Some(count) => count.parse()?,
                None => 1,
            };
            run_client(&args[2], &args[3], &args[4], count).await
        }
        "code-server" => run_code_server(&args[2]).await,
        "fibonacci-client" => run_fibonacci_client(&args[2]).await,
        _ => usage(&args[0]),
    }
}

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} <command> <args>", program);
    eprintln!("  {} dispatcher <server.properties>", program);
    eprintln!(
        "  {} satellite <satellite.properties> <code-server.properties|-> <server.properties>",
        program
    );
    eprintln!(
        "  {} client <server.properties> <tool> <json-parameter> [count]",
        program
    );
    eprintln!("  {} code-server <code-server.properties>", program);
    eprintln!("  {} fibonacci-client <server.properties>", program);
    eprintln!(
        "Example: {} client server.properties Fibonacci 30",
        program
    );

    std::process::exit(1);
}

/// Environment variables (`{prefix}KEY`) override the properties file.
fn load_config(path: &str, env_prefix: &str) -> anyhow::Result<LayeredConfig> {
    Ok(LayeredConfig::new()
        .with(EnvConfig::new(env_prefix))
        .with(PropertiesConfig::load(path)?))
}

fn linked_catalog() -> Arc<ToolCatalog> {
    let catalog = ToolCatalog::new();
    register_builtin_tools(&catalog);
    catalog
}

async fn run_dispatcher(server_config: &str) -> anyhow::Result<()> {
    let provider = load_config(server_config, "DISPATCHER_")?;
    let info = config::connectivity(&provider, false)?;
    let settings = config::dispatcher_settings(&provider)?;

    tracing::info!("Starting dispatcher on {}", info);

    let dispatcher = Dispatcher::bind(&info, settings).await?;
    dispatcher.spawn_stats_reporter(Duration::from_secs(5));

    tracing::info!("Press Ctrl+C to shutdown");
    dispatcher.run().await;

    Ok(())
}

async fn run_satellite(
    satellite_config: &str,
    code_server_config: &str,
    server_config: &str,
) -> anyhow::Result<()> {
    let provider = load_config(satellite_config, "SATELLITE_")?;
    let info = config::connectivity(&provider, true)?;
    let settings = config::satellite_settings(&provider)?;

    let dispatcher = config::connectivity(&load_config(server_config, "DISPATCHER_")?, false)?;

    let catalog = linked_catalog();
    let fetcher: Arc<dyn CodeFetcher> = if code_server_config == "-" {
        tracing::info!("Resolving tools from the linked catalog");
        catalog
    } else {
        let repository =
            config::connectivity(&load_config(code_server_config, "CODE_SERVER_")?, false)?;
        tracing::info!("Fetching tools from code repository {}", repository);
        Arc::new(RemoteCodeFetcher::new(
            &repository,
            catalog,
            settings.timeouts.connect,
        ))
    };

    let satellite = Satellite::bind(info, dispatcher, fetcher, settings).await?;
    satellite.start().await?;

    Ok(())
}

async fn run_client(
    server_config: &str,
    tool: &str,
    parameter: &str,
    count: usize,
) -> anyhow::Result<()> {
    let provider = load_config(server_config, "DISPATCHER_")?;
    let client = JobClient::new(
        config::connectivity(&provider, false)?,
        config::timeouts(&provider)?,
    );
    let job = Job::from_value(tool, serde_json::from_str(parameter)?);

    for i in 0..count {
        let request_id = uuid::Uuid::new_v4();
        tracing::debug!("Submitting {} ({}) to {}", job.tool, request_id, client.dispatcher());

        match client.submit(&job).await {
            Ok(result) => println!("[{}] {} => {}", i + 1, tool, result),
            Err(e) => eprintln!("[{}] {} failed: {}", i + 1, tool, e),
        }
    }

    Ok(())
}

async fn run_code_server(code_server_config: &str) -> anyhow::Result<()> {
    let provider = load_config(code_server_config, "CODE_SERVER_")?;
    let info: ConnectivityInfo = config::connectivity(&provider, false)?;

    let repository = CodeRepository::new();
    repository.publish_catalog(&linked_catalog());

    let listener = tokio::net::TcpListener::bind(info.address()).await?;
    serve_code_repository(listener, repository).await?;

    Ok(())
}

/// Sample workload: Fibonacci of 46 down to 1, all in flight at once.
async fn run_fibonacci_client(server_config: &str) -> anyhow::Result<()> {
    let provider = load_config(server_config, "DISPATCHER_")?;
    let client = Arc::new(JobClient::new(
        config::connectivity(&provider, false)?,
        config::timeouts(&provider)?,
    ));

    let mut jobs = tokio::task::JoinSet::new();
    for n in (1..=46u64).rev() {
        let client = client.clone();
        jobs.spawn(async move {
            let job = Job::from_value(FIBONACCI_LEGACY_ID, serde_json::json!(n));
            (n, client.submit(&job).await)
        });
    }

    while let Some(joined) = jobs.join_next().await {
        match joined? {
            (n, Ok(result)) => println!("Fibonacci Number of {} : {}", n, result),
            (n, Err(e)) => eprintln!("Fibonacci Number of {} failed: {}", n, e),
        }
    }

    Ok(())
}
