use anyhow::Result;
use clap::{Parser, Subcommand};
use distcalc::config::Settings;
use distcalc::coordinator::Coordinator;
use distcalc::runtime::{Calculator, SharedExecTimes};
use distcalc::storage::{InMemoryPersistence, RedisPersistence, TaskPersistence};
use distcalc::worker::CalculationServer;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// YAML settings file, applied before environment overrides
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one expression locally and print the execution log
    Eval {
        expression: String,

        /// Evaluator pool size
        #[arg(long, short)]
        workers: Option<usize>,

        /// Simulated milliseconds per `+`
        #[arg(long)]
        time_add: Option<i64>,
        #[arg(long)]
        time_subtract: Option<i64>,
        #[arg(long)]
        time_multiply: Option<i64>,
        #[arg(long)]
        time_divide: Option<i64>,
    },

    /// Run a coordinator and calculation servers in one process
    Cluster {
        /// Number of calculation servers
        #[arg(long, short, default_value_t = 2)]
        servers: usize,

        /// Evaluator pool size per server
        #[arg(long, short)]
        workers: Option<usize>,

        /// Redis connection URL for durable task storage
        #[arg(long)]
        redis: Option<String>,

        #[arg(required = true)]
        expressions: Vec<String>,
    },
}

fn load_settings(path: Option<&PathBuf>) -> Result<Settings> {
    match path {
        Some(path) => {
            let mut settings = Settings::from_yaml_file(path)?;
            settings.apply_env(|key| std::env::var(key).ok())?;
            Ok(settings)
        }
        None => Ok(Settings::from_env()?),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings(cli.config.as_ref())?;

    match cli.command {
        Commands::Eval {
            expression,
            workers,
            time_add,
            time_subtract,
            time_multiply,
            time_divide,
        } => {
            if let Some(w) = workers {
                settings.worker.pool_size = w;
            }
            for (symbol, millis) in [("+", time_add), ("-", time_subtract), ("*", time_multiply), ("/", time_divide)] {
                if let Some(millis) = millis {
                    settings.coordinator.timings.insert(symbol.to_string(), millis);
                }
            }
            settings.validate()?;

            let timings = settings.coordinator.exec_times()?;
            let calculator = Calculator::new(settings.worker.pool_size, SharedExecTimes::new(timings));
            let calculation = calculator.calculate_expression(&expression).await?;
            println!("{}", calculation.answer);
            println!("{}", calculation.log);
        }

        Commands::Cluster {
            servers,
            workers,
            redis,
            expressions,
        } => {
            if let Some(w) = workers {
                settings.worker.pool_size = w;
            }
            if redis.is_some() {
                settings.coordinator.redis_url = redis;
            }
            settings.validate()?;
            run_cluster(&settings, servers, &expressions).await?;
        }
    }

    Ok(())
}

async fn run_cluster(settings: &Settings, servers: usize, expressions: &[String]) -> Result<()> {
    // 1. Coordinator
    let persistence: Arc<dyn TaskPersistence> = match &settings.coordinator.redis_url {
        Some(url) => {
            info!(%url, "Using Redis persistence");
            Arc::new(RedisPersistence::open(url, settings.coordinator.redis_key.clone())?)
        }
        None => Arc::new(InMemoryPersistence::new()),
    };
    let coordinator = Arc::new(Coordinator::open(persistence, &settings.coordinator).await?);
    let reclaimer = coordinator.spawn_reclaimer(settings.coordinator.reclaim_interval());

    // 2. Calculation servers
    let mut handles = Vec::with_capacity(servers);
    for i in 0..servers {
        let mut config = settings.worker.clone();
        config.name = format!("{}-{}", settings.worker.name, i);
        let exec_times = SharedExecTimes::new(settings.coordinator.exec_times()?);
        let server = CalculationServer::new(coordinator.clone(), config, exec_times)?;
        handles.push(tokio::spawn(async move { server.run().await }));
    }

    // 3. Submit and wait
    let mut ids = Vec::with_capacity(expressions.len());
    for expression in expressions {
        ids.push(coordinator.submit(expression, 0).await?);
    }

    loop {
        let done = ids
            .iter()
            .filter_map(|id| coordinator.get(*id).ok())
            .all(|record| record.status.is_terminal());
        if done {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    for id in ids {
        let record = coordinator.get(id)?;
        println!("{}", serde_json::to_string_pretty(&record)?);
    }
    for power in coordinator.computing_powers() {
        println!("{}", serde_json::to_string(&power)?);
    }

    for handle in handles {
        handle.abort();
    }
    reclaimer.abort();
    Ok(())
}
