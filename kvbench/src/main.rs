use std::path::PathBuf;

use clap::Parser;
use kvbench_lib::{Config, RequestTemplate, Target, run_benchmark};

pub mod resp;
pub mod suite;
pub mod telemetry;

#[cfg(target_family = "unix")]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

/// CLI arguments for configuring benchmark behavior.
#[derive(Debug, Clone, Parser)]
#[command(name = "kvbench")]
#[command(bin_name = "kvbench")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// server hostname
    #[arg(long, short = 'H', value_name = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// server port
    #[arg(long, short = 'p', value_name = "PORT", default_value_t = 6379)]
    pub port: u16,

    /// server unix domain socket (takes precedence over host and port)
    #[arg(long, short = 's', value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// number of parallel connections
    #[arg(long, short = 'c', value_name = "N", default_value_t = 50)]
    pub clients: usize,

    /// total number of requests per benchmark
    #[arg(long, short = 'n', value_name = "N", default_value_t = 10_000)]
    pub requests: usize,

    /// payload size in bytes for SET/GET/LPUSH values
    #[arg(long, short = 'd', value_name = "BYTES", default_value_t = 3)]
    pub data_size: usize,

    /// reuse connections; disable to open one connection per request
    #[arg(
        long,
        short = 'k',
        value_name = "BOOL",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub keep_alive: bool,

    /// randomize keys over this many distinct values (0 = no randomization)
    #[arg(long, short = 'r', value_name = "KEYSPACE", default_value_t = 0)]
    pub random_keyspace: u64,

    /// only show the requests-per-second line per benchmark
    #[arg(long, short = 'q', default_value_t = false)]
    pub quiet: bool,

    /// run the benchmarks forever
    #[arg(long = "loop", short = 'l', default_value_t = false)]
    pub loop_forever: bool,

    /// print each report as a JSON line instead of the human format
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// debug logging as default instead of Info; use RUST_LOG env for more options
    #[arg(long, short = 'v', default_value_t = false)]
    pub verbose: bool,

    /// enable pretty logging (format for humans)
    #[arg(long, default_value_t = false)]
    pub pretty: bool,

    /// write the tracing output to the provided (log) file instead of stderr
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// benchmark this command instead of the default suite (key randomization
    /// applies to arguments of the form prefix:rand:000000000000)
    #[arg(value_name = "COMMAND", trailing_var_arg = true)]
    pub command: Vec<String>,
}

fn main() {
    let args = Args::parse();

    if let Err(err) = telemetry::init_tracing(&args) {
        eprintln!("🚩 exit with error: {err}");
        std::process::exit(1);
    }

    if let Err(err) = run(args) {
        eprintln!("🚩 exit with error: {err}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let cfg = config_from(&args);
    cfg.validate()?;

    if !cfg.keep_alive {
        tracing::warn!("keep alive disabled: every request pays a fresh connection setup");
    }

    let benchmarks = if args.command.is_empty() {
        suite::default_suite(cfg.payload_size)
    } else {
        vec![suite::custom(&args.command)]
    };

    tracing::info!(
        server = %cfg.target,
        clients = %cfg.concurrency,
        requests = %cfg.requests,
        "starting benchmark run"
    );

    loop {
        for bench in &benchmarks {
            let template = template_for(bench, &cfg)?;
            let parser_factory: kvbench_lib::ParserFactory =
                Box::new(|| Box::new(resp::RespParser::default()));
            let report = run_benchmark(bench.title.as_str(), &cfg, template, parser_factory)?;

            if args.json {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                report.print(cfg.quiet);
            }
        }
        if !cfg.loop_forever {
            break;
        }
    }
    Ok(())
}

fn config_from(args: &Args) -> Config {
    Config {
        concurrency: args.clients,
        requests: args.requests,
        payload_size: args.data_size,
        keep_alive: args.keep_alive,
        random_keyspace: args.random_keyspace,
        quiet: args.quiet,
        loop_forever: args.loop_forever,
        target: match &args.socket {
            Some(path) => Target::Unix { path: path.clone() },
            None => Target::Tcp {
                host: args.host.clone(),
                port: args.port,
            },
        },
    }
}

/// Attach randomization offsets when a keyspace is configured; a template
/// without offsets is sent verbatim.
fn template_for(bench: &suite::Benchmark, cfg: &Config) -> kvbench_lib::Result<RequestTemplate> {
    if cfg.random_keyspace > 0 {
        RequestTemplate::with_rand_offsets(
            bench.request.clone(),
            resp::rand_offsets(&bench.request),
        )
    } else {
        Ok(RequestTemplate::new(bench.request.clone()))
    }
}
