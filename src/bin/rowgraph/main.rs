//! Binary entry point for the rowgraph CLI.
#![forbid(unsafe_code)]

mod config;
mod ui;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand, ValueEnum};
use rowgraph::{
    cli::{load_edges, CliError, EdgeLoadConfig},
    rank::{run_import, seed_ranks, write_batch, RankJob, RankOptions, Seed, SinkPolicy},
    storage::{walk, CounterMetrics, GraphConfig, GraphStore, SqliteStore, SqliteTable},
    types::VertexId,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use config::CliConfig;
use ui::{human_duration, Theme, Ui};

const DEFAULT_VERTEX_TABLE: &str = "vertex";
const DEFAULT_EDGE_TABLE: &str = "edge";

#[derive(Parser, Debug)]
#[command(
    name = "rowgraph",
    version,
    about = "Graph storage and rank propagation over sorted tables",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(flatten)]
    open: OpenArgs,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = Theme::Auto,
        help = "Colour theme for text output"
    )]
    theme: Theme,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct OpenArgs {
    #[arg(
        long,
        global = true,
        env = "ROWGRAPH_DB",
        value_name = "PATH",
        help = "SQLite database file"
    )]
    db: Option<PathBuf>,

    #[arg(long, global = true, value_name = "TABLE", help = "Vertex table name")]
    vertex_table: Option<String>,

    #[arg(long, global = true, value_name = "TABLE", help = "Edge table name")]
    edge_table: Option<String>,

    #[arg(
        long,
        global = true,
        env = "ROWGRAPH_CONFIG",
        value_name = "FILE",
        help = "CLI config file (defaults to <config dir>/rowgraph/cli.toml)"
    )]
    config: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
struct RankArgs {
    #[arg(long, help = "Vertex-range partitions mapped in parallel")]
    partitions: Option<usize>,

    #[arg(long, help = "Reducer buckets")]
    reducers: Option<usize>,

    #[arg(long, help = "Damping factor in (0, 1]; omit for plain propagation")]
    damping: Option<f64>,

    #[arg(long, value_enum, help = "What happens to rank held by sinks")]
    sink_policy: Option<SinkPolicyArg>,

    #[arg(long, value_name = "DIR", help = "Directory for per-iteration batch files")]
    scratch_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Import a rank batch file into a vertex table")]
    ImportRanks {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        #[arg(value_name = "VERTEX_TABLE")]
        table: String,
    },
    #[command(about = "Load an edge list (src,label,dst CSV)")]
    Load {
        #[arg(value_name = "EDGES_CSV")]
        input: PathBuf,
        #[arg(long, help = "Seed uniform ranks after loading")]
        seed: bool,
    },
    #[command(about = "Write an initial rank onto every vertex")]
    Seed {
        #[arg(long, help = "Rank to assign (defaults to 1/N)")]
        value: Option<f64>,
    },
    #[command(about = "Compute one iteration and write the batch file without importing")]
    Propagate {
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
        #[command(flatten)]
        rank: RankArgs,
    },
    #[command(about = "Run propagation iterations and import each result")]
    Run {
        #[arg(long, default_value_t = 1)]
        iterations: usize,
        #[command(flatten)]
        rank: RankArgs,
    },
    #[command(about = "Print outgoing edges breadth-first from a vertex")]
    Print {
        #[arg(value_name = "VERTEX")]
        vertex: String,
        #[arg(long, default_value_t = 1)]
        depth: usize,
    },
    #[command(about = "Show a vertex with its properties and rank")]
    Show {
        #[arg(value_name = "VERTEX")]
        vertex: String,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum SinkPolicyArg {
    Drop,
    Redistribute,
}

impl From<SinkPolicyArg> for SinkPolicy {
    fn from(policy: SinkPolicyArg) -> Self {
        match policy {
            SinkPolicyArg::Drop => SinkPolicy::Drop,
            SinkPolicyArg::Redistribute => SinkPolicy::Redistribute,
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };
    install_tracing();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn install_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rowgraph=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

/// Settings resolved from flags, then the config file, then defaults.
struct Session {
    config: CliConfig,
    db: Option<PathBuf>,
    vertex_table: String,
    edge_table: String,
}

impl Session {
    fn resolve(open: OpenArgs) -> Result<Self, CliError> {
        let config =
            CliConfig::load(open.config).map_err(|err| CliError::Config(err.to_string()))?;
        if let Some(path) = config.path() {
            debug!(path = %path.display(), "cli.config");
        }
        let db = open.db.or_else(|| config.db_path().cloned());
        let vertex_table = open
            .vertex_table
            .or_else(|| config.vertex_table().map(str::to_owned))
            .unwrap_or_else(|| DEFAULT_VERTEX_TABLE.to_owned());
        let edge_table = open
            .edge_table
            .or_else(|| config.edge_table().map(str::to_owned))
            .unwrap_or_else(|| DEFAULT_EDGE_TABLE.to_owned());
        Ok(Self {
            config,
            db,
            vertex_table,
            edge_table,
        })
    }

    fn graph_config(&self) -> GraphConfig {
        GraphConfig::new(self.vertex_table.clone(), self.edge_table.clone())
    }

    fn store(&self, create: bool) -> Result<SqliteStore, CliError> {
        let path = self.db.as_ref().ok_or_else(|| {
            CliError::Message(
                "no database given; pass --db, set ROWGRAPH_DB, or set database.path in cli.toml"
                    .into(),
            )
        })?;
        Ok(SqliteStore::new(path).create_if_missing(create))
    }

    fn graph(&self, create: bool) -> Result<GraphStore<SqliteTable>, CliError> {
        let config = self.graph_config();
        config.validate()?;
        Ok(GraphStore::open(&self.store(create)?, &config)?)
    }

    fn rank_options(&self, args: RankArgs) -> RankOptions {
        let defaults = RankOptions::default();
        RankOptions {
            partitions: args
                .partitions
                .or(self.config.partitions())
                .unwrap_or(defaults.partitions),
            reducers: args
                .reducers
                .or(self.config.reducers())
                .unwrap_or(defaults.reducers),
            damping: args.damping.or(self.config.damping()),
            sink_policy: args
                .sink_policy
                .map(SinkPolicy::from)
                .or(self.config.sink_policy())
                .unwrap_or(defaults.sink_policy),
            scratch_dir: args
                .scratch_dir
                .or_else(|| self.config.scratch_dir().cloned())
                .unwrap_or(defaults.scratch_dir),
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut session = Session::resolve(cli.open)?;
    let ui = Ui::new(cli.theme, cli.format == OutputFormat::Json);
    let format = cli.format;

    match cli.command {
        Command::ImportRanks { input, table } => {
            session.vertex_table = table;
            let config = session.graph_config();
            config.validate()?;
            if !input.is_file() {
                return Err(CliError::Message(format!(
                    "input {} is not a readable file",
                    input.display()
                )));
            }
            let store = session.store(false)?;
            let spinner = ui.spinner(format!("importing {}", input.display()));
            let summary = run_import(&store, &config, &input)?;
            let elapsed = spinner.done();
            emit(format, &summary, || {
                ui.ok(&format!(
                    "imported {} ranks into {} in {}",
                    summary.written,
                    session.vertex_table,
                    human_duration(elapsed)
                ))
            })?;
        }
        Command::Load { input, seed } => {
            let graph = session.graph(true)?;
            let spinner = ui.spinner(format!("loading {}", input.display()));
            let summary = load_edges(&graph, &EdgeLoadConfig::new(&input))?;
            let seeded = if seed {
                spinner.phase("seeding");
                Some(seed_ranks(&graph, Seed::Uniform)?)
            } else {
                None
            };
            spinner.done();
            #[derive(Serialize)]
            struct LoadReport {
                edges: u64,
                vertices_created: u64,
                seeded: Option<u64>,
            }
            let report = LoadReport {
                edges: summary.edges,
                vertices_created: summary.vertices_created,
                seeded,
            };
            emit(format, &report, || {
                ui.ok(&format!(
                    "loaded {} edges ({} new vertices)",
                    report.edges, report.vertices_created
                ));
                if let Some(n) = report.seeded {
                    ui.ok(&format!("seeded {n} vertices with uniform rank"));
                }
            })?;
        }
        Command::Seed { value } => {
            let graph = session.graph(false)?;
            let seed = value.map_or(Seed::Uniform, Seed::Value);
            let seeded = seed_ranks(&graph, seed)?;
            emit(format, &serde_json::json!({ "seeded": seeded }), || {
                ui.ok(&format!("seeded {seeded} vertices"))
            })?;
        }
        Command::Propagate { out, rank } => {
            let store = session.store(false)?;
            let options = session.rank_options(rank);
            let job = RankJob::new(&store, session.graph_config(), options)?;
            let spinner = ui.spinner("propagating".into());
            let propagation = job.propagate()?;
            write_batch(&out, &propagation.updates)?;
            spinner.done();
            emit(format, &propagation.stats, || {
                print_stats(&ui, "Propagation", &propagation.stats);
                ui.ok(&format!(
                    "wrote {} updates to {}",
                    propagation.stats.updates,
                    out.display()
                ));
            })?;
        }
        Command::Run { iterations, rank } => {
            if iterations == 0 {
                return Err(CliError::Message("--iterations must be at least 1".into()));
            }
            let store = session.store(false)?;
            let options = session.rank_options(rank);
            let metrics = Arc::new(CounterMetrics::default());
            let job = RankJob::new(&store, session.graph_config(), options)?
                .with_metrics(metrics.clone());
            let mut all = Vec::with_capacity(iterations);
            for k in 1..=iterations {
                let spinner = ui.spinner(format!("iteration {k}/{iterations}"));
                all.push(job.run_iteration(k)?);
                spinner.done();
            }
            #[derive(Serialize)]
            struct RunReport<'a> {
                iterations: &'a [rowgraph::rank::IterationStats],
                metrics: rowgraph::storage::MetricsSnapshot,
            }
            let report = RunReport {
                iterations: &all,
                metrics: metrics.snapshot(),
            };
            emit(format, &report, || {
                for stats in &all {
                    print_stats(&ui, &format!("Iteration {}", stats.iteration), stats);
                }
                ui.ok(&format!(
                    "ran {iterations} iterations, {} ranks written",
                    report.metrics.ranks_written
                ));
            })?;
        }
        Command::Print { vertex, depth } => {
            let graph = session.graph(false)?;
            let steps = walk(&graph, &VertexId::from(vertex.as_str()), depth)?;
            #[derive(Serialize)]
            struct Step {
                depth: usize,
                source: String,
                label: String,
                dest: String,
            }
            let rows: Vec<Step> = steps
                .iter()
                .map(|s| Step {
                    depth: s.depth,
                    source: s.edge.source.to_string(),
                    label: s.edge.label.clone(),
                    dest: s.edge.dest.to_string(),
                })
                .collect();
            emit(format, &rows, || {
                let hops: Vec<String> = rows
                    .iter()
                    .map(|s| {
                        format!(
                            "{}{} -[{}]-> {}",
                            "  ".repeat(s.depth.saturating_sub(1)),
                            s.source,
                            s.label,
                            s.dest
                        )
                    })
                    .collect();
                ui.walk(&format!("Edges from {vertex}"), &hops)
            })?;
        }
        Command::Show { vertex } => {
            let graph = session.graph(false)?;
            let id = VertexId::from(vertex.as_str());
            let found = graph
                .get_vertex(&id)?
                .ok_or_else(|| CliError::Message(format!("vertex '{vertex}' not found")))?;
            let degree = graph
                .outgoing_edge_ids(&id)?
                .try_fold(0u64, |n, r| r.map(|_| n + 1))?;
            #[derive(Serialize)]
            struct ShowReport<'a> {
                #[serde(flatten)]
                vertex: &'a rowgraph::storage::Vertex,
                out_degree: u64,
            }
            let report = ShowReport {
                vertex: &found,
                out_degree: degree,
            };
            emit(format, &report, || {
                let mut rows: Vec<(&str, String)> = vec![("out-degree", degree.to_string())];
                rows.extend(found.props.iter().map(|(k, v)| (k.as_str(), v.to_string())));
                ui.stats(&format!("Vertex {vertex}"), &rows);
            })?;
        }
    }
    Ok(())
}

fn print_stats(ui: &Ui, title: &str, stats: &rowgraph::rank::IterationStats) {
    ui.stats(
        title,
        &[
            ("vertices", stats.vertices.to_string()),
            ("unseeded", stats.unseeded.to_string()),
            ("sinks", stats.sinks.to_string()),
            ("contributions", stats.contributions.to_string()),
            ("updates", stats.updates.to_string()),
            ("mass before", format!("{:.6}", stats.mass_before)),
            ("mass after", format!("{:.6}", stats.mass_after)),
            ("elapsed", human_duration(stats.elapsed)),
        ],
    );
    if stats.vertices > 0 && stats.unseeded == stats.vertices {
        ui.warn("no vertex carries a rank; run `rowgraph seed` first");
    }
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), CliError>
where
    T: Serialize,
    F: FnOnce(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)
                .map_err(|err| CliError::Message(format!("failed to encode output: {err}")))?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}
