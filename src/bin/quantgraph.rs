//! `quantgraph` command-line tool
//!
//! Inspect, trace and quantize models stored as JSON.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

use quantgraph::config::QuantConfig;
use quantgraph::graph::{get_graph, Device};
use quantgraph::io::{
    check_model, load_model, save_model, validate_model_with_input, ModelInfo,
};
use quantgraph::model::{zoo, Model};
use quantgraph::quant::{quantize_node, quantize_with_options, strategies, Representation};
use quantgraph::tensor::{format_shape, parse_shape};

fn setup_logging(json: bool) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    if json {
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_level(true)
            .with_target(true)
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber).context("setting up logging")?;
    } else {
        let subscriber = tracing_subscriber::fmt()
            .compact()
            .with_level(true)
            .with_target(false)
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber).context("setting up logging")?;
    }
    Ok(())
}

/// Comma separated input size, e.g. `1,1,28,28`
#[derive(Debug, Clone)]
struct InputSize(Vec<usize>);

impl FromStr for InputSize {
    type Err = quantgraph::OptimizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_shape(s).map(InputSize)
    }
}

#[derive(Parser)]
#[command(name = "quantgraph", version, about = "Trace and quantize layered models")]
struct Cli {
    /// Should the logs be printed in json format or not
    #[arg(long, env = "QUANTGRAPH_LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ModelSource {
    /// Model file (JSON)
    #[arg(short = 'm', long, required_unless_present = "builtin", conflicts_with = "builtin")]
    model: Option<PathBuf>,

    /// Reference model instead of a file (lenet5, mlp)
    #[arg(long)]
    builtin: Option<String>,

    /// Seed for reference model initialisation
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

impl ModelSource {
    fn load(&self) -> Result<Model> {
        match (&self.model, &self.builtin) {
            (Some(path), _) => {
                load_model(path).with_context(|| format!("loading {}", path.display()))
            }
            (None, Some(name)) => Ok(zoo::by_name(name, self.seed)?),
            (None, None) => anyhow::bail!("either --model or --builtin is required"),
        }
    }
}

#[derive(Args)]
struct QuantArgs {
    /// JSON configuration file; flags override its values
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Strategy name (see `quantgraph strategies`)
    #[arg(short = 's', long)]
    strategy: Option<String>,

    /// Representation kind (int, fxp)
    #[arg(short = 'r', long = "repr")]
    representation: Option<Representation>,

    /// Bit width
    #[arg(short = 'b', long)]
    bits: Option<u8>,

    /// Leave a module path (and everything under it) unquantized
    #[arg(short = 'x', long)]
    exclude: Vec<String>,
}

#[derive(Args)]
struct TraceArgs {
    /// Input size including the batch dimension
    #[arg(long)]
    input_size: Option<InputSize>,

    /// Maximum trace depth
    #[arg(long)]
    depth: Option<usize>,

    /// Trace device
    #[arg(long)]
    device: Option<Device>,
}

#[derive(Subcommand)]
enum Command {
    /// List available quantization strategies
    Strategies,
    /// Trace a model and print its layer table
    Summary {
        #[command(flatten)]
        source: ModelSource,
        #[command(flatten)]
        trace: TraceArgs,
    },
    /// Quantize every eligible unit of a model
    Quantize {
        #[command(flatten)]
        source: ModelSource,
        #[command(flatten)]
        quant: QuantArgs,
        /// Where to write the quantized model
        #[arg(short = 'o', long)]
        output: PathBuf,
    },
    /// Quantize a single traced node
    QuantizeNode {
        #[command(flatten)]
        source: ModelSource,
        #[command(flatten)]
        quant: QuantArgs,
        #[command(flatten)]
        trace: TraceArgs,
        /// Node identifier (module path, e.g. features.0)
        #[arg(short = 'n', long)]
        node: String,
        /// Where to write the model
        #[arg(short = 'o', long)]
        output: PathBuf,
    },
    /// Print model metadata
    Info {
        #[command(flatten)]
        source: ModelSource,
    },
    /// Check a model file for structural problems
    Validate {
        #[command(flatten)]
        source: ModelSource,
        /// Also check that this input size flows through the model
        #[arg(long)]
        input_size: Option<InputSize>,
    },
    /// Write a reference model to a JSON file
    Export {
        /// Reference model name (lenet5, mlp)
        #[arg(long, default_value = "lenet5")]
        builtin: String,
        /// Initialisation seed
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Output file
        #[arg(short = 'o', long)]
        output: PathBuf,
    },
}

/// Merge the configuration file with command-line overrides
fn resolve_config(quant: Option<&QuantArgs>, trace: Option<&TraceArgs>) -> Result<QuantConfig> {
    let path = quant.and_then(|q| q.config.as_ref());
    let mut config = match path {
        Some(path) => QuantConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => QuantConfig::default(),
    };

    if let Some(q) = quant {
        if let Some(strategy) = &q.strategy {
            config.strategy = strategy.clone();
        }
        if let Some(repr) = q.representation {
            config.representation = repr;
        }
        if let Some(bits) = q.bits {
            config.bits = bits;
        }
        config.exclude.extend(q.exclude.iter().cloned());
    }
    if let Some(t) = trace {
        if let Some(size) = &t.input_size {
            config.input_size = size.0.clone();
        }
        if let Some(depth) = t.depth {
            config.depth = depth;
        }
        if let Some(device) = t.device {
            config.device = device;
        }
    }

    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.log_json)?;

    match cli.command {
        Command::Strategies => {
            for s in strategies() {
                println!("{:<24}{}", s.name(), s.description());
            }
        }
        Command::Summary { source, trace } => {
            let config = resolve_config(None, Some(&trace))?;
            let mut model = source.load()?;
            let graph = get_graph(&mut model, &config.input_size, config.depth, config.device)?;
            println!("{}", graph.summary());
        }
        Command::Quantize {
            source,
            quant,
            output,
        } => {
            let config = resolve_config(Some(&quant), None)?;
            let mut model = source.load()?;
            check_model(&model)?;

            let report = quantize_with_options(&mut model, &config.quantize_options())?;
            save_model(&model, &output)
                .with_context(|| format!("saving {}", output.display()))?;

            info!(output = %output.display(), "{}", report);
        }
        Command::QuantizeNode {
            source,
            quant,
            trace,
            node,
            output,
        } => {
            let config = resolve_config(Some(&quant), Some(&trace))?;
            let mut model = source.load()?;
            check_model(&model)?;

            {
                let mut graph =
                    get_graph(&mut model, &config.input_size, config.depth, config.device)?;
                let unit = quantize_node(
                    &node,
                    &mut graph,
                    &config.strategy,
                    config.representation,
                    config.bits,
                )?;
                info!(node = %node, kind = unit.kind(), "node substituted");
                println!("{}", graph.summary());
            }

            save_model(&model, &output)
                .with_context(|| format!("saving {}", output.display()))?;
        }
        Command::Info { source } => {
            let model = source.load()?;
            let info = ModelInfo::from_model(&model);
            println!("name:            {}", info.name);
            println!("units:           {}", info.unit_count);
            println!("containers:      {}", info.container_count);
            println!("max depth:       {}", info.max_depth);
            println!("parameters:      {}", info.param_count);
            println!("quantized units: {}", info.quantized_units);
            println!("storage bytes:   {}", info.storage_bytes);
            for (kind, count) in &info.kinds {
                println!("  {:<14} {}", kind, count);
            }
        }
        Command::Validate { source, input_size } => {
            let model = source.load()?;
            let size = input_size.map(|s| s.0);
            let result = match &size {
                Some(size) => validate_model_with_input(&model, size),
                None => quantgraph::io::validate_model(&model),
            };

            for warning in &result.warnings {
                println!("warning: {}", warning);
            }
            for error in &result.errors {
                println!("error: {}", error);
            }
            if !result.is_valid {
                anyhow::bail!("model '{}' is invalid", model.name);
            }
            match size {
                Some(size) => println!(
                    "model '{}' is valid for input {}",
                    model.name,
                    format_shape(&size)
                ),
                None => println!("model '{}' is valid", model.name),
            }
        }
        Command::Export {
            builtin,
            seed,
            output,
        } => {
            let model = zoo::by_name(&builtin, seed)?;
            save_model(&model, &output)
                .with_context(|| format!("saving {}", output.display()))?;
            info!(model = %model.name, output = %output.display(), "exported reference model");
        }
    }

    Ok(())
}
