//! PrismDB Mosaic - command line entry point
//!
//! Compresses a text column (one value per line, `nil` for a missing value),
//! reports the block layout of a heap file, compares strategy combinations,
//! and runs range or theta selections.

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;
use tracing_subscriber::EnvFilter;

use prism_mosaic::{
    CompressionStats, MosaicCompressor, MosaicConfig, MosaicHeap, MosaicValue, PhysicalType,
    RangePredicate, StrategyFilter, ThetaOp,
};

#[derive(Parser)]
#[command(name = "prism-mosaic")]
#[command(about = "Mosaic lightweight column compression")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compress a text column into a heap file
    Compress {
        #[command(flatten)]
        column: ColumnArgs,

        /// Output heap file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Compress a text column under every strategy combination and compare
    Analyse {
        #[command(flatten)]
        column: ColumnArgs,
    },
    /// Print the block layout of a heap file
    Layout {
        /// Heap file
        heap: PathBuf,

        /// Element type of the heap
        #[arg(short = 't', long = "type", default_value = "int")]
        value_type: String,
    },
    /// Compress a text column and print the rows matching a predicate
    Select {
        #[command(flatten)]
        column: ColumnArgs,

        /// Theta comparison such as ">=" (uses --value)
        #[arg(long, requires = "value", conflicts_with_all = ["low", "high"])]
        op: Option<String>,

        /// Operand of the theta comparison
        #[arg(long)]
        value: Option<String>,

        /// Lower bound of the range (omit for unbounded)
        #[arg(long)]
        low: Option<String>,

        /// Upper bound of the range (omit for unbounded)
        #[arg(long)]
        high: Option<String>,

        /// Exclude the lower bound
        #[arg(long)]
        low_exclusive: bool,

        /// Include the upper bound
        #[arg(long)]
        high_inclusive: bool,

        /// Select the rows outside the range
        #[arg(long)]
        anti: bool,
    },
}

#[derive(Args)]
struct ColumnArgs {
    /// Text file with one value per line
    input: PathBuf,

    /// Element type: tinyint, smallint, int, bigint, real, double
    #[arg(short = 't', long = "type", default_value = "int")]
    value_type: String,

    /// Comma separated strategies (default: all)
    #[arg(short, long)]
    strategies: Option<String>,

    /// Treat `nil` as an ordinary value instead of a missing one
    #[arg(long)]
    not_null: bool,
}

impl ColumnArgs {
    fn physical_type(&self) -> anyhow::Result<PhysicalType> {
        parse_type(&self.value_type)
    }

    fn compressor(&self, config: &MosaicConfig) -> anyhow::Result<MosaicCompressor> {
        let filter = match &self.strategies {
            Some(list) => StrategyFilter::parse(list)?,
            None => config.strategies,
        };
        Ok(MosaicCompressor::with_settings(filter, config.max_block_count))
    }
}

fn parse_type(name: &str) -> anyhow::Result<PhysicalType> {
    PhysicalType::from_name(name).ok_or_else(|| anyhow!("unsupported column type '{}'", name))
}

/// Runs `$body` with `$t` bound to the Rust type of `$ptype`
macro_rules! with_value_type {
    ($ptype:expr, $t:ident => $body:expr) => {
        match $ptype {
            PhysicalType::Int8 => {
                type $t = i8;
                $body
            }
            PhysicalType::Int16 => {
                type $t = i16;
                $body
            }
            PhysicalType::Int32 => {
                type $t = i32;
                $body
            }
            PhysicalType::Int64 => {
                type $t = i64;
                $body
            }
            PhysicalType::Float => {
                type $t = f32;
                $body
            }
            PhysicalType::Double => {
                type $t = f64;
                $body
            }
        }
    };
}

fn parse_value<T>(text: &str) -> anyhow::Result<T>
where
    T: MosaicValue + FromStr,
    T::Err: Display,
{
    let text = text.trim();
    if text.eq_ignore_ascii_case("nil") || text.eq_ignore_ascii_case("null") {
        return Ok(T::NIL);
    }
    text.parse::<T>()
        .map_err(|e| anyhow!("invalid {} value '{}': {}", T::PHYSICAL_TYPE, text, e))
}

fn read_column<T>(path: &Path) -> anyhow::Result<Vec<T>>
where
    T: MosaicValue + FromStr,
    T::Err: Display,
{
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| parse_value::<T>(line).with_context(|| format!("line {}", n + 1)))
        .collect()
}

fn compress<T>(column: &ColumnArgs, config: &MosaicConfig) -> anyhow::Result<MosaicHeap>
where
    T: MosaicValue + FromStr,
    T::Err: Display,
{
    let values = read_column::<T>(&column.input)?;
    let heap = column
        .compressor(config)?
        .compress(&values, !column.not_null)?;
    info!(
        rows = heap.len(),
        bytes = heap.size_bytes(),
        ratio = heap.compression_ratio(),
        "compressed {:?}",
        column.input
    );
    Ok(heap)
}

fn run_compress<T>(column: &ColumnArgs, output: &Path, config: &MosaicConfig) -> anyhow::Result<()>
where
    T: MosaicValue + FromStr,
    T::Err: Display,
{
    let heap = compress::<T>(column, config)?;
    prism_mosaic::storage::mosaic::write_heap(output, &heap)?;
    println!(
        "{} rows -> {} bytes in {} blocks (ratio {:.2})",
        heap.len(),
        heap.size_bytes(),
        heap.stats().total_blocks(),
        heap.compression_ratio()
    );
    Ok(())
}

fn run_analyse<T>(column: &ColumnArgs, config: &MosaicConfig) -> anyhow::Result<()>
where
    T: MosaicValue + FromStr,
    T::Err: Display,
{
    let values = read_column::<T>(&column.input)?;
    let allowed = column.compressor(config)?.filter();
    let filters: Vec<StrategyFilter> = StrategyFilter::combinations()
        .into_iter()
        .filter(|f| f.tags().all(|t| allowed.contains(t)))
        .collect();
    let compressor = MosaicCompressor::with_settings(allowed, config.max_block_count);
    let report = compressor.analyse(&values, !column.not_null, &filters)?;

    println!("{:<44} {:>10} {:>8} {:>10}", "strategies", "bytes", "ratio", "ms");
    for entry in &report {
        println!(
            "{:<44} {:>10} {:>8.2} {:>10.3}",
            entry.used().to_string(),
            entry.stats.heap_bytes,
            entry.stats.compression_ratio(),
            entry.elapsed.as_secs_f64() * 1000.0
        );
    }
    println!("{} rows, {} raw bytes", values.len(), values.len() * T::WIDTH);
    Ok(())
}

fn run_layout<T: MosaicValue>(path: &Path) -> anyhow::Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {:?}", path))?;
    let heap = MosaicHeap::from_bytes::<T>(bytes)?;
    println!("{:<10} {:>8} {:>10} {:>10}  properties", "strategy", "count", "input", "output");
    for block in heap.layout::<T>()? {
        println!(
            "{:<10} {:>8} {:>10} {:>10}  {}",
            block.tag.name(),
            block.count,
            block.input_bytes,
            block.output_bytes,
            block.properties
        );
    }
    println!(
        "{} rows, {} bytes, ratio {:.2}",
        heap.len(),
        heap.size_bytes(),
        heap.compression_ratio()
    );
    Ok(())
}

struct SelectArgs<'a> {
    op: Option<&'a str>,
    value: Option<&'a str>,
    low: Option<&'a str>,
    high: Option<&'a str>,
    low_inclusive: bool,
    high_inclusive: bool,
    anti: bool,
}

fn run_select<T>(column: &ColumnArgs, args: &SelectArgs<'_>, config: &MosaicConfig) -> anyhow::Result<()>
where
    T: MosaicValue + FromStr,
    T::Err: Display,
{
    let heap = compress::<T>(column, config)?;
    let nullable = !column.not_null;
    let bound = |text: Option<&str>| text.map(parse_value::<T>).transpose();

    let predicate = match (args.op, args.value) {
        (Some(op), Some(value)) => {
            let op: ThetaOp = op.parse()?;
            RangePredicate::theta(op, parse_value::<T>(value)?, nullable)
        }
        (Some(_), None) => bail!("--op needs --value"),
        _ => RangePredicate::new(
            bound(args.low)?,
            bound(args.high)?,
            args.low_inclusive,
            args.high_inclusive,
            args.anti,
            nullable,
        ),
    };

    let rows = prism_mosaic::select_range(&heap, &predicate)?;
    println!("{} rows match {}", rows.len(), predicate);
    for row in rows {
        println!("{}", row);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match &cli.config {
        Some(path) => MosaicConfig::from_file(path)?,
        None => MosaicConfig::default(),
    };

    match &cli.command {
        Command::Compress { column, output } => {
            with_value_type!(column.physical_type()?, V => run_compress::<V>(column, output, &config))
        }
        Command::Analyse { column } => {
            with_value_type!(column.physical_type()?, V => run_analyse::<V>(column, &config))
        }
        Command::Layout { heap, value_type } => {
            with_value_type!(parse_type(value_type)?, V => run_layout::<V>(heap))
        }
        Command::Select {
            column,
            op,
            value,
            low,
            high,
            low_exclusive,
            high_inclusive,
            anti,
        } => {
            let args = SelectArgs {
                op: op.as_deref(),
                value: value.as_deref(),
                low: low.as_deref(),
                high: high.as_deref(),
                low_inclusive: !low_exclusive,
                high_inclusive: *high_inclusive,
                anti: *anti,
            };
            with_value_type!(column.physical_type()?, V => run_select::<V>(column, &args, &config))
        }
    }
}
