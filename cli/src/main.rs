use std::{fs::File, path::PathBuf};

use anyhow::{anyhow, Result};
use cache_sim::{
    cache::ReplacementPolicy,
    geometry::CacheGeometry,
    sim::{SimConfig, SimOutput, Simulator, DEMO_WORKLOAD},
    trace::Trace,
};
use clap::{Args, Parser, Subcommand};

#[cfg(feature = "stat")]
use terminal_size::terminal_size;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// simulate a cache over the given word addresses
    Run(RunArgs),
    /// simulate the example workload showing locality
    Demo(DemoArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    delegate: CommonArgs,
    /// Size of the cache in words
    #[arg(long)]
    cache_size: usize,
    /// Number of blocks per set
    #[arg(long, default_value_t = 1)]
    num_blocks_per_set: usize,
    /// Number of words per block
    #[arg(long, default_value_t = 1)]
    num_words_per_block: usize,
    /// Number of bits in each word address (widened to fit the largest address)
    #[arg(long, default_value_t = 1)]
    num_addr_bits: u32,
    /// Replacement policy (lru or mru, case-insensitive)
    #[arg(long, default_value_t = ReplacementPolicy::Lru)]
    replacement_policy: ReplacementPolicy,
    /// Number of blocks per set of an L2 cache (no L2 if omitted)
    #[arg(long)]
    l2_num_blocks_per_set: Option<usize>,
    /// Base-10 word addresses
    #[arg(long, num_args = 1.., conflicts_with = "trace")]
    word_addrs: Vec<u32>,
    /// File path to a JSON trace (`{"word_addrs": [...]}`)
    #[arg(long)]
    trace: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct DemoArgs {
    #[command(flatten)]
    delegate: CommonArgs,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    match args.command {
        Command::Run(RunArgs {
            delegate: CommonArgs { verbose },
            cache_size,
            num_blocks_per_set,
            num_words_per_block,
            num_addr_bits,
            replacement_policy,
            l2_num_blocks_per_set,
            word_addrs,
            trace,
        }) => {
            init_logger(verbose);
            let word_addrs = match trace {
                Some(path) => read_trace(path)?.word_addrs,
                None => word_addrs,
            };
            if word_addrs.is_empty() {
                return Err(anyhow!("no word addresses given. pass --word-addrs or --trace."));
            }
            let config = SimConfig {
                geometry: CacheGeometry {
                    cache_size,
                    num_blocks_per_set,
                    num_words_per_block,
                    num_addr_bits,
                },
                policy: replacement_policy,
                l2_num_blocks_per_set,
            };
            simulate(config, &word_addrs)
        }
        Command::Demo(DemoArgs {
            delegate: CommonArgs { verbose },
        }) => {
            init_logger(verbose);
            simulate(SimConfig::demo(), &DEMO_WORKLOAD)
        }
    }
}

fn init_logger(verbose: bool) {
    if verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else {
        env_logger::init();
    }
}

fn read_trace(path: PathBuf) -> Result<Trace> {
    let file = File::open(&path)?;
    let trace = Trace::deser(file)?;
    log::info!("loaded {} reference(s) from {}", trace.word_addrs.len(), path.display());
    Ok(trace)
}

fn simulate(config: SimConfig, word_addrs: &[u32]) -> Result<()> {
    let sim = Simulator::new(config)?;
    let output = sim.run(word_addrs);
    output_stat(&output);
    Ok(())
}

#[cfg(not(feature = "stat"))]
fn output_stat(output: &SimOutput) {
    println!("hits: {}, misses: {}", output.hit_count(), output.miss_count());
}

#[cfg(feature = "stat")]
fn output_stat(output: &SimOutput) {
    let max_width = get_terminal_width().unwrap_or(120) as usize;
    println!("{}", output.collect_stat().view(max_width));
}

#[cfg(feature = "stat")]
fn get_terminal_width() -> Option<u16> {
    terminal_size().map(|(w, _)| w.0.saturating_sub(20))
}
