use anyhow::{anyhow, bail, Result};
use clap::{builder::PossibleValue, Parser, ValueEnum};
use format_num::NumberFormat;
use libfmidx::{
    alphabet::Alphabet,
    bwt_index::BwtIndex,
    encseq::EncodedSequence,
    project::{write_project, SuffixArrayProject},
    types::{FmIndexOptions, FromUsize, Int, ReadMode, SuffixerOptions},
    util::read_text_length,
};
use log::{debug, info};
use std::{
    ffi::OsStr,
    fmt::Debug,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
    time::Instant,
};

// --------------------------------------------------
#[derive(Parser, Debug)]
#[command(arg_required_else_help = true, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Number of threads
    #[arg(short, long, value_name = "THREADS")]
    pub threads: Option<usize>,

    /// Log level
    #[arg(short, long)]
    pub log: Option<LogLevel>,

    /// Log file
    #[arg(long)]
    pub log_file: Option<String>,
}

#[derive(Parser, Debug)]
pub enum Command {
    /// Create suffix-array project from a sequence file
    Create(CreateArgs),

    /// Build FM-index from one or more projects
    Index(IndexArgs),

    /// Count occurrences of sequences in an index
    Count(CountArgs),

    /// Locate sequences in an index
    Locate(LocateArgs),

    /// Matching statistics of queries against a reverse index
    Mstats(MstatsArgs),

    /// Check an index against its project
    Verify(VerifyArgs),

    /// Summarize index
    Summarize(SummarizeArgs),
}

#[derive(Debug, Parser)]
#[command(about, alias = "cr")]
pub struct CreateArgs {
    /// Input file
    #[arg(value_name = "INPUT")]
    pub input: String,

    /// Output file
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<String>,

    /// Bucket prefix length
    #[arg(short('q'), long, value_name = "PREFIX_LEN")]
    pub prefix_len: Option<usize>,

    /// Number of parts the buckets are sorted in
    #[arg(short, long, value_name = "NUM_PARTS", default_value = "1")]
    pub num_parts: usize,

    /// Memory budget for one part in bytes
    #[arg(short, long, value_name = "BYTES")]
    pub max_memory: Option<usize>,

    /// Index the reversed sequence
    #[arg(short, long)]
    pub reverse: bool,

    /// Alphabet characters, default nucleotides
    #[arg(short, long, value_name = "CHARS")]
    pub alphabet: Option<String>,

    /// Characters treated as wildcards with a custom alphabet
    #[arg(short, long, value_name = "CHARS", default_value = "")]
    pub wildcards: String,
}

#[derive(Debug, Parser)]
#[command(about, alias = "ix")]
pub struct IndexArgs {
    /// Project file(s); several are merged
    #[arg(value_name = "PROJECT", num_args(1..), required = true)]
    pub projects: Vec<String>,

    /// Output file
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<String>,

    /// Log2 of the block size
    #[arg(short('b'), long, value_name = "LOG2", default_value = "7")]
    pub log2_block_size: u32,

    /// Log2 of the superblock size
    #[arg(short('s'), long, value_name = "LOG2", default_value = "12")]
    pub log2_superblock_size: u32,

    /// Sample one suffix every INTERVAL rows
    #[arg(short('i'), long, value_name = "INTERVAL", default_value = "4096")]
    pub locate_interval: usize,

    /// Build without locate samples
    #[arg(long)]
    pub no_locate: bool,
}

#[derive(Debug, Parser)]
#[command(about, alias = "co")]
pub struct CountArgs {
    /// Output
    #[arg(short, long, value_name = "OUT")]
    pub output: Option<String>,

    /// Index file
    #[arg(value_name = "INDEX")]
    pub file: String,

    /// Query
    #[arg(value_name = "QUERY", required = true)]
    pub query: Vec<String>,
}

#[derive(Debug, Parser)]
#[command(about, alias = "lo")]
pub struct LocateArgs {
    /// Output
    #[arg(short, long, value_name = "OUT")]
    pub output: Option<String>,

    /// Show absolute position in text
    #[arg(short, long)]
    pub abs: bool,

    /// Index file
    #[arg(value_name = "INDEX")]
    pub file: String,

    /// Query
    #[arg(value_name = "QUERY", required = true)]
    pub query: Vec<String>,
}

#[derive(Debug, Parser)]
#[command(about, alias = "ms")]
pub struct MstatsArgs {
    /// Output
    #[arg(short, long, value_name = "OUT")]
    pub output: Option<String>,

    /// Index file, built from a reverse project
    #[arg(value_name = "INDEX")]
    pub file: String,

    /// Query
    #[arg(value_name = "QUERY", required = true)]
    pub query: Vec<String>,
}

#[derive(Debug, Parser)]
#[command(about, alias = "ve")]
pub struct VerifyArgs {
    /// Index file
    #[arg(value_name = "INDEX")]
    pub file: String,

    /// Project the index was built from
    #[arg(value_name = "PROJECT")]
    pub project: String,
}

#[derive(Debug, Parser)]
#[command(about, alias = "su")]
pub struct SummarizeArgs {
    /// Index file
    #[arg(value_name = "INDEX")]
    pub file: String,
}

// --------------------------------------------------
#[derive(Debug, Clone)]
pub enum LogLevel {
    Info,
    Debug,
}

impl ValueEnum for LogLevel {
    fn value_variants<'a>() -> &'a [Self] {
        &[LogLevel::Info, LogLevel::Debug]
    }

    fn to_possible_value<'a>(&self) -> Option<PossibleValue> {
        Some(match self {
            LogLevel::Info => PossibleValue::new("info"),
            LogLevel::Debug => PossibleValue::new("debug"),
        })
    }
}

// --------------------------------------------------
fn output_name(input: &str, output: &Option<String>, ext: &str) -> String {
    output.clone().unwrap_or(format!(
        "{}.{ext}",
        PathBuf::from(input)
            .file_stem()
            .unwrap_or(OsStr::new("out"))
            .to_string_lossy()
    ))
}

fn open_output(output: &Option<String>) -> Result<Box<dyn Write>> {
    Ok(match output {
        Some(out_name) => Box::new(File::create(out_name)?),
        _ => Box::new(io::stdout()),
    })
}

fn read_index(filename: &str) -> Result<BwtIndex> {
    let now = Instant::now();
    let index = BwtIndex::read(filename).map_err(|e| anyhow!("{filename}: {e}"))?;
    info!("Read index in {:?}", now.elapsed());
    Ok(index)
}

// --------------------------------------------------
pub fn create(args: &CreateArgs) -> Result<()> {
    let now = Instant::now();
    let alphabet = match &args.alphabet {
        Some(chars) => Alphabet::from_chars(chars.as_bytes(), args.wildcards.as_bytes())?,
        _ => Alphabet::dna(),
    };
    let seq = EncodedSequence::from_file(&args.input, alphabet)
        .map_err(|e| anyhow!("{}: {e}", args.input))?;
    let text_len = seq.len();
    let num_fmt = NumberFormat::new();
    info!(
        "Read input of len {} in {:?}",
        num_fmt.format(",.0", text_len as f64),
        now.elapsed()
    );

    let opts = SuffixerOptions {
        prefix_len: args.prefix_len,
        num_parts: args.num_parts,
        max_memory: args.max_memory,
        read_mode: if args.reverse {
            ReadMode::Reverse
        } else {
            ReadMode::Forward
        },
        special_page_size: None,
    };

    if (text_len as u64) < u32::MAX as u64 {
        _create::<u32>(&seq, &opts, args, now)
    } else {
        _create::<u64>(&seq, &opts, args, now)
    }
}

// --------------------------------------------------
// Helper for "create" that sorts and writes the project
fn _create<T>(
    seq: &EncodedSequence,
    opts: &SuffixerOptions,
    args: &CreateArgs,
    timer: Instant,
) -> Result<()>
where
    T: Int + FromUsize<T> + Sized + Send + Sync + Debug,
{
    let outfile = output_name(&args.input, &args.output, "fsa");
    let now = Instant::now();
    let summary = write_project::<T>(seq, opts, &outfile)?;
    let num_fmt = NumberFormat::new();
    info!(
        "Sorted {} suffixes with prefix length {} in {} part{}",
        num_fmt.format(",.0", summary.num_suffixes as f64),
        summary.prefix_len,
        summary.num_parts,
        if summary.num_parts == 1 { "" } else { "s" },
    );
    info!(
        "Wrote {} byte{} to '{outfile}' in {:?}",
        num_fmt.format(",.0", summary.bytes_written as f64),
        if summary.bytes_written == 1 { "" } else { "s" },
        now.elapsed()
    );
    info!("Total time: {:?}", timer.elapsed());
    Ok(())
}

// --------------------------------------------------
pub fn index(args: &IndexArgs) -> Result<()> {
    let mut text_lens = vec![];
    for filename in &args.projects {
        text_lens.push(read_text_length(filename).map_err(|e| anyhow!("{filename}: {e}"))?);
    }
    let wide = text_lens
        .iter()
        .map(|&len| len as u64 >= u32::MAX as u64)
        .collect::<Vec<_>>();
    if wide.iter().any(|&w| w) {
        if !wide.iter().all(|&w| w) {
            bail!("Cannot merge projects with different suffix table widths");
        }
        _index::<u64>(args)
    } else {
        _index::<u32>(args)
    }
}

// --------------------------------------------------
fn _index<T>(args: &IndexArgs) -> Result<()>
where
    T: Int + FromUsize<T> + Sized + Send + Sync + Debug,
{
    let now = Instant::now();
    let opts = FmIndexOptions {
        log2_block_size: args.log2_block_size,
        log2_superblock_size: args.log2_superblock_size,
        locate_interval: (!args.no_locate).then_some(args.locate_interval),
    };
    let mut report = |done: usize, total: usize| {
        debug!("Indexed {done}/{total} rows");
    };
    let progress: &mut dyn FnMut(usize, usize) = &mut report;
    let index = match args.projects.as_slice() {
        [project] => BwtIndex::from_project::<T>(project, &opts, Some(progress))?,
        projects => BwtIndex::from_merged_projects::<T>(projects, &opts, Some(progress))?,
    };

    let summary = index.summary();
    let num_fmt = NumberFormat::new();
    info!(
        "Built index of {} rows in {:?}, {:.2} bits per symbol",
        num_fmt.format(",.0", summary.num_rows as f64),
        now.elapsed(),
        summary.bits_per_symbol
    );

    let outfile = output_name(&args.projects[0], &args.output, "fmi");
    let bytes_written = index.write(&outfile)?;
    info!(
        "Wrote {} byte{} to '{outfile}'",
        num_fmt.format(",.0", bytes_written as f64),
        if bytes_written == 1 { "" } else { "s" },
    );
    Ok(())
}

// --------------------------------------------------
// Queries given on the command line or in files
fn parse_queries(queries: &[String]) -> Result<Vec<String>> {
    let mut ret = vec![];
    for query in queries {
        if Path::new(&query).exists() {
            let contents = fs::read_to_string(query)?;
            ret.extend(contents.split_whitespace().map(|v| v.to_string()));
        } else {
            ret.push(query.to_string());
        }
    }
    Ok(ret)
}

// --------------------------------------------------
pub fn count(args: &CountArgs) -> Result<()> {
    let index = read_index(&args.file)?;
    let mut output = open_output(&args.output)?;
    let queries = parse_queries(&args.query)?;
    let now = Instant::now();
    for query in &queries {
        match index.count(query.as_bytes()) {
            Ok(count) => writeln!(output, "{query} {count}")?,
            Err(e) => eprintln!("{query}: {e}"),
        }
    }
    info!("Count of {} finished in {:?}", queries.len(), now.elapsed());
    Ok(())
}

// --------------------------------------------------
pub fn locate(args: &LocateArgs) -> Result<()> {
    let index = read_index(&args.file)?;
    let mut output = open_output(&args.output)?;
    let queries = parse_queries(&args.query)?;
    let now = Instant::now();

    for query in &queries {
        let positions = match index.exact_matches(query.as_bytes()) {
            Ok(matches) => matches.collect::<libfmidx::error::Result<Vec<_>>>()?,
            Err(e) => {
                eprintln!("{query}: {e}");
                continue;
            }
        };
        if positions.is_empty() {
            eprintln!("{query} not found");
            continue;
        }

        if args.abs {
            let mut positions = positions;
            positions.sort_unstable();
            writeln!(
                output,
                "{query} {}",
                positions
                    .into_iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            )?;
        } else {
            // Sort by sequence then position
            let mut located: Vec<(usize, usize)> = positions
                .into_iter()
                .filter_map(|p| index.sequence_position(p))
                .collect();
            located.sort_unstable();

            writeln!(output, "{query}")?;
            let mut prev_seq = None;
            let mut buffer = vec![];
            for (seq_idx, pos) in located {
                if prev_seq != Some(seq_idx) {
                    if let Some(prev) = prev_seq {
                        writeln!(output, "{} {}", index.headers()[prev], buffer.join(","))?;
                    }
                    prev_seq = Some(seq_idx);
                    buffer = vec![];
                }
                buffer.push(pos.to_string());
            }
            if let Some(prev) = prev_seq {
                writeln!(output, "{} {}", index.headers()[prev], buffer.join(","))?;
            }
            writeln!(output, "//")?;
        }
    }

    info!("Locate of {} finished in {:?}", queries.len(), now.elapsed());
    Ok(())
}

// --------------------------------------------------
pub fn mstats(args: &MstatsArgs) -> Result<()> {
    let index = read_index(&args.file)?;
    if index.read_mode() != ReadMode::Reverse {
        bail!("{}: matching statistics need an index of a reverse project", args.file);
    }
    let mut output = open_output(&args.output)?;
    let queries = parse_queries(&args.query)?;
    let want_witness = index.has_locate();
    let now = Instant::now();

    for query in &queries {
        let symbols = match index.alphabet().encode_query(query.as_bytes()) {
            Ok(symbols) => symbols,
            Err(e) => {
                eprintln!("{query}: {e}");
                continue;
            }
        };
        writeln!(output, "{query}")?;
        for start in 0..symbols.len() {
            let stat = index.match_statistics(&symbols[start..], want_witness)?;
            let unique = index.unique_forward(&symbols[start..])?;
            let witness = stat.witness.map_or("-".to_string(), |pos| {
                index
                    .sequence_position(pos)
                    .map_or(pos.to_string(), |(seq_idx, offset)| {
                        format!("{}:{offset}", index.headers()[seq_idx])
                    })
            });
            writeln!(output, "{start}\t{}\t{witness}\t{unique}", stat.length)?;
        }
        writeln!(output, "//")?;
    }

    info!("Mstats of {} finished in {:?}", queries.len(), now.elapsed());
    Ok(())
}

// --------------------------------------------------
pub fn verify(args: &VerifyArgs) -> Result<()> {
    let text_len = read_text_length(&args.project)? as u64;
    let index = read_index(&args.file)?;
    if text_len < u32::MAX as u64 {
        let project: SuffixArrayProject<u32> = SuffixArrayProject::read(&args.project)?;
        _verify(index, project)
    } else {
        let project: SuffixArrayProject<u64> = SuffixArrayProject::read(&args.project)?;
        _verify(index, project)
    }
}

// --------------------------------------------------
fn _verify<T>(index: BwtIndex, mut project: SuffixArrayProject<T>) -> Result<()>
where
    T: Int + FromUsize<T> + Sized + Send + Sync + Debug,
{
    let now = Instant::now();
    index.verify_integrity(&mut project)?;
    let num_fmt = NumberFormat::new();
    println!(
        "Verified {} row{} against '{}' in {:?}.",
        num_fmt.format(",.0", index.num_rows() as f64),
        if index.num_rows() == 1 { "" } else { "s" },
        project.filename,
        now.elapsed()
    );
    Ok(())
}

// --------------------------------------------------
pub fn summarize(args: &SummarizeArgs) -> Result<()> {
    let index = read_index(&args.file)?;
    let summary = index.summary();
    let num_fmt = NumberFormat::new();
    let fmt = |val: usize| num_fmt.format(",.0", val as f64);
    let metadata = fs::metadata(&args.file)?;

    let mut rows = vec![
        ("Filename", args.file.to_string()),
        ("File Size", format!("{} bytes", fmt(metadata.len() as usize))),
        ("Text Length", fmt(summary.total_length)),
        ("Num Rows", fmt(summary.num_rows)),
        ("Alphabet Size", summary.num_chars.to_string()),
        ("Special Characters", fmt(summary.special_characters)),
        ("Read Mode", summary.read_mode.to_string()),
        ("Block Size", (1usize << summary.log2_block_size).to_string()),
        ("Superblock Size", (1usize << summary.log2_superblock_size).to_string()),
        (
            "Locate Interval",
            summary
                .locate_interval
                .map_or("none".to_string(), |v| v.to_string()),
        ),
        ("BWT Bytes", fmt(summary.bwt_bytes)),
        ("Rank Table Bytes", fmt(summary.rank_bytes)),
        ("Sample Bytes", fmt(summary.sample_bytes)),
        ("Exceptions", fmt(summary.exception_entries)),
        ("Bits per Symbol", format!("{:.2}", summary.bits_per_symbol)),
        ("Num sequences", fmt(summary.num_sequences)),
    ];
    rows.push(("Headers", index.headers().join(", ")));

    let width = rows.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    for (name, value) in rows {
        println!("{name:width$}  {value}");
    }
    Ok(())
}
