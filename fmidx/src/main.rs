use anyhow::Result;
use clap::Parser;
use fmidx::{Cli, Command, LogLevel};
use std::{fs::File, io::BufWriter};

// --------------------------------------------------
fn main() {
    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

// --------------------------------------------------
fn run(args: Cli) -> Result<()> {
    env_logger::Builder::new()
        .filter_level(match args.log {
            Some(LogLevel::Debug) => log::LevelFilter::Debug,
            Some(LogLevel::Info) => log::LevelFilter::Info,
            _ => log::LevelFilter::Off,
        })
        .target(match args.log_file {
            // Optional log file, default to STDOUT
            Some(ref filename) => env_logger::Target::Pipe(Box::new(
                BufWriter::new(File::create(filename)?),
            )),
            _ => env_logger::Target::Stdout,
        })
        .init();

    let num_threads = args.threads.unwrap_or_else(num_cpus::get);
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()?;

    match &args.command {
        Some(Command::Create(args)) => {
            fmidx::create(args)?;
            Ok(())
        }
        Some(Command::Index(args)) => {
            fmidx::index(args)?;
            Ok(())
        }
        Some(Command::Count(args)) => {
            fmidx::count(args)?;
            Ok(())
        }
        Some(Command::Locate(args)) => {
            fmidx::locate(args)?;
            Ok(())
        }
        Some(Command::Mstats(args)) => {
            fmidx::mstats(args)?;
            Ok(())
        }
        Some(Command::Verify(args)) => {
            fmidx::verify(args)?;
            Ok(())
        }
        Some(Command::Summarize(args)) => {
            fmidx::summarize(args)?;
            Ok(())
        }
        _ => unreachable!(),
    }
}
