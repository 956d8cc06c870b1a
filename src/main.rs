use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use yansi::Paint;

use ses::{EngineConfig, JsonTrace, SearchEngine, TextTrace, TraceSink};

#[derive(Parser)]
#[command(name = "sesknife", version)]
#[command(
    about = "Runs a Search Engine Script against each input file, or once against an empty buffer."
)]
struct Cli {
    /// Script file to run
    script: PathBuf,

    /// Files loaded one after another into the main buffer
    files: Vec<PathBuf>,

    /// Set a script parameter (names starting with '_' are global)
    #[arg(short = 'D', long = "define", value_name = "NAME=VALUE")]
    define: Vec<String>,

    /// Write changed buffers back to their files
    #[arg(short = 'i', long = "in-place")]
    in_place: bool,

    /// Print the main buffer after each run
    #[arg(short = 'p', long = "print")]
    print: bool,

    /// Trace every executed statement on stderr
    #[arg(long, conflicts_with = "trace_json")]
    trace: bool,

    /// Trace every executed statement as JSON lines on stderr
    #[arg(long = "trace-json")]
    trace_json: bool,

    /// More diagnostics (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Abort any loop after this many iterations
    #[arg(long = "max-loops", value_name = "N")]
    max_loops: Option<usize>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(code) => ExitCode::from(code.clamp(1, 255) as u8),
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn run(cli: &Cli) -> Result<i32> {
    let mut config = EngineConfig::from_env();
    config.max_loop_iterations = cli.max_loops;
    let mut engine = SearchEngine::new(config);

    let trace: Option<Box<dyn TraceSink>> = if cli.trace_json {
        Some(Box::new(JsonTrace::stderr()))
    } else if cli.trace {
        Some(Box::new(TextTrace::stderr()))
    } else {
        None
    };
    engine.set_trace(trace);

    engine
        .load_script_file(&cli.script)
        .with_context(|| format!("cannot load script {}", cli.script.display()))?;
    for define in &cli.define {
        let (name, value) = define
            .split_once('=')
            .ok_or_else(|| anyhow!("expected NAME=VALUE, got '{}'", define))?;
        engine
            .set_parameter(name.trim(), value)
            .with_context(|| format!("cannot set parameter '{}'", name))?;
    }

    if cli.files.is_empty() {
        let code = engine.test_and_run(None);
        if cli.print {
            print_main(&engine)?;
        }
        return Ok(code);
    }

    for file in &cli.files {
        engine
            .main_buffer_mut()
            .read_from_file(file)
            .with_context(|| format!("cannot read {}", file.display()))?;
        log::info!("processing {}", file.display());
        let code = engine.test_and_run(None);
        if code != 0 {
            return Ok(code);
        }
        if cli.print {
            print_main(&engine)?;
        }
        if cli.in_place
            && engine
                .main_buffer_mut()
                .write_to_file(None, false, false)
                .with_context(|| format!("cannot write {}", file.display()))?
        {
            log::info!("wrote {}", file.display());
        }
    }
    Ok(0)
}

fn print_main(engine: &SearchEngine) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    for line in engine.main_buffer().lines() {
        writeln!(handle, "{}", line)?;
    }
    Ok(())
}
