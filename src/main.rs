use clap::{CommandFactory, Parser, error::ErrorKind};
use intcalc::config::{CompilerConfig, SOURCE_ARG_MAX, executable_dir};
use intcalc::test_cases::TEST_CASES;
use intcalc::{CompileError, run_origin, run_source};
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "intcalc")]
#[command(version, about = "Compile an integer calculator program to x86-64 and run it")]
struct Cli {
    /// Source file, or source text with --source
    #[arg(
        value_name = "INPUT",
        required_unless_present_any = ["origin_wasm", "test"],
        conflicts_with_all = ["origin_wasm", "test"]
    )]
    input: Option<String>,

    /// Write artifacts and the log to the current directory instead of next to the executable
    #[arg(short = 'c', long)]
    current_dir: bool,

    /// Write the log to intcalc.log instead of stderr
    #[arg(short = 'l', long)]
    log_file: bool,

    /// No messages
    #[arg(short = 'm', long)]
    quiet: bool,

    /// Write no artifacts unless requested with -w or -x
    #[arg(short = 'n', long)]
    no_output_files: bool,

    /// Run the built-in hand-authored module
    #[arg(short = 'r', long)]
    origin_wasm: bool,

    /// Treat INPUT as source text
    #[arg(short = 's', long)]
    source: bool,

    /// Run the built-in regression table
    #[arg(short = 't', long, conflicts_with = "origin_wasm")]
    test: bool,

    /// Write int_calc.wasm
    #[arg(short = 'w', long)]
    emit_wasm: bool,

    /// Write int_calc.bin
    #[arg(short = 'x', long)]
    emit_x64: bool,
}

impl Cli {
    /// Test mode logs to `intcalc.log` and writes artifacts only when asked with -w/-x
    fn config(&self) -> CompilerConfig {
        let output_dir = if self.current_dir {
            PathBuf::from(".")
        } else {
            executable_dir()
        };
        CompilerConfig::new()
            .with_output_dir(output_dir)
            .with_log_to_file(self.log_file || self.test)
            .with_quiet(self.quiet)
            .with_write_files(!self.no_output_files && !self.test)
            .with_write_wasm(self.emit_wasm)
            .with_write_x64(self.emit_x64)
    }

    fn input(&self) -> Result<&str, clap::Error> {
        self.input.as_deref().ok_or_else(|| {
            Cli::command().error(
                ErrorKind::MissingRequiredArgument,
                "an INPUT file or --source text is required",
            )
        })
    }
}

fn init_logging(config: &CompilerConfig) -> Result<(), CompileError> {
    let level = if config.quiet { Level::ERROR } else { Level::INFO };
    let builder = tracing_subscriber::fmt().with_max_level(level).with_target(false);
    if config.log_to_file {
        let file = File::create(config.log_path())?;
        builder.with_ansi(false).with_writer(Mutex::new(file)).init();
    } else {
        builder.with_writer(std::io::stderr).init();
    }
    Ok(())
}

fn run_tests(config: &CompilerConfig) -> bool {
    let mut failures = 0;
    for (i, case) in TEST_CASES.iter().enumerate() {
        let number = i + 1;
        match run_source(case.source, config) {
            Ok(value) if value == case.expected => {
                tracing::info!("SUCCESS: test case No.{:03}", number);
            }
            Ok(value) => {
                failures += 1;
                tracing::error!(
                    "test case No.{:03}: return value=({}), correct value=({}), source code=({})",
                    number,
                    value,
                    case.expected,
                    case.source.escape_debug()
                );
            }
            Err(e) => {
                failures += 1;
                tracing::error!("compile failed. test case No.{:03}: {}", number, e);
            }
        }
    }
    if !config.quiet {
        println!("{} passed, {} failed", TEST_CASES.len() - failures, failures);
    }
    failures == 0
}

fn run(cli: &Cli, input: &str, config: &CompilerConfig) -> Result<i32, CompileError> {
    if cli.source {
        return run_source(input, config);
    }
    let source = std::fs::read_to_string(input)?;
    tracing::debug!(path = input, bytes = source.len(), "read source file");
    run_source(&source, config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.source && cli.input.as_ref().is_some_and(|s| s.len() > SOURCE_ARG_MAX) {
        Cli::command()
            .error(
                ErrorKind::ValueValidation,
                format!("source text is limited to {} characters", SOURCE_ARG_MAX),
            )
            .exit();
    }

    let config = cli.config();
    if let Err(e) = init_logging(&config) {
        eprintln!("[ERROR] cannot open log file: {}", e);
        return ExitCode::FAILURE;
    }

    if cli.test {
        return if run_tests(&config) {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        };
    }

    let result = if cli.origin_wasm {
        run_origin(&config)
    } else {
        match cli.input() {
            Ok(input) => run(&cli, input, &config),
            Err(e) => e.exit(),
        }
    };

    match result {
        Ok(value) => {
            if !config.quiet {
                println!("calc() = {}", value);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            if e.is_internal() {
                tracing::error!("internal compiler error: {}", e);
            } else {
                tracing::error!("{}", e);
            }
            ExitCode::FAILURE
        }
    }
}
