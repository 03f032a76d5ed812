use std::path::PathBuf;

use clap::Parser;
use corvid::prelude::Config;
use corvid::{Corvid, RunError};

/// Run a corvid script.
#[derive(Parser, Debug)]
#[command(name = "corvid")]
#[command(about = "Run corvid scripts", long_about = None)]
struct Args {
    /// Script to run
    script: PathBuf,

    /// Root directory of the standard library (overrides CORVID_STDLIB)
    #[arg(long)]
    stdlib: Option<PathBuf>,

    /// Maximum depth of nested calls (overrides CORVID_MAX_CALL_DEPTH)
    #[arg(long)]
    max_call_depth: Option<usize>,
}

fn main() {
    let args = Args::parse();

    use tracing_subscriber::{fmt, EnvFilter};

    // CORVID_LOG controls the log level, warnings only by default.
    let filter = EnvFilter::try_from_env("CORVID_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false).init();

    let mut config = Config::from_env();
    if let Some(stdlib) = args.stdlib {
        config = config.with_stdlib_root(stdlib);
    }
    if let Some(depth) = args.max_call_depth {
        config = config.with_max_call_depth(depth);
    }

    let mut corvid = Corvid::with_config(config);
    if let Err(error) = corvid.run_file(&args.script) {
        eprintln!("{error}");
        let code = match error.downcast_ref::<RunError>() {
            Some(error) => error.exit_code(),
            // EX_NOINPUT
            None => 66,
        };
        std::process::exit(code);
    }
}
