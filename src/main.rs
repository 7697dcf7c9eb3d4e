use std::path::PathBuf;
use std::process::exit;
use clap::Parser;
use log::{error, LevelFilter};
use cojvm::{ClassPath, RunOutcome, StdHost, ThreadOutcome, Vm, VmOptions};

/// Runs the `main` method of a Java class.
#[derive(Parser, Debug)]
#[clap(version)]
struct Args {
    /// Directory or JAR archive to search for class files; may be repeated.
    #[clap(short, long = "classpath", default_value = ".")]
    classpath: Vec<PathBuf>,

    /// Instructions a thread runs before another gets its turn.
    #[clap(long, default_value_t = 1000)]
    quantum: usize,

    /// Call depth at which StackOverflowError is thrown.
    #[clap(long = "max-depth", default_value_t = 2048)]
    max_depth: usize,

    /// Load java/lang classes from the class path instead of the built-in runtime.
    #[clap(long)]
    no_builtin_runtime: bool,

    /// More log output; repeat for more detail.
    #[clap(short, long, parse(from_occurrences))]
    verbose: u8,

    /// Main class, as pkg.Main or pkg/Main.
    main_class: String,

    /// Arguments passed to main.
    args: Vec<String>,
}

fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn main() {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(log_level(args.verbose))
        .parse_default_env()
        .init();

    let options = VmOptions {
        quantum: args.quantum,
        max_stack_depth: args.max_depth,
        builtin_runtime: !args.no_builtin_runtime,
        ..VmOptions::default()
    };
    let source = ClassPath::new(args.classpath);
    let mut vm = Vm::new(Box::new(source), Box::new(StdHost), options);

    let main = vm.spawn_main(&args.main_class, args.args);
    let status = match vm.run() {
        RunOutcome::Finished => match vm.thread_outcome(main) {
            Some(ThreadOutcome::Returned(_)) => 0,
            Some(ThreadOutcome::Aborted(reason)) => {
                error!("main thread aborted: {}", reason);
                1
            }
            _ => 1,
        },
        RunOutcome::Halted(status) => status,
        RunOutcome::Idle => {
            error!("threads are waiting on the host, but nothing will answer");
            1
        }
        RunOutcome::Deadlocked => {
            error!("deadlock: no thread can make progress");
            1
        }
    };
    exit(status);
}
