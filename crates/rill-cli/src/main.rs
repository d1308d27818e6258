use clap::{Parser, Subcommand};
use rill_infer::Opts;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "rill", about = "The rill analyzer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a .rill file and echo the tree
    Parse {
        /// Path to the source file
        file: PathBuf,
    },
    /// Analyze a file and print its type scheme and flow type
    Check {
        /// Path to the source file
        file: PathBuf,
        /// Skip Hindley-Milner inference
        #[arg(long = "no-hm")]
        no_hm: bool,
        /// Skip constant propagation
        #[arg(long = "no-gcp")]
        no_gcp: bool,
        /// Skip the apply-site lift
        #[arg(long = "no-lift")]
        no_lift: bool,
        /// Scramble worklist order (confluence testing)
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Also print the final memory
        #[arg(long)]
        mem: bool,
    },
}

fn main() -> ExitCode {
    if let Err(e) =
        env_logger::try_init_from_env(env_logger::Env::default().default_filter_or("error"))
    {
        eprintln!("could not start env logger: {}", e);
        return ExitCode::FAILURE;
    }
    let cli = Cli::parse();
    match cli.command {
        Command::Parse { file } => parse_cmd(&file),
        Command::Check {
            file,
            no_hm,
            no_gcp,
            no_lift,
            seed,
            mem,
        } => {
            let opts = Opts {
                do_hm: !no_hm,
                do_gcp: !no_gcp,
                do_lift: !no_lift,
                seed,
                ..Opts::default()
            };
            check_cmd(&file, opts, mem)
        }
    }
}

fn read(file: &Path) -> Option<String> {
    match std::fs::read_to_string(file) {
        Ok(s) => Some(s),
        Err(e) => {
            eprintln!("error: could not read {}: {}", file.display(), e);
            None
        }
    }
}

fn parse_cmd(file: &Path) -> ExitCode {
    let Some(source) = read(file) else {
        return ExitCode::FAILURE;
    };
    let (ast, errors) = rill_parser::parse(&source);
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("parse error: {}", e);
        }
        return ExitCode::FAILURE;
    }
    println!("{}", ast.print(ast.root));
    ExitCode::SUCCESS
}

fn check_cmd(file: &Path, opts: Opts, mem: bool) -> ExitCode {
    let Some(source) = read(file) else {
        return ExitCode::FAILURE;
    };
    match rill_infer::run_with(&source, opts) {
        Ok(a) => {
            if opts.do_hm {
                println!("type: {}", a.hm);
            }
            if opts.do_gcp {
                println!("flow: {}", a.flow_sig);
            }
            if mem {
                println!("mem:  {}", a.mem);
            }
            for e in &a.errs {
                eprintln!("error: {}", e);
            }
            if a.errs.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
