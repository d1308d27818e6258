//! Combined Hindley-Milner inference and global constant propagation,
//! run as one interleaved monotone fixed point over the syntax tree.
//!
//! The two analyses trade facts in exactly three places: `if` reads the
//! predicate's flow type to skip dead arms, `apply` lifts its flow result
//! through the HM structure of its inputs, and call-site discovery drives
//! the meet of actuals into lambda formals.

mod infer;
mod lift;
mod print;
mod syntax;
mod tv;
mod work;

#[cfg(test)]
mod tests;

pub use infer::{Analysis, Infer, Opts, RunError};
pub use syntax::{SynId, SynKind, Syntax};
pub use tv::{Tv, TvId};

/// Whether an operation should commit its changes or only report that it
/// would make progress. The report-only mode backs the global worklist
/// audit.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mode {
    Test,
    Run,
}

impl Mode {
    pub fn run(self) -> bool {
        self == Mode::Run
    }
    pub fn test(self) -> bool {
        self == Mode::Test
    }
}

/// Analyze a program with the default options.
pub fn run(source: &str) -> Result<Analysis, RunError> {
    run_with(source, Opts::default())
}

/// Analyze a program.
pub fn run_with(source: &str, opts: Opts) -> Result<Analysis, RunError> {
    let (ast, errors) = rill_parser::parse(source);
    if !errors.is_empty() {
        return Err(RunError::Parse(
            errors.iter().map(|e| e.to_string()).collect(),
        ));
    }
    Infer::analyze(&ast, opts)
}
