//! Offline Requel tooling.
//!
//! `requel validate` checks two queries for provable equivalence;
//! `requel explain` prints a query's (optionally canonicalized) plan.

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use common_error::RequelResult;
use requel_host::{PlanExtractor, SessionHandle, SqlPlanExtractor};
use requel_verify::{SemanticValidator, ValidationMode};

#[derive(Parser)]
#[command(name = "requel", about = "SQL rewrite validation tooling")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check whether a rewrite is provably equivalent to the original.
    Validate {
        /// Original SQL text.
        original: String,
        /// Candidate rewrite SQL text.
        candidate: String,
        /// Comparison strictness.
        #[arg(long, value_enum, default_value_t = ModeArg::Strict)]
        mode: ModeArg,
    },
    /// Print the logical plan of a query.
    Explain {
        /// SQL text.
        sql: String,
        /// Canonicalize the plan before printing.
        #[arg(long)]
        canonical: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Strict,
    Relaxed,
    Heuristic,
}

impl From<ModeArg> for ValidationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Strict => Self::Strict,
            ModeArg::Relaxed => Self::Relaxed,
            ModeArg::Heuristic => Self::Heuristic,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            2
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> RequelResult<i32> {
    let extractor = SqlPlanExtractor::new();
    let session = SessionHandle::new(0);

    match cli.command {
        Command::Validate {
            original,
            candidate,
            mode,
        } => {
            let validator = SemanticValidator::new().with_mode(mode.into());
            let result = validator.validate(&extractor, session, &original, &candidate);

            println!(
                "equivalent: {} (confidence {:.3})",
                result.is_equivalent, result.confidence
            );
            println!("reason: {}", result.reason);
            for difference in &result.differences {
                println!("  {difference}");
            }
            Ok(i32::from(!result.is_equivalent))
        }
        Command::Explain { sql, canonical } => {
            let plan = extractor.extract(session, &sql)?;
            let plan = if canonical {
                let outcome = requel_canon::canonicalize(plan);
                if !outcome.converged {
                    eprintln!("warning: canonicalization hit the pass cap");
                }
                outcome.plan
            } else {
                plan
            };

            print!("{}", plan.to_pretty_string());
            if plan.is_unsupported() {
                println!("(plan contains unsupported fragments)");
            }
            Ok(0)
        }
    }
}
