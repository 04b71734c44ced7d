//! Operator key bootstrap
//!
//! Prints `.env` lines for a fresh key set, or for a MAC key rotation.
//! `--check` loads the current environment and reports whether it would start.

use attendance_trust::crypto::KeyBootstrap;
use attendance_trust::{SecurityConfig, TrustCore};
use clap::Parser;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "attendance-keygen", version, about = "Generate or rotate attendance trust keys")]
struct Args {
    /// Current base64 MAC key to retire; prints a new MAC key and retired-key list
    #[arg(long, value_name = "OLD_KEY", conflicts_with = "check")]
    rotate_mac: Option<String>,

    /// Existing comma-separated retired MAC keys to carry over
    #[arg(long, value_name = "LIST", requires = "rotate_mac")]
    retired: Option<String>,

    /// Validate the keys in the environment (and .env) instead of generating
    #[arg(long)]
    check: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.check {
        return match SecurityConfig::from_env().and_then(|config| TrustCore::new(&config)) {
            Ok(_) => {
                println!("✅ Key configuration is valid");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("❌ {e}");
                ExitCode::FAILURE
            }
        };
    }

    let lines = match args.rotate_mac {
        Some(current) => match KeyBootstrap::rotate_mac(&current, args.retired.as_deref()) {
            Ok(lines) => lines,
            Err(e) => {
                eprintln!("❌ {e}");
                return ExitCode::FAILURE;
            }
        },
        None => KeyBootstrap::generate().to_env_lines(),
    };

    eprintln!("# Store these values in your secret manager or .env; they are shown once.");
    for line in lines {
        println!("{line}");
    }
    ExitCode::SUCCESS
}
