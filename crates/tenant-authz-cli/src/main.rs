//! tenant-authz CLI entry point

use std::process::ExitCode;

use clap::Parser;
use tenant_authz_cli::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();
    cli.init_tracing();

    let mut stdout = std::io::stdout().lock();
    match cli.execute(&mut stdout) {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}
