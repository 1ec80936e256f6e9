use clap::Parser;
use std::process::ExitCode;
use usageguard_bot::{Cli, exit_code, run};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("usageguard: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}
