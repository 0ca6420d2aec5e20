use std::process::ExitCode;

use clap::Parser;

#[tokio::main]
async fn main() -> ExitCode {
    jobalert_lib::run(jobalert_lib::commands::Cli::parse()).await
}
