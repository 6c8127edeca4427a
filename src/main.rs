use clap::{Parser, Subcommand};

mod commands;
mod output;
mod tty;

use commands::{config, deploy, pipeline, poll};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "gitship")]
#[command(version = VERSION)]
#[command(about = "Deploy by git push: push HEAD or a build artifact, then watch the rollout")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Push HEAD or an artifact directory to a deployment remote
    Deploy(deploy::DeployArgs),
    /// Install, test, build and push a container image
    Pipeline(pipeline::PipelineArgs),
    /// Poll a deployment status URL until it settles
    Poll(poll::PollArgs),
    /// Show gitship configuration
    Config(config::ConfigArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let (json_result, exit_code) = commands::run_json(cli.command);

    if let Err(err) = output::print_json_result(json_result) {
        eprintln!("gitship: {}", err);
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
