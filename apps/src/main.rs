// Copyright 2024 RISC Zero, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{bail, Context, Result};
use embed_launch::cli::{Cli, Command, LaunchArgs, MergeArgs, PlanArgs};
use embed_launch::data;
use embed_launch::launch;
use embed_launch::plan::LaunchPlan;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            launch::exit_code_for_error(&e)
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<i32> {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!("Loaded environment variables from {:?}", path),
        Err(e) if e.not_found() => tracing::debug!("No .env file found"),
        Err(e) => bail!("failed to load .env file: {}", e),
    }
    let cli = Cli::try_parse_args(std::env::args_os()).unwrap_or_else(|e| e.exit());

    match cli.into_command() {
        Command::Launch(args) => launch_training(args).await,
        Command::Plan(args) => print_plan(args),
        Command::MergeData(args) => merge_data(args),
    }
}

async fn launch_training(args: LaunchArgs) -> Result<i32> {
    let config = args.config.resolve()?;
    if args.check_data {
        data::check_source(&config.data).context("data check failed")?;
    }

    let plan = LaunchPlan::from_config(&config, &args.config.entry());
    tracing::info!("Run name: {}", plan.run_name);
    tracing::info!("Launching: {}", plan.shell_line());
    launch::run(&plan).await
}

fn print_plan(args: PlanArgs) -> Result<i32> {
    let config = args.config.resolve()?;
    let plan = LaunchPlan::from_config(&config, &args.config.entry());
    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        println!("{}", plan.shell_line());
    }
    Ok(0)
}

fn merge_data(args: MergeArgs) -> Result<i32> {
    let count = data::merge_files(&args.inputs, &args.output)?;
    tracing::info!(
        "Merged {} records from {} files into {}",
        count,
        args.inputs.len(),
        args.output.display()
    );
    Ok(0)
}
