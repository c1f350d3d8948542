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

use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::parser::ValueSource;
use clap::{ArgMatches, Args, CommandFactory, FromArgMatches, Parser, Subcommand};

use crate::config::{DataSource, DeviceList, LearningRate, Mode, TrainingConfig, Warmup};
use crate::plan::{Entry, DEFAULT_ENTRY_POINT, DEFAULT_LAUNCHER};

/// Launch distributed training of a multilingual text-embedding model.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
#[clap(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Option<Command>,
    /// Used when no subcommand is given.
    #[clap(flatten)]
    pub launch: LaunchArgs,
}

impl Cli {
    /// Parse like [`Parser::try_parse_from`], then settle the mutually
    /// exclusive option pairs: a value given on the command line wins over one
    /// taken from the environment, two values from the same place conflict.
    pub fn try_parse_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let mut command = Self::command();
        let matches = command.try_get_matches_from_mut(args)?;
        let mut cli = Self::from_arg_matches(&matches).map_err(|e| e.format(&mut command))?;

        let (config, config_matches) = match (&mut cli.command, matches.subcommand()) {
            (Some(Command::Launch(args)), Some((_, sub))) => (Some(&mut args.config), sub),
            (Some(Command::Plan(args)), Some((_, sub))) => (Some(&mut args.config), sub),
            (None, _) => (Some(&mut cli.launch.config), &matches),
            _ => (None, &matches),
        };
        if let Some(config) = config {
            config
                .settle_sources(config_matches)
                .map_err(|e| e.format(&mut command))?;
        }
        Ok(cli)
    }

    /// The subcommand to run, with a bare invocation meaning `launch`.
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Launch(self.launch))
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Export the tracking variables and run the trainer.
    Launch(LaunchArgs),
    /// Print the invocation without running it.
    Plan(PlanArgs),
    /// Concatenate JSON array data files into one.
    MergeData(MergeArgs),
}

#[derive(Args, Debug)]
pub struct LaunchArgs {
    #[clap(flatten)]
    pub config: ConfigArgs,
    /// Check a directory data source before launching.
    #[clap(long, env = "EMBED_CHECK_DATA")]
    pub check_data: bool,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[clap(flatten)]
    pub config: ConfigArgs,
    /// Print the plan as JSON instead of a shell line.
    #[clap(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// File to write the merged array to.
    #[clap(short, long)]
    pub output: PathBuf,
    /// JSON array files, merged in order.
    #[clap(required = true)]
    pub inputs: Vec<PathBuf>,
}

/// Preset selection and per-field overrides. Unset fields keep the preset value.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Which preset to start from.
    #[clap(long, env = "EMBED_MODE", value_enum, default_value_t = Mode::Finetune)]
    pub mode: Mode,
    /// Distributed launcher executable.
    #[clap(long, env = "EMBED_LAUNCHER", default_value = DEFAULT_LAUNCHER)]
    pub launcher: String,
    /// Training script passed to the launcher.
    #[clap(long, env = "EMBED_ENTRY_POINT", default_value = DEFAULT_ENTRY_POINT)]
    pub entry_point: String,

    #[clap(long, env = "EMBED_MODEL")]
    pub model: Option<String>,
    #[clap(long, env = "EMBED_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,
    /// Write checkpoints under `<output-dir>/<run name>`.
    #[clap(long, env = "EMBED_OUTPUT_PER_RUN")]
    pub output_per_run: bool,
    /// Dataset identifier on the model hub.
    #[clap(long, env = "EMBED_HF_DATASET")]
    pub hf_dataset: Option<String>,
    /// Directory holding train/dev/test splits.
    #[clap(long, env = "EMBED_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
    #[clap(long, env = "EMBED_EPOCHS")]
    pub epochs: Option<u32>,
    #[clap(long, env = "EMBED_LEARNING_RATE")]
    pub learning_rate: Option<LearningRate>,
    #[clap(long, env = "EMBED_BATCH_SIZE")]
    pub batch_size: Option<u32>,
    #[clap(long, env = "EMBED_MINI_BATCH_SIZE")]
    pub mini_batch_size: Option<u32>,
    #[clap(long, env = "EMBED_WARMUP_STEPS")]
    pub warmup_steps: Option<u32>,
    #[clap(long, env = "EMBED_WARMUP_RATIO", value_parser = parse_warmup_ratio)]
    pub warmup_ratio: Option<f64>,
    #[clap(long, env = "EMBED_LOGGING_STEPS")]
    pub logging_steps: Option<u32>,
    #[clap(long, env = "EMBED_MAX_SEQ_LENGTH")]
    pub max_seq_length: Option<u32>,
    #[clap(long, env = "EMBED_SAVE_STRATEGY")]
    pub save_strategy: Option<String>,
    #[clap(long, env = "EMBED_RESUME_FROM_CHECKPOINT")]
    pub resume_from_checkpoint: bool,
    /// Ask the trainer for a short test run.
    #[clap(long, env = "EMBED_TEST_MODE")]
    pub test_mode: bool,
    /// Label appended to the run name.
    #[clap(long, env = "EMBED_DATE_TAG")]
    pub date_tag: Option<String>,
    /// Comma-separated accelerator indices, e.g. `0,1,2,3`.
    #[clap(long, env = "EMBED_DEVICES")]
    pub devices: Option<DeviceList>,
    /// Experiment-tracking project.
    #[clap(long, env = "EMBED_PROJECT")]
    pub project: Option<String>,
}

impl ConfigArgs {
    pub fn entry(&self) -> Entry {
        Entry {
            launcher: self.launcher.clone(),
            script: self.entry_point.clone(),
        }
    }

    /// Apply the overrides on top of the preset for `mode`.
    pub fn resolve(&self) -> Result<TrainingConfig> {
        let mut config = TrainingConfig::preset(self.mode)?;

        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        config.output_per_run |= self.output_per_run;
        if let Some(id) = &self.hf_dataset {
            config.data = DataSource::Hub(id.clone());
        } else if let Some(dir) = &self.data_dir {
            config.data = DataSource::Directory(dir.clone());
        }
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(lr) = &self.learning_rate {
            config.learning_rate = lr.clone();
        }
        if let Some(batch) = self.batch_size {
            config.batch_size = batch;
        }
        if let Some(mini) = self.mini_batch_size {
            config.mini_batch_size = mini;
        }
        if let Some(steps) = self.warmup_steps {
            config.warmup = Warmup::Steps(steps);
        } else if let Some(ratio) = self.warmup_ratio {
            config.warmup = Warmup::ratio(ratio)?;
        }
        if let Some(steps) = self.logging_steps {
            config.logging_steps = steps;
        }
        if let Some(len) = self.max_seq_length {
            config.max_seq_length = len;
        }
        if let Some(strategy) = &self.save_strategy {
            config.save_strategy = strategy.clone();
        }
        config.resume_from_checkpoint |= self.resume_from_checkpoint;
        config.test |= self.test_mode;
        if let Some(tag) = &self.date_tag {
            config.date_tag = tag.clone();
        }
        if let Some(devices) = &self.devices {
            config.devices = devices.clone();
        }
        if let Some(project) = &self.project {
            config.project = project.clone();
        }
        Ok(config)
    }

    fn settle_sources(&mut self, matches: &ArgMatches) -> Result<(), clap::Error> {
        settle(
            (&mut self.hf_dataset, "hf_dataset"),
            (&mut self.data_dir, "data_dir"),
            matches,
        )?;
        settle(
            (&mut self.warmup_steps, "warmup_steps"),
            (&mut self.warmup_ratio, "warmup_ratio"),
            matches,
        )
    }
}

/// Keep at most one of two exclusive options, preferring the one given on
/// the command line.
fn settle<A, B>(
    (a, a_id): (&mut Option<A>, &str),
    (b, b_id): (&mut Option<B>, &str),
    matches: &ArgMatches,
) -> Result<(), clap::Error> {
    if a.is_none() || b.is_none() {
        return Ok(());
    }
    let on_command_line = |id: &str| matches.value_source(id) == Some(ValueSource::CommandLine);
    match (on_command_line(a_id), on_command_line(b_id)) {
        (true, false) => *b = None,
        (false, true) => *a = None,
        _ => {
            return Err(clap::Error::raw(
                ErrorKind::ArgumentConflict,
                format!(
                    "the argument '--{}' cannot be used with '--{}'\n",
                    a_id.replace('_', "-"),
                    b_id.replace('_', "-")
                ),
            ))
        }
    }
    Ok(())
}

fn parse_warmup_ratio(s: &str) -> Result<f64> {
    let ratio: f64 = s
        .trim()
        .parse()
        .with_context(|| format!("warmup ratio '{s}' is not a number"))?;
    Warmup::ratio(ratio)?;
    Ok(ratio)
}
