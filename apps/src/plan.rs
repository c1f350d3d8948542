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

//! Translation of a [`TrainingConfig`] into the process the launcher runs.

use serde::Serialize;

use crate::config::TrainingConfig;

/// Distributed launcher executable.
pub const DEFAULT_LAUNCHER: &str = "torchrun";
/// Training entry point handed to the launcher.
pub const DEFAULT_ENTRY_POINT: &str = "train.py";

pub const ENV_PROJECT: &str = "WANDB_PROJECT";
pub const ENV_RUN_NAME: &str = "WANDB_NAME";
pub const ENV_VISIBLE_DEVICES: &str = "CUDA_VISIBLE_DEVICES";

/// The external program and script that do the actual training.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub launcher: String,
    pub script: String,
}

impl Default for Entry {
    fn default() -> Self {
        Self {
            launcher: DEFAULT_LAUNCHER.to_string(),
            script: DEFAULT_ENTRY_POINT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    fn new(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
        }
    }
}

/// A fully resolved invocation: environment additions, program and arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchPlan {
    pub run_name: String,
    pub env: Vec<EnvVar>,
    pub program: String,
    pub args: Vec<String>,
}

impl LaunchPlan {
    pub fn from_config(config: &TrainingConfig, entry: &Entry) -> Self {
        let run_name = config.run_name();
        let env = vec![
            EnvVar::new(ENV_PROJECT, config.project.clone()),
            EnvVar::new(ENV_RUN_NAME, run_name.clone()),
            EnvVar::new(ENV_VISIBLE_DEVICES, config.devices.to_string()),
        ];

        let mut args = vec![
            "--nproc_per_node".to_string(),
            config.devices.len().to_string(),
            entry.script.clone(),
        ];
        let mut flag = |name: &str, value: String| {
            args.push(name.to_string());
            args.push(value);
        };
        flag("--model_name_or_path", config.model.clone());
        flag(
            "--output_dir",
            config.resolved_output_dir().display().to_string(),
        );
        flag("--use_hf_dataset", bool_arg(config.data.is_hub()));
        flag("--data_dir", config.data.location());
        flag("--num_train_epochs", config.epochs.to_string());
        flag("--learning_rate", config.learning_rate.to_string());
        flag("--per_device_train_batch_size", config.batch_size.to_string());
        flag("--per_device_eval_batch_size", config.batch_size.to_string());
        flag("--mini_batch_size", config.mini_batch_size.to_string());
        flag(config.warmup.flag(), config.warmup.value());
        flag("--logging_steps", config.logging_steps.to_string());
        flag("--max_seq_length", config.max_seq_length.to_string());
        flag("--save_strategy", config.save_strategy.clone());
        flag(
            "--resume_from_checkpoint",
            bool_arg(config.resume_from_checkpoint),
        );
        flag("--test", bool_arg(config.test));

        Self {
            run_name,
            env,
            program: entry.launcher.clone(),
            args,
        }
    }

    /// Value following `flag` in the argument list, if the flag is present.
    pub fn arg_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    pub fn env_value(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|var| var.name == name)
            .map(|var| var.value.as_str())
    }

    /// Render as a single shell line that reproduces the invocation.
    pub fn shell_line(&self) -> String {
        self.env
            .iter()
            .map(|var| format!("{}={}", var.name, shell_quote(&var.value)))
            .chain(std::iter::once(shell_quote(&self.program)))
            .chain(self.args.iter().map(|a| shell_quote(a)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn bool_arg(value: bool) -> String {
    value.to_string()
}

fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./,=:@%+".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
