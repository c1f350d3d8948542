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

//! Training hyperparameters and the two launch presets.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Serialize, Serializer};

/// Embedding model to start from.
pub const DEFAULT_MODEL: &str = "intfloat/multilingual-e5-large";
/// Packaged triplet dataset used for fine-tuning.
pub const DEFAULT_HF_DATASET: &str = "nlpai-lab/ko-triplet-v1.0";
/// Local corpus used for pretraining.
pub const DEFAULT_PRETRAIN_DIR: &str = "data/pretrain";
pub const DEFAULT_OUTPUT_DIR: &str = "checkpoints";
/// Experiment-tracking project.
pub const DEFAULT_PROJECT: &str = "ko-e5";
pub const DEFAULT_DATE_TAG: &str = "240919";
pub const DEFAULT_DEVICES: &str = "0,1,2,3,4,5,6,7";

pub const DEFAULT_EPOCHS: u32 = 2;
pub const DEFAULT_LEARNING_RATE: &str = "1e-5";
pub const DEFAULT_BATCH_SIZE: u32 = 4096;
pub const DEFAULT_MINI_BATCH_SIZE: u32 = 128;
pub const DEFAULT_WARMUP_STEPS: u32 = 100;
pub const DEFAULT_WARMUP_RATIO: f64 = 0.1;
pub const DEFAULT_LOGGING_STEPS: u32 = 10;
pub const DEFAULT_MAX_SEQ_LENGTH: u32 = 512;
pub const DEFAULT_SAVE_STRATEGY: &str = "epoch";

/// The run name carries the batch size divided by this.
pub const RUN_NAME_BATCH_DIVISOR: u32 = 8;

/// Which of the two training invocations to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Pretrain,
    Finetune,
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Mode::Pretrain => "pretrain",
            Mode::Finetune => "finetune",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pretrain" => Ok(Mode::Pretrain),
            "finetune" => Ok(Mode::Finetune),
            other => bail!("unknown mode '{other}', expected 'pretrain' or 'finetune'"),
        }
    }
}

/// A learning rate that remembers how it was written, so `1e-5` stays `1e-5`
/// in run names and on the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct LearningRate {
    value: f64,
    literal: String,
}

impl LearningRate {
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn as_str(&self) -> &str {
        &self.literal
    }
}

impl FromStr for LearningRate {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let literal = s.trim();
        let value: f64 = literal
            .parse()
            .with_context(|| format!("learning rate '{literal}' is not a number"))?;
        if !value.is_finite() || value <= 0.0 {
            bail!("learning rate must be a positive finite number, got '{literal}'");
        }
        Ok(Self {
            value,
            literal: literal.to_string(),
        })
    }
}

impl fmt::Display for LearningRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.literal)
    }
}

impl Serialize for LearningRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.literal)
    }
}

/// Learning-rate warmup, given either as a step count or as a fraction of training.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Warmup {
    Steps(u32),
    Ratio(f64),
}

impl Warmup {
    pub fn ratio(ratio: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&ratio) {
            bail!("warmup ratio must be in [0, 1), got {ratio}");
        }
        Ok(Warmup::Ratio(ratio))
    }

    pub fn flag(&self) -> &'static str {
        match self {
            Warmup::Steps(_) => "--warmup_steps",
            Warmup::Ratio(_) => "--warmup_ratio",
        }
    }

    pub fn value(&self) -> String {
        match self {
            Warmup::Steps(steps) => steps.to_string(),
            Warmup::Ratio(ratio) => ratio.to_string(),
        }
    }
}

/// Where the trainer reads its data from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Dataset identifier on the model hub.
    Hub(String),
    /// Directory holding `train`/`dev`/`test` splits.
    Directory(PathBuf),
}

impl DataSource {
    pub fn is_hub(&self) -> bool {
        matches!(self, DataSource::Hub(_))
    }

    pub fn location(&self) -> String {
        match self {
            DataSource::Hub(id) => id.clone(),
            DataSource::Directory(path) => path.display().to_string(),
        }
    }
}

/// Accelerator indices visible to the trainer. Never empty, never repeats an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceList(Vec<u32>);

impl DeviceList {
    pub fn new(devices: Vec<u32>) -> Result<Self> {
        if devices.is_empty() {
            bail!("device list is empty");
        }
        let mut seen = HashSet::new();
        for device in &devices {
            if !seen.insert(*device) {
                bail!("device {device} is listed more than once");
            }
        }
        Ok(Self(devices))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn indices(&self) -> &[u32] {
        &self.0
    }
}

impl FromStr for DeviceList {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let devices = s
            .split(',')
            .map(|entry| {
                let entry = entry.trim();
                entry
                    .parse::<u32>()
                    .map_err(|_| anyhow!("invalid device index '{entry}' in '{s}'"))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(devices)
    }
}

impl fmt::Display for DeviceList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(",");
        f.write_str(&joined)
    }
}

impl Serialize for DeviceList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Everything the trainer is told on its command line, plus the tracking labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingConfig {
    pub mode: Mode,
    pub model: String,
    pub output_dir: PathBuf,
    /// Append the run name to `output_dir`.
    pub output_per_run: bool,
    pub data: DataSource,
    pub epochs: u32,
    pub learning_rate: LearningRate,
    pub batch_size: u32,
    pub mini_batch_size: u32,
    pub warmup: Warmup,
    pub logging_steps: u32,
    pub max_seq_length: u32,
    pub save_strategy: String,
    pub resume_from_checkpoint: bool,
    pub test: bool,
    /// Free-form label, not parsed as a date.
    pub date_tag: String,
    pub devices: DeviceList,
    pub project: String,
}

impl TrainingConfig {
    /// The hard-coded constants for `mode`. The two presets differ only in
    /// their data source and warmup schedule.
    pub fn preset(mode: Mode) -> Result<Self> {
        let (data, warmup) = match mode {
            Mode::Finetune => (
                DataSource::Hub(DEFAULT_HF_DATASET.to_string()),
                Warmup::Steps(DEFAULT_WARMUP_STEPS),
            ),
            Mode::Pretrain => (
                DataSource::Directory(PathBuf::from(DEFAULT_PRETRAIN_DIR)),
                Warmup::ratio(DEFAULT_WARMUP_RATIO)?,
            ),
        };
        Ok(Self {
            mode,
            model: DEFAULT_MODEL.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            output_per_run: false,
            data,
            epochs: DEFAULT_EPOCHS,
            learning_rate: DEFAULT_LEARNING_RATE.parse()?,
            batch_size: DEFAULT_BATCH_SIZE,
            mini_batch_size: DEFAULT_MINI_BATCH_SIZE,
            warmup,
            logging_steps: DEFAULT_LOGGING_STEPS,
            max_seq_length: DEFAULT_MAX_SEQ_LENGTH,
            save_strategy: DEFAULT_SAVE_STRATEGY.to_string(),
            resume_from_checkpoint: false,
            test: false,
            date_tag: DEFAULT_DATE_TAG.to_string(),
            devices: DEFAULT_DEVICES.parse()?,
            project: DEFAULT_PROJECT.to_string(),
        })
    }

    /// Batch size divided by eight, truncated. Only used for naming.
    pub fn derived_batch(&self) -> u32 {
        self.batch_size / RUN_NAME_BATCH_DIVISOR
    }

    /// Experiment-tracking name, e.g. `finetune-bs512-ep2-lr1e-5-240919`.
    pub fn run_name(&self) -> String {
        format!(
            "{}-bs{}-ep{}-lr{}-{}",
            self.mode,
            self.derived_batch(),
            self.epochs,
            self.learning_rate,
            self.date_tag
        )
    }

    pub fn resolved_output_dir(&self) -> PathBuf {
        if self.output_per_run {
            self.output_dir.join(self.run_name())
        } else {
            self.output_dir.clone()
        }
    }
}
