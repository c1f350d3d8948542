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

//! Triplet data directories: split discovery, loading and merging.
//!
//! A data directory holds `train`, `dev` and `test` splits, each either a JSON
//! array (`train.json`) or JSON lines (`train.jsonl`). Records carry a `query`,
//! a positive `document` and an optional `hard_negative`; any of them may be a
//! list, in which case only its first element is used.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::DataSource;

pub const QUERY_PREFIX: &str = "query: ";
pub const PASSAGE_PREFIX: &str = "passage: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Dev,
    Test,
}

impl Split {
    pub fn name(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Dev => "dev",
            Split::Test => "test",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitFormat {
    Json,
    JsonLines,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Triplet {
    pub query: String,
    pub positive: String,
    pub negative: Option<String>,
}

impl Triplet {
    /// The same triplet with the E5 `query: ` / `passage: ` prefixes applied.
    pub fn with_prefixes(&self) -> Triplet {
        Triplet {
            query: format!("{QUERY_PREFIX}{}", self.query),
            positive: format!("{PASSAGE_PREFIX}{}", self.positive),
            negative: self
                .negative
                .as_ref()
                .map(|n| format!("{PASSAGE_PREFIX}{n}")),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Field {
    One(String),
    Many(Vec<String>),
}

impl Field {
    fn first(self, name: &str) -> Result<String> {
        match self {
            Field::One(s) => Ok(s),
            Field::Many(list) => list
                .into_iter()
                .next()
                .with_context(|| format!("'{name}' is an empty list")),
        }
    }
}

#[derive(Deserialize)]
struct Record {
    query: Field,
    document: Field,
    #[serde(default)]
    hard_negative: Option<Field>,
}

impl Record {
    fn into_triplet(self) -> Result<Triplet> {
        Ok(Triplet {
            query: self.query.first("query")?,
            positive: self.document.first("document")?,
            negative: self
                .hard_negative
                .map(|n| n.first("hard_negative"))
                .transpose()?,
        })
    }
}

/// Locate a split, preferring `<split>.json` over `<split>.jsonl`.
pub fn find_split(dir: &Path, split: Split) -> Result<(PathBuf, SplitFormat)> {
    let json = dir.join(format!("{}.json", split.name()));
    if json.is_file() {
        return Ok((json, SplitFormat::Json));
    }
    let jsonl = dir.join(format!("{}.jsonl", split.name()));
    if jsonl.is_file() {
        return Ok((jsonl, SplitFormat::JsonLines));
    }
    bail!(
        "no {} split in {} (expected {0}.json or {0}.jsonl)",
        split.name(),
        dir.display()
    );
}

pub fn load_split(dir: &Path, split: Split) -> Result<Vec<Triplet>> {
    let (path, format) = find_split(dir, split)?;
    let contents =
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let contents = contents.strip_prefix('\u{feff}').unwrap_or(&contents);

    let records: Vec<Record> = match format {
        SplitFormat::Json => serde_json::from_str(contents)
            .with_context(|| format!("failed to parse {}", path.display()))?,
        SplitFormat::JsonLines => contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line)
                    .with_context(|| format!("failed to parse {} line {}", path.display(), i + 1))
            })
            .collect::<Result<_>>()?,
    };

    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            record
                .into_triplet()
                .with_context(|| format!("record {} of {}", i, path.display()))
        })
        .collect()
}

/// Sanity check of a directory data source before handing it to the trainer.
/// Hub datasets are resolved by the trainer and are not checked here.
pub fn check_source(source: &DataSource) -> Result<()> {
    let dir = match source {
        DataSource::Hub(id) => {
            tracing::debug!("Skipping data check for hub dataset {}", id);
            return Ok(());
        }
        DataSource::Directory(dir) => dir,
    };

    let train = load_split(dir, Split::Train)?;
    if train.is_empty() {
        bail!("train split in {} is empty", dir.display());
    }
    let with_negatives = train.iter().filter(|t| t.negative.is_some()).count();
    tracing::info!(
        "Train split: {} triplets, {} with hard negatives",
        train.len(),
        with_negatives
    );

    for split in [Split::Dev, Split::Test] {
        match find_split(dir, split) {
            Ok((path, _)) => tracing::info!("Found {} split at {}", split.name(), path.display()),
            Err(_) => tracing::debug!("No {} split in {}", split.name(), dir.display()),
        }
    }
    Ok(())
}

/// Concatenate JSON array files into one pretty-printed array.
pub fn merge_files(inputs: &[PathBuf], output: &Path) -> Result<usize> {
    let mut merged: Vec<serde_json::Value> = Vec::new();
    for input in inputs {
        let contents = fs::read_to_string(input)
            .with_context(|| format!("failed to read {}", input.display()))?;
        let items: Vec<serde_json::Value> = serde_json::from_str(&contents)
            .with_context(|| format!("{} is not a JSON array", input.display()))?;
        tracing::debug!("{}: {} records", input.display(), items.len());
        merged.extend(items);
    }

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    merged.serialize(&mut ser)?;
    fs::write(output, buf).with_context(|| format!("failed to write {}", output.display()))?;
    Ok(merged.len())
}
