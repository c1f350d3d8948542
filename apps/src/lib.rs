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

//! Launcher for distributed fine-tuning and pretraining of a multilingual
//! text-embedding model.
//!
//! A [`config::TrainingConfig`] holds the hyperparameters, [`plan::LaunchPlan`]
//! turns them into environment variables and a command line, and
//! [`launch::run`] executes that command and reports its exit code.

pub mod cli;
pub mod config;
pub mod data;
pub mod launch;
pub mod plan;
