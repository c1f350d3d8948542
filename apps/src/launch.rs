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

use std::io::ErrorKind;
use std::process::ExitStatus;

use anyhow::{Context, Result};
use thiserror::Error;
use tokio::process::Command;

use crate::plan::LaunchPlan;

/// Shell exit code for a command that could not be found.
pub const EXIT_NOT_FOUND: i32 = 127;
/// Shell exit code for a command that was found but could not be executed.
pub const EXIT_NOT_EXECUTABLE: i32 = 126;

/// The launcher executable could not be started.
#[derive(Debug, Error)]
#[error("failed to start '{program}'")]
pub struct SpawnError {
    pub program: String,
    #[source]
    pub source: std::io::Error,
}

impl SpawnError {
    pub fn exit_code(&self) -> i32 {
        match self.source.kind() {
            ErrorKind::NotFound => EXIT_NOT_FOUND,
            ErrorKind::PermissionDenied => EXIT_NOT_EXECUTABLE,
            _ => 1,
        }
    }
}

/// Run the plan to completion and return the child's exit code.
///
/// The plan's variables are added to the inherited environment. An interrupt
/// while waiting is logged but does not stop the wait: the child gets the
/// terminal's signal on its own and its status is still what we return.
pub async fn run(plan: &LaunchPlan) -> Result<i32> {
    let mut command = Command::new(&plan.program);
    command.args(&plan.args);
    for var in &plan.env {
        command.env(&var.name, &var.value);
    }

    let mut child = command.spawn().map_err(|source| SpawnError {
        program: plan.program.clone(),
        source,
    })?;
    tracing::info!("Started {} (pid {:?})", plan.program, child.id());

    let mut watch_interrupts = true;
    let status = loop {
        tokio::select! {
            status = child.wait() => {
                break status.with_context(|| format!("failed to wait for '{}'", plan.program))?;
            }
            signal = tokio::signal::ctrl_c(), if watch_interrupts => match signal {
                Ok(()) => tracing::warn!("Interrupt received, waiting for {} to exit", plan.program),
                Err(e) => {
                    tracing::debug!("Cannot listen for interrupts: {}", e);
                    watch_interrupts = false;
                }
            },
        }
    };

    let code = exit_code(status);
    if status.success() {
        tracing::info!("{} finished successfully", plan.program);
    } else {
        tracing::warn!("{} exited with code {}", plan.program, code);
    }
    Ok(code)
}

/// Map a child's status to the code a shell would report for it.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// Exit code for a command that failed before any child produced a status.
/// Only a launcher that could not be started gets a shell code; everything
/// else is 1.
pub fn exit_code_for_error(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<SpawnError>()
        .map_or(1, SpawnError::exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_error(kind: ErrorKind) -> anyhow::Error {
        SpawnError {
            program: "torchrun".to_string(),
            source: std::io::Error::from(kind),
        }
        .into()
    }

    #[test]
    fn spawn_errors_map_to_shell_codes() {
        assert_eq!(exit_code_for_error(&spawn_error(ErrorKind::NotFound)), EXIT_NOT_FOUND);
        assert_eq!(
            exit_code_for_error(&spawn_error(ErrorKind::PermissionDenied)),
            EXIT_NOT_EXECUTABLE
        );
        assert_eq!(exit_code_for_error(&spawn_error(ErrorKind::Other)), 1);
    }

    #[test]
    fn other_io_errors_exit_one() {
        let missing_file = anyhow::Error::new(std::io::Error::from(ErrorKind::NotFound))
            .context("failed to read data/train.json");
        assert_eq!(exit_code_for_error(&missing_file), 1);

        let unreadable = anyhow::Error::new(std::io::Error::from(ErrorKind::PermissionDenied));
        assert_eq!(exit_code_for_error(&unreadable), 1);

        assert_eq!(exit_code_for_error(&anyhow::anyhow!("boom")), 1);
    }

    #[cfg(unix)]
    #[test]
    fn signal_status_maps_above_128() {
        use std::os::unix::process::ExitStatusExt;
        // Raw wait status for a child killed by SIGKILL.
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 137);
        // Raw wait status for a normal exit with code 3.
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
    }
}
