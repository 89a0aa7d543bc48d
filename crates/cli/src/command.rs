// Per-item command building and execution
//
// Decision: argument vectors are built by a pure function so they can be
// checked without spawning anything.

use std::process::{ExitStatus, Stdio};

use serde::Serialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Marker replaced with the item in command arguments
pub const PLACEHOLDER: &str = "{}";

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("failed to start `{program}` for {item}: {source}")]
    Spawn {
        program: String,
        item: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` failed for {item} ({status}){}", stderr_suffix(.stderr))]
    Failed {
        program: String,
        item: String,
        status: ExitStatus,
        stderr: String,
    },
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

/// The command to run for every item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    program: String,
    args: Vec<String>,
    has_placeholder: bool,
}

impl CommandTemplate {
    /// Build a template from `program arg...`; `None` when empty
    pub fn from_argv(argv: Vec<String>) -> Option<Self> {
        let mut argv = argv.into_iter();
        let program = argv.next()?;
        let args: Vec<String> = argv.collect();
        let has_placeholder = args.iter().any(|arg| arg.contains(PLACEHOLDER));
        Some(Self {
            program,
            args,
            has_placeholder,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments for one item: `{}` replaced everywhere, or the item appended
    pub fn args_for(&self, item: &str) -> Vec<String> {
        if self.has_placeholder {
            return self
                .args
                .iter()
                .map(|arg| arg.replace(PLACEHOLDER, item))
                .collect();
        }
        let mut args = self.args.clone();
        args.push(item.to_string());
        args
    }
}

/// Outcome of one successful item
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ItemReport {
    pub item: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Run the template for one item and capture its output
pub async fn execute(
    template: &CommandTemplate,
    item: String,
) -> Result<ItemReport, CommandError> {
    let args = template.args_for(&item);
    debug!(program = %template.program, ?args, "Running command");

    let output = Command::new(&template.program)
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| CommandError::Spawn {
            program: template.program.clone(),
            item: item.clone(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(CommandError::Failed {
            program: template.program.clone(),
            item,
            status: output.status,
            stderr: stderr.trim().to_string(),
        });
    }

    debug!(program = %template.program, %item, "Command finished");
    Ok(ItemReport {
        item,
        stdout,
        stderr,
        exit_code: output.status.code(),
    })
}
