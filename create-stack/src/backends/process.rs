use log::debug;
use std::process::Command;

use crate::error::{Error, Result};

/// Runs `command` to completion and returns its stdout. A command that can't
/// be spawned or exits non-zero becomes an `ExternalTool` error carrying the
/// combined output.
pub fn execute(command: &mut Command) -> Result<String> {
    let description = describe(command);
    debug!("running {}", description);

    let output = command.output().map_err(|err| Error::ExternalTool {
        command: description.clone(),
        output: err.to_string(),
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !output.status.success() {
        return Err(Error::ExternalTool {
            command: description,
            output: format!("{}{}", stdout, stderr).trim().to_owned(),
        });
    }

    debug!("{}", stdout.trim());
    Ok(stdout)
}

/// Renders a command for error messages. Long arguments, such as package
/// lists passed as build args, are shortened.
pub fn describe(command: &Command) -> String {
    const MAX_ARGUMENT_LEN: usize = 64;

    let mut description = command.get_program().to_string_lossy().into_owned();
    for arg in command.get_args() {
        let arg = arg.to_string_lossy();
        description.push(' ');
        if arg.chars().count() > MAX_ARGUMENT_LEN {
            description.extend(arg.chars().take(MAX_ARGUMENT_LEN));
            description.push_str("...");
        } else {
            description.push_str(&arg);
        }
    }

    description
}
