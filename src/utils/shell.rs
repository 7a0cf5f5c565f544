use crate::error::{IndicatorError, Result};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::debug;

fn shell_command(command_line: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command_line);
    cmd
}

/// Выполнить команду через `sh -c` и вернуть stdout.
/// Ненулевой код возврата считается ошибкой.
pub async fn run_shell(command_line: &str) -> Result<String> {
    debug!("Выполнение команды: {}", command_line);

    let output = shell_command(command_line)
        .stdin(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        debug!("Команда '{}' вернула ошибку: {}", command_line, stderr);
        return Err(IndicatorError::CommandFailed {
            command: command_line.to_string(),
            status: output.status.to_string(),
            stderr,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Запустить долгоживущий процесс через `sh -c` с перехваченным stdout
pub fn spawn_shell(command_line: &str) -> Result<Child> {
    debug!("Запуск процесса: {}", command_line);

    let child = shell_command(command_line)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    Ok(child)
}
