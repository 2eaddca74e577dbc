use anyhow::Context;
use async_trait::async_trait;
use tokio::process::Command;

use super::{OpenTarget, SystemBridge};

const DEFAULT_URL: &str = "https://www.google.com";

/// Characters `cmd.exe` treats specially even inside quotes.
const CMD_METACHARACTERS: &[char] = &['&', '|', '<', '>', '^', '"', '%'];

/// Launches desktop programs through the platform's usual helpers.
pub struct DesktopBridge {
    os: &'static str,
}

impl DesktopBridge {
    pub fn new() -> Self {
        Self {
            os: std::env::consts::OS,
        }
    }

    fn open_command(&self, target: &OpenTarget) -> anyhow::Result<Command> {
        let (program, args): (&str, Vec<String>) = match (target, self.os) {
            (OpenTarget::Browser(url), "windows") => {
                let url = url.clone().unwrap_or_else(|| DEFAULT_URL.into());
                if url.contains(CMD_METACHARACTERS) {
                    anyhow::bail!("refusing to pass {url:?} through cmd");
                }
                // `start` takes its first quoted argument as a window title.
                ("cmd", vec!["/C".into(), "start".into(), String::new(), url])
            }
            (OpenTarget::Browser(url), "macos") => {
                ("open", vec![url.clone().unwrap_or_else(|| DEFAULT_URL.into())])
            }
            (OpenTarget::Browser(url), _) => {
                ("xdg-open", vec![url.clone().unwrap_or_else(|| DEFAULT_URL.into())])
            }
            (OpenTarget::Calculator, "windows") => ("calc.exe", vec![]),
            (OpenTarget::Calculator, "macos") => ("open", vec!["-a".into(), "Calculator".into()]),
            (OpenTarget::Calculator, _) => ("gnome-calculator", vec![]),
            (OpenTarget::TextEditor, "windows") => ("notepad.exe", vec![]),
            (OpenTarget::TextEditor, "macos") => ("open", vec!["-a".into(), "TextEdit".into()]),
            (OpenTarget::TextEditor, _) => ("gedit", vec![]),
            (OpenTarget::Path(path), "windows") => ("explorer", vec![path.display().to_string()]),
            (OpenTarget::Path(path), "macos") => ("open", vec![path.display().to_string()]),
            (OpenTarget::Path(path), _) => ("xdg-open", vec![path.display().to_string()]),
        };
        let mut cmd = Command::new(program);
        cmd.args(args);
        Ok(cmd)
    }

    fn notify_command(&self, title: &str, message: &str) -> Command {
        match self.os {
            "windows" => {
                let mut cmd = Command::new("powershell");
                cmd.args([
                    "-Command".to_string(),
                    format!(
                        "Add-Type -AssemblyName System.Windows.Forms; \
                         [System.Windows.Forms.MessageBox]::Show('{}', '{}')",
                        message.replace('\'', "''"),
                        title.replace('\'', "''"),
                    ),
                ]);
                cmd
            }
            "macos" => {
                let mut cmd = Command::new("osascript");
                cmd.args([
                    "-e".to_string(),
                    format!(
                        "display notification \"{}\" with title \"{}\"",
                        message.replace('"', "\\\""),
                        title.replace('"', "\\\""),
                    ),
                ]);
                cmd
            }
            _ => {
                let mut cmd = Command::new("notify-send");
                cmd.args([title, message]);
                cmd
            }
        }
    }
}

impl Default for DesktopBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SystemBridge for DesktopBridge {
    async fn open(&self, target: &OpenTarget) -> anyhow::Result<()> {
        // GUI programs keep running; only the launch itself is checked.
        self.open_command(target)?
            .spawn()
            .with_context(|| format!("failed to open {}", target.describe()))?;
        tracing::info!(opened = %target.describe(), "launched desktop program");
        Ok(())
    }

    async fn notify(&self, title: &str, message: &str) -> anyhow::Result<()> {
        let status = self
            .notify_command(title, message)
            .status()
            .await
            .context("failed to run notification helper")?;
        if !status.success() {
            anyhow::bail!("notification helper exited with {status}");
        }
        Ok(())
    }
}
