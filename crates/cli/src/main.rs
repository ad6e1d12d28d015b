//! OpenMica CLI
//!
//! Command-line interface for controlling the OpenMica daemon.
//!
//! Commands are sent to the daemon via IPC (named pipe).

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use openmica_core_rules::TitlebarColorMode;
use openmica_ipc::{IpcCommand, IpcResponse, RuleInfo};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "openmica-cli")]
#[command(author, version, about = "Control the OpenMica styling daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reload configuration
    Reload,
    /// Load configuration from another file
    Config {
        /// Path to a config.toml
        path: PathBuf,
    },
    /// Restyle every open window
    Reapply,
    /// Set the titlebar default used by rules with `titlebar_color = "system"`
    SystemTitlebar {
        #[arg(value_enum)]
        mode: SystemTheme,
    },
    /// List the active rules
    Rules,
    /// Show which rule applies to a window
    Match {
        /// Window handle, decimal or 0x-prefixed hex
        #[arg(value_parser = parse_handle)]
        handle: u64,
    },
    /// Show daemon status
    Status,
    /// Stop the daemon
    Stop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SystemTheme {
    Light,
    Dark,
}

impl From<SystemTheme> for TitlebarColorMode {
    fn from(theme: SystemTheme) -> Self {
        match theme {
            SystemTheme::Light => TitlebarColorMode::Light,
            SystemTheme::Dark => TitlebarColorMode::Dark,
        }
    }
}

fn parse_handle(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid window handle {:?}: {}", s, e))
}

impl Commands {
    fn into_ipc(self) -> Result<IpcCommand> {
        Ok(match self {
            Commands::Reload => IpcCommand::Reload,
            Commands::Config { path } => {
                let path = std::path::absolute(&path)
                    .with_context(|| format!("Invalid path: {}", path.display()))?;
                IpcCommand::SetConfigPath {
                    path: path.display().to_string(),
                }
            }
            Commands::Reapply => IpcCommand::Reapply,
            Commands::SystemTitlebar { mode } => IpcCommand::SetSystemTitlebar { mode: mode.into() },
            Commands::Rules => IpcCommand::QueryRules,
            Commands::Match { handle } => IpcCommand::MatchWindow { handle },
            Commands::Status => IpcCommand::Status,
            Commands::Stop => IpcCommand::Stop,
        })
    }
}

fn describe_rule(rule: &RuleInfo) -> String {
    let mut criteria = Vec::new();
    if rule.global {
        criteria.push("*".to_string());
    }
    if let Some(class) = &rule.match_class {
        criteria.push(format!("class={}", class));
    }
    if let Some(title) = &rule.match_title {
        criteria.push(format!("title={}", title));
    }
    if let Some(process) = &rule.match_process {
        criteria.push(format!("process={}", process));
    }

    format!(
        "{:<16} [{}] titlebar={:?} backdrop={:?}{}",
        rule.name,
        criteria.join(" "),
        rule.titlebar_color,
        rule.backdrop,
        if rule.extend_frame { " extend-frame" } else { "" }
    )
}

/// Turn a daemon response into the text printed for the user.
fn render(response: IpcResponse) -> Result<String> {
    Ok(match response {
        IpcResponse::Ok => "OK".to_string(),
        IpcResponse::Error { message } => bail!("{}", message),
        IpcResponse::Rules { rules } => {
            if rules.is_empty() {
                "No rules loaded".to_string()
            } else {
                rules.iter().map(describe_rule).collect::<Vec<_>>().join("\n")
            }
        }
        IpcResponse::MatchResult { rule } => match rule {
            Some(name) => format!("Matched rule: {}", name),
            None => "No rule applies".to_string(),
        },
        IpcResponse::Status {
            running,
            rule_count,
            watching,
            config_path,
            system_titlebar,
        } => format!(
            "Service:          {}\nRules:            {}\nConfig:           {}\nWatching config:  {}\nSystem titlebar:  {:?}",
            if running { "running" } else { "stopped" },
            rule_count,
            config_path.as_deref().unwrap_or("(defaults)"),
            if watching { "yes" } else { "no" },
            system_titlebar
        ),
    })
}

/// Send one command to the daemon and read its response.
#[cfg(windows)]
async fn send_command(cmd: &IpcCommand) -> Result<IpcResponse> {
    use openmica_ipc::{decode_line, encode_line, PIPE_NAME};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::windows::named_pipe::ClientOptions;

    let pipe = ClientOptions::new()
        .open(PIPE_NAME)
        .context("Could not connect to the daemon. Is openmica running?")?;

    let (reader, mut writer) = tokio::io::split(pipe);
    writer.write_all(encode_line(cmd)?.as_bytes()).await?;
    writer.flush().await?;

    let mut line = String::new();
    BufReader::new(reader)
        .read_line(&mut line)
        .await
        .context("Failed to read response from daemon")?;

    Ok(decode_line(&line)?)
}

#[cfg(not(windows))]
async fn send_command(_cmd: &IpcCommand) -> Result<IpcResponse> {
    bail!("OpenMica only runs on Windows")
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cmd = cli.command.into_ipc()?;
    let response = send_command(&cmd).await?;
    println!("{}", render(response)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use openmica_core_rules::BackdropPreference;

    fn parse(args: &[&str]) -> IpcCommand {
        let mut argv = vec!["openmica-cli"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().command.into_ipc().unwrap()
    }

    #[test]
    fn test_subcommands_map_to_ipc_commands() {
        assert_eq!(parse(&["reload"]), IpcCommand::Reload);
        assert_eq!(parse(&["reapply"]), IpcCommand::Reapply);
        assert_eq!(parse(&["rules"]), IpcCommand::QueryRules);
        assert_eq!(parse(&["status"]), IpcCommand::Status);
        assert_eq!(parse(&["stop"]), IpcCommand::Stop);
    }

    #[test]
    fn test_system_titlebar_accepts_light_and_dark_only() {
        assert_eq!(
            parse(&["system-titlebar", "dark"]),
            IpcCommand::SetSystemTitlebar {
                mode: TitlebarColorMode::Dark
            }
        );
        assert!(Cli::try_parse_from(["openmica-cli", "system-titlebar", "system"]).is_err());
    }

    #[test]
    fn test_match_parses_decimal_and_hex_handles() {
        assert_eq!(
            parse(&["match", "65802"]),
            IpcCommand::MatchWindow { handle: 65802 }
        );
        assert_eq!(
            parse(&["match", "0x1010A"]),
            IpcCommand::MatchWindow { handle: 0x1010a }
        );
        assert!(Cli::try_parse_from(["openmica-cli", "match", "notepad"]).is_err());
    }

    #[test]
    fn test_config_path_is_made_absolute() {
        match parse(&["config", "my-config.toml"]) {
            IpcCommand::SetConfigPath { path } => {
                assert!(PathBuf::from(&path).is_absolute());
                assert!(path.ends_with("my-config.toml"));
            }
            other => panic!("Expected SetConfigPath, got {:?}", other),
        }
    }

    #[test]
    fn test_render_error_becomes_err() {
        let err = render(IpcResponse::error("Reload failed")).unwrap_err();
        assert_eq!(err.to_string(), "Reload failed");
    }

    #[test]
    fn test_render_match_result() {
        assert_eq!(
            render(IpcResponse::MatchResult {
                rule: Some("terminal".to_string())
            })
            .unwrap(),
            "Matched rule: terminal"
        );
        assert_eq!(
            render(IpcResponse::MatchResult { rule: None }).unwrap(),
            "No rule applies"
        );
    }

    #[test]
    fn test_render_rules() {
        let rules = vec![
            RuleInfo {
                name: "global".to_string(),
                global: true,
                match_class: None,
                match_title: None,
                match_process: None,
                titlebar_color: TitlebarColorMode::System,
                backdrop: BackdropPreference::Mica,
                extend_frame: false,
            },
            RuleInfo {
                name: "terminal".to_string(),
                global: false,
                match_class: None,
                match_title: None,
                match_process: Some("WindowsTerminal.exe".to_string()),
                titlebar_color: TitlebarColorMode::Dark,
                backdrop: BackdropPreference::Acrylic,
                extend_frame: true,
            },
        ];
        let text = render(IpcResponse::Rules { rules }).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("global"));
        assert!(lines[0].contains("[*]"));
        assert!(lines[1].contains("process=WindowsTerminal.exe"));
        assert!(lines[1].ends_with("extend-frame"));
    }

    #[test]
    fn test_render_status_without_config_file() {
        let text = render(IpcResponse::Status {
            running: true,
            rule_count: 1,
            watching: false,
            config_path: None,
            system_titlebar: TitlebarColorMode::Light,
        })
        .unwrap();
        assert!(text.contains("running"));
        assert!(text.contains("(defaults)"));
        assert!(text.contains("Light"));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_send_command_unsupported_off_windows() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let err = rt.block_on(send_command(&IpcCommand::Status)).unwrap_err();
        assert!(err.to_string().contains("Windows"));
    }
}
