//! Host and runtime metadata attached to every payload.
//!
//! Version probing shells out once at configuration time, bounded by the same
//! two-second deadline as the transport, and degrades to "unknown".

use chrono::Local;
use serde::Serialize;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Operating system description.
#[derive(Debug, Clone, Serialize)]
pub struct OsInfo {
    pub name: String,
    pub release: String,
    pub architecture: String,
}

/// Host environment description.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub ip: String,
    pub timezone: String,
    pub software: String,
    pub signature: String,
    pub protocol: String,
    pub os: OsInfo,
}

/// Runtime language description.
#[derive(Debug, Clone, Serialize)]
pub struct LanguageInfo {
    pub name: String,
    pub version: String,
}

impl ServerInfo {
    /// Probe the host once. Best-effort; missing details become "unknown".
    pub async fn detect() -> Self {
        let offset_secs = Local::now().offset().local_minus_utc();
        Self {
            ip: "127.0.0.1".to_string(),
            timezone: format!("UTC{:+}", offset_secs / 3600),
            software: format!("apipulse/{}", crate::VERSION),
            signature: "apipulse Rust SDK".to_string(),
            protocol: "HTTP/1.1".to_string(),
            os: OsInfo {
                name: std::env::consts::OS.to_string(),
                release: os_release().await,
                architecture: std::env::consts::ARCH.to_string(),
            },
        }
    }
}

impl LanguageInfo {
    /// Probe the toolchain version from `rustc`.
    pub async fn detect() -> Self {
        let mut command = Command::new("rustc");
        command.arg("--version");
        Self {
            name: "rust".to_string(),
            version: probe(&mut command).await,
        }
    }
}

async fn os_release() -> String {
    let mut command = match std::env::consts::OS {
        "macos" => {
            let mut c = Command::new("sw_vers");
            c.arg("-productVersion");
            c
        }
        "linux" => {
            let mut c = Command::new("uname");
            c.arg("-r");
            c
        }
        "windows" => {
            let mut c = Command::new("cmd");
            c.args(["/c", "ver"]);
            c
        }
        _ => return "unknown".to_string(),
    };
    probe(&mut command).await
}

async fn probe(command: &mut Command) -> String {
    match timeout(PROBE_TIMEOUT, command.output()).await {
        Ok(Ok(output)) if output.status.success() => {
            let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if text.is_empty() {
                "unknown".to_string()
            } else {
                text
            }
        }
        _ => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_info_is_populated() {
        let server = ServerInfo::detect().await;
        assert_eq!(server.os.name, std::env::consts::OS);
        assert_eq!(server.os.architecture, std::env::consts::ARCH);
        assert!(server.timezone.starts_with("UTC"));
        assert!(!server.os.release.is_empty());
    }

    #[tokio::test]
    async fn test_language_info_degrades_gracefully() {
        let language = LanguageInfo::detect().await;
        assert_eq!(language.name, "rust");
        // Either a real `rustc --version` line or the fallback.
        assert!(!language.version.is_empty());
    }

    #[tokio::test]
    async fn test_probe_of_missing_binary_is_unknown() {
        let mut command = Command::new("definitely-not-a-real-binary-apipulse");
        assert_eq!(probe(&mut command).await, "unknown");
    }
}
