use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;

use crate::llm::{InferenceError, OllamaClient};
use crate::session::SessionEvent;

const WINDOWS_INSTALLER_URL: &str = "https://ollama.com/download/OllamaSetup.exe";
const MACOS_INSTALLER_URL: &str = "https://ollama.com/download/Ollama-darwin.zip";
const LINUX_INSTALL_SCRIPT_URL: &str = "https://ollama.com/install.sh";

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("A model download is already running. Please wait for it to finish.")]
    PullInFlight,
    #[error("An install job is already running.")]
    InstallInFlight,
    #[error("Failed to download model: {0}")]
    PullFailed(String),
    #[error("Installation failed: {0}")]
    InstallFailed(String),
    #[error("Unsupported OS: {0}")]
    UnsupportedPlatform(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionKind {
    Install,
    Pull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionPhase {
    Detecting,
    Downloading,
    Installing,
    Starting,
    Done,
    Failed,
}

/// Snapshot of a long-running install or pull job, delivered to the
/// interactive loop as progress events.
#[derive(Debug, Clone)]
pub struct ProvisionJob {
    pub kind: ProvisionKind,
    pub target: String,
    pub phase: ProvisionPhase,
    pub progress: String,
}

impl ProvisionJob {
    pub fn is_finished(&self) -> bool {
        matches!(self.phase, ProvisionPhase::Done | ProvisionPhase::Failed)
    }

    pub fn succeeded(&self) -> bool {
        self.phase == ProvisionPhase::Done
    }
}

/// Outcome of the first-run service check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Service answered the first probe.
    Reachable(Vec<String>),
    /// Service answered after we launched it ourselves.
    StartedAfterLaunch(Vec<String>),
    /// Service is neither running nor launchable; an install is needed.
    InstallRequired,
}

/// Matches a requested model name against the installed listing, tolerating
/// tag suffix differences in either direction (`llama3.2` matches
/// `llama3.2:1b` and vice versa).
pub fn model_matches(requested: &str, installed: &[String]) -> bool {
    installed
        .iter()
        .any(|name| name.contains(requested) || requested.contains(name.as_str()))
}

/// Owns the install/pull lifecycle against the local inference service.
/// Pull and install jobs are single-flight: the flags set here are cleared
/// by the interactive loop when the matching terminal event arrives.
pub struct ModelProvisioner {
    client: OllamaClient,
    restart_delay: Duration,
    pull_in_flight: bool,
    install_in_flight: bool,
}

impl ModelProvisioner {
    pub fn new(client: OllamaClient, restart_delay_secs: u64) -> Self {
        Self {
            client,
            restart_delay: Duration::from_secs(restart_delay_secs),
            pull_in_flight: false,
            install_in_flight: false,
        }
    }

    pub fn pull_in_flight(&self) -> bool {
        self.pull_in_flight
    }

    pub async fn installed_models(&self) -> Result<Vec<String>, InferenceError> {
        self.client.list_models().await
    }

    /// Starts `ollama pull <model>` in the background. A second pull while
    /// one is running is rejected; the running pull is untouched.
    pub fn begin_pull(
        &mut self,
        model: &str,
        tx: &UnboundedSender<SessionEvent>,
    ) -> Result<(), ProvisionError> {
        if self.pull_in_flight {
            return Err(ProvisionError::PullInFlight);
        }
        self.pull_in_flight = true;

        let model = model.to_string();
        let tx = tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(SessionEvent::Provision(ProvisionJob {
                kind: ProvisionKind::Pull,
                target: model.clone(),
                phase: ProvisionPhase::Downloading,
                progress: format!(
                    "Downloading model '{}'... This may take a few minutes.",
                    model
                ),
            }));

            let job = match run_pull(&model).await {
                Ok(()) => ProvisionJob {
                    kind: ProvisionKind::Pull,
                    target: model.clone(),
                    phase: ProvisionPhase::Done,
                    progress: format!(
                        "Model '{}' downloaded successfully! You can start chatting now.",
                        model
                    ),
                },
                Err(e) => ProvisionJob {
                    kind: ProvisionKind::Pull,
                    target: model.clone(),
                    phase: ProvisionPhase::Failed,
                    progress: e.to_string(),
                },
            };
            let _ = tx.send(SessionEvent::Provision(job));
        });

        Ok(())
    }

    /// Starts the platform installer in the background, reporting phase
    /// changes as events. Ends by launching the service.
    pub fn begin_install(
        &mut self,
        tx: &UnboundedSender<SessionEvent>,
    ) -> Result<(), ProvisionError> {
        if self.install_in_flight {
            return Err(ProvisionError::InstallInFlight);
        }
        self.install_in_flight = true;

        let tx = tx.clone();
        tokio::spawn(async move {
            report(&tx, ProvisionPhase::Detecting, "Detecting your operating system...");
            match install_for_platform(&tx).await {
                Ok(()) => report(&tx, ProvisionPhase::Done, "Ollama installed successfully!"),
                Err(e) => report(&tx, ProvisionPhase::Failed, &e.to_string()),
            }
        });

        Ok(())
    }

    /// Interactive-loop acknowledgement that a job reached a terminal
    /// phase; re-opens the single-flight slot.
    pub fn job_finished(&mut self, job: &ProvisionJob) {
        match job.kind {
            ProvisionKind::Pull => self.pull_in_flight = false,
            ProvisionKind::Install => self.install_in_flight = false,
        }
    }

    /// First-run bootstrap: probe the service; if it doesn't answer, launch
    /// it and re-probe after a fixed delay.
    pub async fn check_service(&self) -> ServiceStatus {
        if let Ok(models) = self.client.list_models().await {
            return ServiceStatus::Reachable(models);
        }

        if start_service().is_err() {
            return ServiceStatus::InstallRequired;
        }

        tokio::time::sleep(self.restart_delay).await;

        match self.client.list_models().await {
            Ok(models) => ServiceStatus::StartedAfterLaunch(models),
            Err(_) => ServiceStatus::InstallRequired,
        }
    }
}

/// Launches the service as a detached background process.
pub fn start_service() -> std::io::Result<()> {
    let (program, args) = serve_command();
    Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
}

fn serve_command() -> (&'static str, [&'static str; 1]) {
    if cfg!(target_os = "macos") {
        ("/Applications/Ollama.app/Contents/MacOS/ollama", ["serve"])
    } else {
        ("ollama", ["serve"])
    }
}

async fn run_pull(model: &str) -> Result<(), ProvisionError> {
    let output = Command::new("ollama")
        .args(["pull", model])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ProvisionError::PullFailed(e.to_string()))?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(ProvisionError::PullFailed(if stderr.is_empty() {
            format!("pull exited with {}", output.status)
        } else {
            stderr
        }))
    }
}

fn report(tx: &UnboundedSender<SessionEvent>, phase: ProvisionPhase, text: &str) {
    let _ = tx.send(SessionEvent::Provision(ProvisionJob {
        kind: ProvisionKind::Install,
        target: "ollama".to_string(),
        phase,
        progress: text.to_string(),
    }));
}

async fn install_for_platform(tx: &UnboundedSender<SessionEvent>) -> Result<(), ProvisionError> {
    if cfg!(target_os = "windows") {
        install_windows(tx).await
    } else if cfg!(target_os = "macos") {
        install_macos(tx).await
    } else if cfg!(target_os = "linux") {
        install_linux(tx).await
    } else {
        Err(ProvisionError::UnsupportedPlatform(
            std::env::consts::OS.to_string(),
        ))
    }
}

async fn install_windows(tx: &UnboundedSender<SessionEvent>) -> Result<(), ProvisionError> {
    report(tx, ProvisionPhase::Downloading, "Downloading Ollama for Windows...");
    let bytes = fetch_bytes(WINDOWS_INSTALLER_URL).await?;
    let installer_path = std::env::temp_dir().join("OllamaSetup.exe");
    std::fs::write(&installer_path, &bytes)
        .map_err(|e| ProvisionError::InstallFailed(e.to_string()))?;

    report(tx, ProvisionPhase::Installing, "Running installer...");
    let status = Command::new(&installer_path)
        .arg("/S")
        .status()
        .await
        .map_err(|e| ProvisionError::InstallFailed(e.to_string()))?;
    if !status.success() {
        return Err(ProvisionError::InstallFailed(format!(
            "installer exited with {}",
            status
        )));
    }

    report(tx, ProvisionPhase::Starting, "Installation complete! Starting Ollama...");
    start_service().map_err(|e| ProvisionError::InstallFailed(e.to_string()))
}

async fn install_macos(tx: &UnboundedSender<SessionEvent>) -> Result<(), ProvisionError> {
    report(tx, ProvisionPhase::Downloading, "Downloading Ollama for macOS...");
    let bytes = fetch_bytes(MACOS_INSTALLER_URL).await?;
    let archive_path = std::env::temp_dir().join("Ollama.zip");
    std::fs::write(&archive_path, &bytes)
        .map_err(|e| ProvisionError::InstallFailed(e.to_string()))?;

    report(tx, ProvisionPhase::Installing, "Installing...");
    let status = Command::new("unzip")
        .arg("-o")
        .arg(&archive_path)
        .args(["-d", "/Applications/"])
        .status()
        .await
        .map_err(|e| ProvisionError::InstallFailed(e.to_string()))?;
    if !status.success() {
        return Err(ProvisionError::InstallFailed(format!(
            "unzip exited with {}",
            status
        )));
    }

    report(tx, ProvisionPhase::Starting, "Starting Ollama...");
    start_service().map_err(|e| ProvisionError::InstallFailed(e.to_string()))
}

async fn install_linux(tx: &UnboundedSender<SessionEvent>) -> Result<(), ProvisionError> {
    report(tx, ProvisionPhase::Downloading, "Downloading the Ollama install script...");
    let script = fetch_text(LINUX_INSTALL_SCRIPT_URL).await?;

    report(tx, ProvisionPhase::Installing, "Installing Ollama for Linux...");
    let status = Command::new("sh")
        .arg("-c")
        .arg(script)
        .status()
        .await
        .map_err(|e| ProvisionError::InstallFailed(e.to_string()))?;
    if !status.success() {
        return Err(ProvisionError::InstallFailed(format!(
            "install script exited with {}",
            status
        )));
    }

    report(tx, ProvisionPhase::Starting, "Starting Ollama...");
    start_service().map_err(|e| ProvisionError::InstallFailed(e.to_string()))
}

async fn fetch_bytes(url: &str) -> Result<Vec<u8>, ProvisionError> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| ProvisionError::InstallFailed(e.to_string()))?;
    if !response.status().is_success() {
        return Err(ProvisionError::InstallFailed(format!(
            "download failed with status {}",
            response.status()
        )));
    }
    response
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| ProvisionError::InstallFailed(e.to_string()))
}

async fn fetch_text(url: &str) -> Result<String, ProvisionError> {
    let bytes = fetch_bytes(url).await?;
    String::from_utf8(bytes).map_err(|e| ProvisionError::InstallFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use tokio::sync::mpsc;

    fn installed() -> Vec<String> {
        vec!["llama3.2:1b".to_string(), "llava:latest".to_string()]
    }

    #[test]
    fn test_match_tolerates_tag_suffixes() {
        assert!(model_matches("llama3.2", &installed()));
        assert!(model_matches("llama3.2:1b", &installed()));
        assert!(model_matches("llava", &installed()));
    }

    #[test]
    fn test_match_rejects_unrelated_names() {
        assert!(!model_matches("phi3", &installed()));
        assert!(!model_matches("mistral", &installed()));
    }

    #[test]
    fn test_match_reverse_containment() {
        // Requested carries a tag the installed listing lacks.
        let bare = vec!["llama3.2".to_string()];
        assert!(model_matches("llama3.2:1b", &bare));
    }

    #[test]
    fn test_job_phase_predicates() {
        let mut job = ProvisionJob {
            kind: ProvisionKind::Pull,
            target: "llama3.2".to_string(),
            phase: ProvisionPhase::Downloading,
            progress: String::new(),
        };
        assert!(!job.is_finished());
        job.phase = ProvisionPhase::Done;
        assert!(job.is_finished() && job.succeeded());
        job.phase = ProvisionPhase::Failed;
        assert!(job.is_finished() && !job.succeeded());
    }

    #[tokio::test]
    async fn test_pull_is_single_flight() {
        let client = OllamaClient::new(&ServiceConfig::default()).unwrap();
        let mut provisioner = ModelProvisioner::new(client, 0);
        let (tx, mut rx) = mpsc::unbounded_channel();

        provisioner.begin_pull("no-such-model:0b", &tx).unwrap();
        let second = provisioner.begin_pull("phi3", &tx);
        assert!(matches!(second, Err(ProvisionError::PullInFlight)));

        // Drain the job to its terminal phase (the pull fails fast, whether
        // or not the binary exists, since the model name is bogus).
        let mut terminal = None;
        while let Some(SessionEvent::Provision(job)) = rx.recv().await {
            // Only the first pull's events exist; the rejected one sent nothing.
            assert_eq!(job.target, "no-such-model:0b");
            if job.is_finished() {
                terminal = Some(job);
                break;
            }
        }

        provisioner.job_finished(&terminal.unwrap());
        assert!(!provisioner.pull_in_flight());
        assert!(provisioner.begin_pull("phi3", &tx).is_ok());
    }
}
