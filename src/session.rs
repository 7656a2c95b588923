use anyhow::Result;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task;

use crate::browser::BrowserControl;
use crate::chat::ConversationHistory;
use crate::config::BrowserConfig;
use crate::downloads::DownloadTracker;
use crate::llm::{self, InferenceError, InferenceRequest, OllamaClient};
use crate::nav_parser::{self, CommandOrigin};
use crate::prompts;
use crate::provision::{
    model_matches, ModelProvisioner, ProvisionError, ProvisionJob, ProvisionKind, ServiceStatus,
};

/// Messages delivered from background workers to the interactive loop.
pub enum SessionEvent {
    ReplyReady { text: String, elapsed_ms: i64 },
    InferenceFailed(InferenceError),
    Provision(ProvisionJob),
}

/// Deferred user intent, resumed once its precondition holds. A single
/// slot: a second deferral overwrites the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    ScreenshotAnalysis,
}

/// Transcript lines produced by session operations, drained by the
/// front-end after each operation or event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Note {
    Assistant(String),
    System(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    Switched,
    NotInstalled,
    ServiceUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenshotOutcome {
    Dispatched,
    NeedsVisionModel { current: String, suggested: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Ready,
    NoModels,
    InstallRequired,
}

/// A decision the front-end must put to the user after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    OfferStarterModel(String),
}

/// Per-window session state: conversation, current model, pending action,
/// and the single-flight inference slot. All mutation happens on the
/// interactive loop; background workers only report back through the event
/// channel.
pub struct Session {
    pub config: BrowserConfig,
    pub history: ConversationHistory,
    pub current_model: String,
    pub installed_models: Vec<String>,
    pub pending_action: Option<PendingAction>,
    pub downloads: DownloadTracker,
    provisioner: ModelProvisioner,
    client: OllamaClient,
    browser: Box<dyn BrowserControl>,
    tx: UnboundedSender<SessionEvent>,
    rx: UnboundedReceiver<SessionEvent>,
    in_flight: bool,
    last_reply_ms: Option<i64>,
    notes: Vec<Note>,
}

impl Session {
    pub fn new(config: BrowserConfig, browser: Box<dyn BrowserControl>) -> Result<Self> {
        let client = OllamaClient::new(&config.service)?;
        let provisioner = ModelProvisioner::new(client.clone(), config.service.restart_delay_secs);
        let (tx, rx) = mpsc::unbounded_channel();

        Ok(Self {
            current_model: config.models.default_model.clone(),
            history: ConversationHistory::new(prompts::CAPABILITY_PREAMBLE),
            installed_models: Vec::new(),
            pending_action: None,
            downloads: DownloadTracker::new(),
            provisioner,
            client,
            browser,
            tx,
            rx,
            in_flight: false,
            last_reply_ms: None,
            notes: Vec::new(),
            config,
        })
    }

    pub fn is_processing(&self) -> bool {
        self.in_flight
    }

    pub fn last_reply_ms(&self) -> Option<i64> {
        self.last_reply_ms
    }

    pub fn take_notes(&mut self) -> Vec<Note> {
        std::mem::take(&mut self.notes)
    }

    fn note(&mut self, text: impl Into<String>) {
        self.notes.push(Note::System(text.into()));
    }

    /// Next background event; resolves once a worker reports back.
    pub async fn recv_event(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    // ---- chat turns ----

    /// Appends a user turn and dispatches it. Fails synchronously while a
    /// request is outstanding, leaving both the history and the outstanding
    /// request untouched.
    pub fn send_message(&mut self, text: &str) -> Result<(), InferenceError> {
        if self.in_flight {
            return Err(InferenceError::AlreadyInFlight);
        }
        self.history.push_user(text);
        self.submit(None)
    }

    /// Captures the active page's text, folds it into an analysis turn and
    /// dispatches it.
    pub async fn analyze_page(&mut self) -> Result<()> {
        if self.in_flight {
            return Err(InferenceError::AlreadyInFlight.into());
        }
        let content = self.browser.page_text().await?;
        let content = prompts::truncate_content(&content, self.config.page.max_content_len);
        let message = prompts::page_analysis_message(
            &self.browser.current_url(),
            &self.browser.current_title(),
            &content,
        );
        self.history.push_user(&message);
        self.submit(None)?;
        Ok(())
    }

    /// Screenshot analysis needs a vision-capable model. When the current
    /// model isn't one, the caller is handed a decision point instead of a
    /// dispatched request.
    pub async fn request_screenshot(&mut self) -> Result<ScreenshotOutcome> {
        if self.in_flight {
            return Err(InferenceError::AlreadyInFlight.into());
        }
        if !llm::is_vision_model(&self.current_model, &self.config.models.vision_fragments) {
            return Ok(ScreenshotOutcome::NeedsVisionModel {
                current: self.current_model.clone(),
                suggested: self.config.models.suggested_vision_model.clone(),
            });
        }
        self.capture_and_submit().await?;
        Ok(ScreenshotOutcome::Dispatched)
    }

    /// The user accepted switching to the suggested vision model; remember
    /// the screenshot intent and run the switch. The intent survives an
    /// install offer and is resumed when the model becomes current.
    pub async fn accept_vision_switch(&mut self) -> Result<SwitchOutcome> {
        self.pending_action = Some(PendingAction::ScreenshotAnalysis);
        let suggested = self.config.models.suggested_vision_model.clone();
        self.switch_model(&suggested).await
    }

    async fn capture_and_submit(&mut self) -> Result<()> {
        let png = self.browser.screenshot_png().await?;
        let message = prompts::screenshot_message(
            &self.browser.current_url(),
            &self.browser.current_title(),
        );
        self.history.push_user(&message);
        self.submit(Some(png))?;
        Ok(())
    }

    fn submit(&mut self, image_png: Option<Vec<u8>>) -> Result<(), InferenceError> {
        if self.in_flight {
            return Err(InferenceError::AlreadyInFlight);
        }
        self.in_flight = true;

        let request = InferenceRequest::new(
            self.history.snapshot(),
            self.current_model.clone(),
            image_png,
        );
        let client = self.client.clone();
        let fragments = self.config.models.vision_fragments.clone();
        let tx = self.tx.clone();

        task::spawn(async move {
            let (prompt, images) = request.payload(&fragments);
            let event = match client.generate(&request.model, &prompt, images).await {
                Ok(text) => SessionEvent::ReplyReady {
                    text,
                    elapsed_ms: request.elapsed().num_milliseconds(),
                },
                Err(e) => SessionEvent::InferenceFailed(e),
            };
            let _ = tx.send(event);
        });

        Ok(())
    }

    // ---- navigation ----

    /// Address-slot entry: free text becomes a URL or a search query.
    pub fn open_address(&mut self, input: &str) {
        if input.trim().is_empty() {
            return;
        }
        let url = nav_parser::normalize_address_input(input);
        self.browser.navigate(&url);
    }

    // ---- model management ----

    pub async fn switch_model(&mut self, requested: &str) -> Result<SwitchOutcome> {
        match self.provisioner.installed_models().await {
            Err(_) => {
                // Keep the previous current model; no partial switch state.
                self.note("Cannot connect to Ollama. Make sure it's running.");
                Ok(SwitchOutcome::ServiceUnavailable)
            }
            Ok(installed) => {
                self.installed_models = installed;
                if model_matches(requested, &self.installed_models) {
                    self.current_model = requested.to_string();
                    self.note(format!("Switched to model: {}", requested));
                    self.resume_pending().await;
                    Ok(SwitchOutcome::Switched)
                } else {
                    Ok(SwitchOutcome::NotInstalled)
                }
            }
        }
    }

    /// Starts a background model pull; with `make_current` the selector
    /// already advances to the new model, matching an accepted switch.
    pub fn begin_pull(&mut self, model: &str, make_current: bool) -> Result<(), ProvisionError> {
        self.provisioner.begin_pull(model, &self.tx)?;
        if make_current {
            self.current_model = model.to_string();
        }
        Ok(())
    }

    /// The user declined installing a missing model: the selector stays on
    /// the previous model and a deferred screenshot can no longer happen.
    pub fn decline_install(&mut self, _requested: &str) {
        self.note(format!("Keeping current model: {}", self.current_model));
        if self.pending_action.take().is_some() {
            self.note("Screenshot cancelled - it needs a vision model.");
        }
    }

    /// Re-queries the installed listing and reports it.
    pub async fn refresh_models(&mut self) -> Result<(), InferenceError> {
        let models = self.provisioner.installed_models().await?;
        self.installed_models = models;
        if self.installed_models.is_empty() {
            self.note("No models installed. Install one with: ollama pull llama3.2");
        } else {
            self.note(format!("Available models: {}", self.installed_models.join(", ")));
        }
        Ok(())
    }

    pub fn begin_install(&mut self) -> Result<(), ProvisionError> {
        self.provisioner.begin_install(&self.tx)
    }

    // ---- lifecycle ----

    /// First-run service check. Confirmation prompts around the outcomes
    /// are the front-end's concern.
    pub async fn bootstrap(&mut self) -> BootstrapOutcome {
        match self.provisioner.check_service().await {
            ServiceStatus::Reachable(models) => {
                self.note("Connected to Ollama successfully!");
                self.finish_bootstrap(models)
            }
            ServiceStatus::StartedAfterLaunch(models) => {
                self.note("Ollama was not running - started it successfully!");
                self.finish_bootstrap(models)
            }
            ServiceStatus::InstallRequired => {
                self.note("Ollama is not installed or could not be started.");
                BootstrapOutcome::InstallRequired
            }
        }
    }

    fn finish_bootstrap(&mut self, models: Vec<String>) -> BootstrapOutcome {
        self.installed_models = models;
        if self.installed_models.is_empty() {
            BootstrapOutcome::NoModels
        } else {
            self.note(format!(
                "Found {} installed model(s): {}",
                self.installed_models.len(),
                self.installed_models.join(", ")
            ));
            BootstrapOutcome::Ready
        }
    }

    /// Clears the conversation. The front-end confirms with the user first.
    pub fn clear_history(&mut self) {
        self.history.clear();
        self.note("Chat history cleared!");
    }

    // ---- event handling (interactive loop only) ----

    pub async fn handle_event(&mut self, event: SessionEvent) -> Option<FollowUp> {
        match event {
            SessionEvent::ReplyReady { text, elapsed_ms } => {
                self.complete_reply(text, elapsed_ms);
                None
            }
            SessionEvent::InferenceFailed(error) => {
                self.in_flight = false;
                self.note(error.to_string());
                None
            }
            SessionEvent::Provision(job) => self.handle_provision(job).await,
        }
    }

    /// Success path: store the reply, run command extraction against the
    /// stored text, perform the navigations, then surface the reply.
    fn complete_reply(&mut self, text: String, elapsed_ms: i64) {
        self.in_flight = false;
        self.last_reply_ms = Some(elapsed_ms);
        self.history.push_assistant(&text);

        let commands = nav_parser::extract_nav_commands(&text, &self.config.heuristics);
        for command in &commands {
            let url = nav_parser::normalize_url(&command.url);
            self.browser.navigate(&url);
            match command.origin {
                CommandOrigin::Directive => self.note(format!("Opening: {}", url)),
                CommandOrigin::Suggestion => self.note(format!("AI suggested opening: {}", url)),
            }
        }

        self.notes.push(Note::Assistant(text));
    }

    async fn handle_provision(&mut self, job: ProvisionJob) -> Option<FollowUp> {
        self.note(job.progress.clone());
        if !job.is_finished() {
            return None;
        }
        self.provisioner.job_finished(&job);

        match job.kind {
            ProvisionKind::Pull => {
                if job.succeeded() {
                    // Best-effort refresh; the pull already proved the
                    // service reachable a moment ago.
                    if let Ok(models) = self.provisioner.installed_models().await {
                        self.installed_models = models;
                    }
                    self.resume_pending().await;
                } else if self.pending_action.take().is_some() {
                    self.note("Screenshot cancelled - the vision model could not be downloaded.");
                }
                None
            }
            ProvisionKind::Install => {
                if !job.succeeded() {
                    return None;
                }
                tokio::time::sleep(std::time::Duration::from_secs(
                    self.config.service.restart_delay_secs,
                ))
                .await;
                match self.provisioner.installed_models().await {
                    Ok(models) => {
                        self.installed_models = models;
                        if self.installed_models.is_empty() {
                            Some(FollowUp::OfferStarterModel(
                                self.config.models.starter_model.clone(),
                            ))
                        } else {
                            self.note(format!(
                                "Found {} installed model(s): {}",
                                self.installed_models.len(),
                                self.installed_models.join(", ")
                            ));
                            None
                        }
                    }
                    Err(_) => None,
                }
            }
        }
    }

    /// Consumes the pending action exactly once, as soon as its
    /// precondition (a vision-capable current model) holds.
    async fn resume_pending(&mut self) {
        if self.pending_action != Some(PendingAction::ScreenshotAnalysis) {
            return;
        }
        if !llm::is_vision_model(&self.current_model, &self.config.models.vision_fragments) {
            return;
        }
        self.pending_action = None;
        self.note("Now taking screenshot with the new vision model...");
        if let Err(e) = self.capture_and_submit().await {
            self.note(format!("Could not take the screenshot: {}", e));
        }
    }
}
