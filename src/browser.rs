use anyhow::Result;
use async_trait::async_trait;
use colored::*;

/// Surface the session needs from the embedded web renderer. The real
/// implementation lives with the windowing layer; the engine only ever
/// talks through this trait.
#[async_trait]
pub trait BrowserControl: Send {
    /// Loads an absolute URL in the active page and reflects it into the
    /// address display.
    fn navigate(&mut self, url: &str);

    fn current_url(&self) -> String;

    fn current_title(&self) -> String;

    /// Plain-text content of the active page.
    async fn page_text(&self) -> Result<String>;

    /// PNG-encoded bitmap of the active page render.
    async fn screenshot_png(&self) -> Result<Vec<u8>>;
}

/// Headless stand-in used by the terminal front-end: tracks where the
/// session navigated and prints it, with no renderer behind it.
pub struct TerminalBrowser {
    current_url: String,
    current_title: String,
}

impl TerminalBrowser {
    pub fn new(home_page: &str) -> Self {
        Self {
            current_url: home_page.to_string(),
            current_title: host_of(home_page),
        }
    }
}

#[async_trait]
impl BrowserControl for TerminalBrowser {
    fn navigate(&mut self, url: &str) {
        self.current_url = url.to_string();
        self.current_title = host_of(url);
        println!("{} {}", "[browser]".dimmed(), url.bright_blue().underline());
    }

    fn current_url(&self) -> String {
        self.current_url.clone()
    }

    fn current_title(&self) -> String {
        self.current_title.clone()
    }

    async fn page_text(&self) -> Result<String> {
        Err(anyhow::anyhow!(
            "page text capture requires the embedded renderer; none is attached"
        ))
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>> {
        Err(anyhow::anyhow!(
            "screenshots require the embedded renderer; none is attached"
        ))
    }
}

fn host_of(url: &str) -> String {
    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme)
        .to_string()
}
