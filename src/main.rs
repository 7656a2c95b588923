use std::io::{self, Write};

use anyhow::Result;
use colored::*;

mod browser;
mod chat;
mod config;
mod downloads;
mod llm;
mod nav_parser;
mod prompts;
mod provision;
mod session;
mod thinking;

use browser::TerminalBrowser;
use session::{
    BootstrapOutcome, FollowUp, Note, ScreenshotOutcome, Session, SessionEvent, SwitchOutcome,
};

#[tokio::main]
async fn main() -> Result<()> {
    let header_width = 60;
    println!("{}", "═".repeat(header_width).bright_blue());
    println!("{}", "Glitch - AI-Powered Browser".bright_white().bold());
    println!("{}", "═".repeat(header_width).bright_blue());

    let config = config::load_or_create_config(None)?;
    let home_page = config.page.home_page.clone();
    let mut session = Session::new(config, Box::new(TerminalBrowser::new(&home_page)))?;

    run_bootstrap(&mut session).await?;

    println!("{}", "─".repeat(header_width).dimmed());
    println!("{} Type '/help' for available commands", "💡".yellow());
    println!("{} Type anything else to chat with AI", "💬".bright_blue());
    println!();
    print_note(&Note::Assistant(prompts::welcome_message(
        &session.current_model,
    )));
    println!();

    loop {
        print!("{} ", "You:".bright_blue().bold());
        io::stdout().flush()?;

        let mut user_input = String::new();
        if io::stdin().read_line(&mut user_input)? == 0 {
            break;
        }
        let trimmed = user_input.trim();
        if trimmed.is_empty() {
            continue;
        }

        if trimmed.starts_with('/') {
            let parts: Vec<&str> = trimmed.splitn(2, ' ').collect();
            let command = parts[0];
            let arg = if parts.len() > 1 { parts[1].trim() } else { "" };

            match command {
                "/quit" => {
                    println!("{}", "─".repeat(header_width).dimmed());
                    println!("{}", "Goodbye!".bright_white());
                    break;
                }
                "/help" => print_help(),
                "/clear" => {
                    if confirm("Are you sure you want to clear the conversation history?")? {
                        session.clear_history();
                        print_notes(&mut session);
                    }
                }
                "/models" => {
                    if let Err(e) = session.refresh_models().await {
                        print_note(&Note::System(e.to_string()));
                    }
                    print_notes(&mut session);
                }
                "/model" => {
                    if arg.is_empty() {
                        println!("Current model: {}", session.current_model.cyan());
                        println!("Known models: {}", session.config.models.roster.join(", "));
                    } else {
                        let outcome = session.switch_model(arg).await?;
                        resolve_switch(&mut session, arg, outcome).await?;
                    }
                }
                "/open" => {
                    if arg.is_empty() {
                        println!("Usage: /open <url or search terms>");
                    } else {
                        session.open_address(arg);
                    }
                }
                "/analyze" => match session.analyze_page().await {
                    Ok(()) => pump_until_idle(&mut session, "AI is thinking...").await?,
                    Err(e) => print_note(&Note::System(e.to_string())),
                },
                "/see" => run_screenshot(&mut session).await?,
                "/downloads" => print_downloads(&session),
                _ => {
                    println!(
                        "Unknown command: {}. Type '/help' for available commands.",
                        command
                    );
                }
            }
        } else {
            match session.send_message(trimmed) {
                Ok(()) => pump_until_idle(&mut session, "AI is thinking...").await?,
                Err(e) => print_note(&Note::System(e.to_string())),
            }
        }
        println!();
    }

    Ok(())
}

/// First-run flow: probe the service, offer to install it or to pull a
/// starter model when nothing is there yet.
async fn run_bootstrap(session: &mut Session) -> Result<()> {
    match session.bootstrap().await {
        BootstrapOutcome::Ready => print_notes(session),
        BootstrapOutcome::NoModels => {
            print_notes(session);
            let starter = session.config.models.starter_model.clone();
            if offer_starter_model(&starter)? && session.begin_pull(&starter, true).is_ok() {
                pump_until_provision_done(session).await?;
            }
        }
        BootstrapOutcome::InstallRequired => {
            print_notes(session);
            let question = "Ollama is not installed or not running.\nWould you like to automatically install Ollama now?\n(This is free and runs AI models locally on your computer)";
            if confirm(question)? {
                if session.begin_install().is_ok() {
                    pump_until_provision_done(session).await?;
                }
            } else {
                print_note(&Note::System(
                    "You can manually install Ollama from https://ollama.com".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// Drains events until the in-flight request resolves. The spinner is the
/// transient placeholder: it is removed - and only it - before the reply
/// or the error is printed.
async fn pump_until_idle(session: &mut Session, message: &str) -> Result<()> {
    while session.is_processing() {
        let spinner = thinking::show_thinking(message);
        let Some(event) = session.recv_event().await else {
            spinner.finish();
            break;
        };
        spinner.finish();

        let was_reply = matches!(&event, SessionEvent::ReplyReady { .. });
        session.handle_event(event).await;
        print_notes(session);

        if was_reply {
            if let Some(ms) = session.last_reply_ms() {
                println!("{}", format!("({:.1}s)", ms as f64 / 1000.0).dimmed());
            }
        }
    }
    Ok(())
}

/// Drains events while an install or pull job runs, mirroring the original
/// modal progress dialog: the prompt only comes back once the job is done.
async fn pump_until_provision_done(session: &mut Session) -> Result<()> {
    let spinner = thinking::show_thinking("Working... This may take several minutes.");
    loop {
        let Some(event) = session.recv_event().await else {
            break;
        };
        if let SessionEvent::Provision(job) = &event {
            spinner.update_message(&job.progress);
        }
        let finished = matches!(&event, SessionEvent::Provision(job) if job.is_finished());
        let follow_up = session.handle_event(event).await;
        if !finished {
            continue;
        }

        spinner.finish();
        print_notes(session);
        match follow_up {
            Some(FollowUp::OfferStarterModel(model)) => {
                if offer_starter_model(&model)? && session.begin_pull(&model, true).is_ok() {
                    continue;
                }
                break;
            }
            None => break,
        }
    }

    // A finished pull may have resumed a deferred screenshot analysis.
    if session.is_processing() {
        pump_until_idle(session, "AI is analyzing the screenshot...").await?;
    }
    Ok(())
}

/// Second half of a model switch: offer the download when the model is
/// missing, revert cleanly when the user declines.
async fn resolve_switch(
    session: &mut Session,
    requested: &str,
    outcome: SwitchOutcome,
) -> Result<()> {
    print_notes(session);
    if outcome == SwitchOutcome::NotInstalled {
        let question = format!(
            "The model '{}' is not installed.\nWould you like to download it now?\n(This may take several minutes depending on the model size)",
            requested
        );
        if confirm(&question)? {
            match session.begin_pull(requested, true) {
                Ok(()) => pump_until_provision_done(session).await?,
                Err(e) => print_note(&Note::System(e.to_string())),
            }
        } else {
            session.decline_install(requested);
            print_notes(session);
        }
    }

    // A successful switch may have resumed a deferred screenshot.
    if session.is_processing() {
        pump_until_idle(session, "AI is analyzing the screenshot...").await?;
    }
    Ok(())
}

async fn run_screenshot(session: &mut Session) -> Result<()> {
    match session.request_screenshot().await {
        Ok(ScreenshotOutcome::Dispatched) => {
            pump_until_idle(session, "AI is analyzing the screenshot...").await?;
        }
        Ok(ScreenshotOutcome::NeedsVisionModel { current, suggested }) => {
            let question = format!(
                "The current model '{}' doesn't support vision.\nWould you like to switch to {}?\n(This model can see and analyze screenshots)",
                current, suggested
            );
            if confirm(&question)? {
                let outcome = session.accept_vision_switch().await?;
                resolve_switch(session, &suggested, outcome).await?;
            }
        }
        Err(e) => print_note(&Note::System(e.to_string())),
    }
    Ok(())
}

fn offer_starter_model(model: &str) -> Result<bool> {
    let question = format!(
        "No AI models are installed yet.\nWould you like to download {}? (Small, fast model ~1.3GB)",
        model
    );
    confirm(&question)
}

fn confirm(question: &str) -> Result<bool> {
    println!("{} {}", question.yellow(), "[y/N]".dimmed());
    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    let response = response.trim().to_lowercase();
    Ok(response == "y" || response == "yes")
}

fn print_notes(session: &mut Session) {
    for note in session.take_notes() {
        print_note(&note);
    }
}

fn print_note(note: &Note) {
    match note {
        Note::Assistant(text) => println!("{} {}", "AI:".bright_green().bold(), text),
        Note::System(text) => println!("{} {}", "System:".red().bold(), text),
    }
}

fn print_downloads(session: &Session) {
    if session.downloads.is_empty() {
        println!("No downloads yet.");
        return;
    }
    for job in session.downloads.jobs() {
        println!("  {} - {}", job.filename.bold(), job.progress_text());
    }
    if let Some(percent) = session.downloads.overall_percent() {
        println!("  {} {}%", "Overall:".dimmed(), percent);
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /model <name>   - Switch model (offers a download if missing)");
    println!("  /models         - List models installed on the Ollama service");
    println!("  /open <url>     - Open a URL or search the web");
    println!("  /analyze        - Let the AI read the current page");
    println!("  /see            - Let the AI see a screenshot (vision models)");
    println!("  /downloads      - Show page download status");
    println!("  /clear          - Clear the conversation history");
    println!("  /quit           - Exit");
    println!();
    println!("Anything else is sent to the AI. Ask it to open websites for you!");
}
