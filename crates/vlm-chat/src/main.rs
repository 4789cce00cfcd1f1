//! A terminal chat with a vision-language model served by an
//! OpenAI-compatible server.

#[macro_use]
extern crate tracing;

use std::env;
use std::io::Write as _;
use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::select;
use tokio::sync::mpsc;
use vlm_chat::core::{
    ChatConfig, ChatStatus, Conversation, DEFAULT_MODEL_ID, ImageAttachment,
    MessageId,
};
use vlm_chat::openai::{OpenAIConfigBuilder, OpenAIService};
use vlm_chat::{Session, SessionBuilder};

enum SessionEvent {
    Changed(Conversation),
    Idle,
}

enum Command<'a> {
    Attach(&'a str),
    Detach,
    Quit,
    Send(&'a str),
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if let Some(path) = line.strip_prefix("/image ") {
            return Self::Attach(path.trim());
        }
        match line {
            "/detach" => Self::Detach,
            "/quit" => Self::Quit,
            _ => Self::Send(line),
        }
    }
}

const BAR_CHAR: &str = "▎";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let api_key = env::var("VLM_CHAT_API_KEY").unwrap_or_default();
    let model =
        env::var("VLM_CHAT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL_ID.into());
    let mut config_builder = OpenAIConfigBuilder::with_api_key(api_key);
    if let Ok(base_url) = env::var("VLM_CHAT_BASE_URL") {
        config_builder = config_builder.with_base_url(base_url);
    }
    let model_service = OpenAIService::new(config_builder.build());

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let session = SessionBuilder::with_model_service(model_service)
        .with_config(ChatConfig::builder().with_model_id(model).build())
        .on_idle({
            let event_tx = event_tx.clone();
            move || {
                event_tx.send(SessionEvent::Idle).ok();
            }
        })
        .on_change(move |conversation| {
            event_tx
                .send(SessionEvent::Changed(conversation.clone()))
                .ok();
        })
        .build();

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
    let spinner = |message: &str| {
        let progress_bar = ProgressBar::new_spinner();
        progress_bar.set_style(progress_style.clone());
        progress_bar.set_message(message.to_owned());
        progress_bar.enable_steady_tick(Duration::from_millis(100));
        progress_bar
    };

    let progress_bar = spinner(session.current().status().message());
    let mut state_rx = session.orchestrator().subscribe();
    let loaded = state_rx
        .wait_for(|conv| conv.is_model_ready() || conv.status().is_error())
        .await
        .map(|conv| conv.is_model_ready());
    progress_bar.finish_and_clear();
    if !matches!(loaded, Ok(true)) {
        print_status(session.current().status());
        return;
    }
    print_status(session.current().status());

    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let line = select! {
            line = read_line(&mut lines) => line,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match Command::parse(&line) {
            Command::Attach(path) => {
                attach_image(&session, Path::new(path)).await;
                print_status(session.snapshot().await.status());
                continue;
            }
            Command::Detach => {
                session.remove_image();
                print_status(session.snapshot().await.status());
                continue;
            }
            Command::Quit => break,
            Command::Send("") => continue,
            Command::Send(prompt) => session.send_message(prompt),
        }

        // Drop the events of previous turns.
        while event_rx.try_recv().is_ok() {}

        let conversation = session.snapshot().await;
        if !conversation.is_loading() {
            // The prompt was not accepted.
            print_status(conversation.status());
            continue;
        }
        let Some(placeholder) =
            conversation.streaming_message().map(|msg| msg.id())
        else {
            print_status(conversation.status());
            continue;
        };

        let progress_bar = spinner(conversation.status().message());
        let mut printer = AnswerPrinter::new(placeholder, progress_bar);
        loop {
            let event = select! {
                event = event_rx.recv() => event,
                _ = tokio::signal::ctrl_c() => {
                    debug!("cancelling the answer");
                    session.cancel();
                    continue;
                }
            };
            match event {
                Some(SessionEvent::Changed(conversation)) => {
                    printer.update(&conversation);
                }
                Some(SessionEvent::Idle) | None => {
                    // The last change may still be on its way.
                    let conversation = session.snapshot().await;
                    printer.update(&conversation);
                    printer.finish();
                    print_status(conversation.status());
                    break;
                }
            }
        }
    }
}

/// Prints an answer incrementally as it's revealed.
struct AnswerPrinter {
    placeholder: MessageId,
    printed: usize,
    progress_bar: Option<ProgressBar>,
}

impl AnswerPrinter {
    fn new(placeholder: MessageId, progress_bar: ProgressBar) -> Self {
        Self {
            placeholder,
            printed: 0,
            progress_bar: Some(progress_bar),
        }
    }

    fn update(&mut self, conversation: &Conversation) {
        let Some(msg) = conversation.message(self.placeholder) else {
            return;
        };
        let text = msg.text();
        if text.is_empty() {
            return;
        }

        // Finish the progress bar before printing anything else.
        if let Some(progress_bar) = self.progress_bar.take() {
            progress_bar.finish_and_clear();
            print!("{}🤖 ", BAR_CHAR.bright_cyan());
        }
        if let Some(delta) = text.get(self.printed..) {
            print!("{}", delta.bright_white());
            self.printed = text.len();
        }
        std::io::stdout().flush().ok();
    }

    fn finish(mut self) {
        match self.progress_bar.take() {
            Some(progress_bar) => progress_bar.finish_and_clear(),
            None => println!(),
        }
    }
}

async fn attach_image(session: &Session, path: &Path) {
    match tokio::fs::read(path).await {
        Ok(data) => {
            let image = ImageAttachment::new(data);
            if image.format().is_none() {
                warn!("{} doesn't look like an image", path.display());
            }
            session.attach_image(image);
        }
        Err(err) => {
            eprintln!("{} {}: {err}", "failed to read".red(), path.display());
        }
    }
}

fn print_status(status: &ChatStatus) {
    let bar = match status {
        ChatStatus::Error(_) => BAR_CHAR.bright_red().to_string(),
        ChatStatus::NeedsImage(_) => BAR_CHAR.bright_yellow().to_string(),
        _ => BAR_CHAR.bright_black().to_string(),
    };
    println!("{bar}{}", status.message().dimmed());
}

async fn read_line(lines: &mut Lines<BufReader<Stdin>>) -> Option<String> {
    match lines.next_line().await {
        Ok(line) => line,
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
