use anyhow::Result;
use clap::Parser;
use std::{
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    time::Duration,
};
use teamchat_client::{
    ChatClient, ChatReply, ChatSession, ClientError, Command, DEFAULT_API_URL,
    DEFAULT_TIMEOUT_SECS, HELP, InputMode,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Chat with the teamchat backend from the terminal.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Base URL of the backend.
    #[arg(long, env = "TEAMCHAT_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Where spoken replies are written when `/speak on` is active.
    #[arg(long, default_value = "reply.mp3")]
    audio_out: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let client = ChatClient::new(&args.api_url, Duration::from_secs(args.timeout_secs))?;
    let mut session = ChatSession::new();

    println!("🤖 Team chat at {}", client.base_url());
    println!("Session {}. Type /help for commands.", session.session_id());

    let stdin = io::stdin();
    loop {
        print!("{} > ", session.mode);
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let command = match (session.mode, Command::parse(&line)) {
            (InputMode::Voice, Command::Message(path)) => Command::Voice(PathBuf::from(path)),
            (_, command) => command,
        };

        match command {
            Command::Empty => {}
            Command::Quit => break,
            Command::Help => println!("{HELP}"),
            Command::History => println!("\n{}\n", session.render_history()),
            Command::Invalid(usage) => println!("{usage}"),
            Command::Mode(mode) => {
                session.mode = mode;
                println!("Input mode: {mode}");
            }
            Command::Speak(on) => {
                session.speak_replies = on;
                if on {
                    println!("Replies will be saved to {}", args.audio_out.display());
                } else {
                    println!("Spoken replies off");
                }
            }
            Command::Message(text) => converse(&client, &mut session, &text, &args.audio_out),
            Command::Voice(path) => match transcribe_file(&client, &path) {
                Ok(text) => {
                    println!("🎤 {text}");
                    converse(&client, &mut session, &text, &args.audio_out);
                }
                Err(e) => println!("{e}"),
            },
        }
    }

    println!("Bye!");
    Ok(())
}

/// Sends one message and renders the reply. Errors are printed, never raised.
fn converse(client: &ChatClient, session: &mut ChatSession, text: &str, audio_out: &Path) {
    match session.submit(client, text) {
        Ok(reply) => {
            render_reply(&reply);
            if session.speak_replies {
                save_speech(client, &reply.response, audio_out);
            }
        }
        Err(e) => println!("{e}"),
    }
}

fn render_reply(reply: &ChatReply) {
    println!("\n{}\n", reply.response);
    if !reply.agents_used.is_empty() {
        let names: Vec<&str> = reply.agents_used.iter().map(|a| a.name.as_str()).collect();
        println!("(answered with help from {})\n", names.join(", "));
    }
}

fn transcribe_file(client: &ChatClient, path: &Path) -> Result<String, ClientError> {
    let audio = std::fs::read(path)
        .map_err(|e| ClientError::Other(format!("Cannot read {}: {e}", path.display())))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("recording.wav");
    client.transcribe(audio, file_name)
}

fn save_speech(client: &ChatClient, text: &str, audio_out: &Path) {
    match client.speak(text) {
        Ok(audio) => match std::fs::write(audio_out, audio) {
            Ok(()) => println!("🔊 Saved spoken reply to {}", audio_out.display()),
            Err(e) => {
                warn!(error = %e, "Failed to write audio");
                println!("❌ Error: cannot write {}: {e}", audio_out.display());
            }
        },
        Err(e) => println!("{e}"),
    }
}
