use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tutor_voice::{
    capture::{StreamingTranscriber, TranscriberConfig},
    completion::{CompletionConfig, OpenAiCompletion},
    config::load_config,
    conversation::{self, Command},
    playback::{HttpSynthesizer, PlayerConfig, SynthesizerConfig, VoicePlayback},
    Phase, Role,
};

#[derive(Parser, Debug)]
#[command(name = "tutor-voice", about = "Voice conversation with an AI study tutor")]
struct Args {
    /// Completion model to use
    #[arg(long, default_value = "gpt-4-turbo-preview")]
    model: String,

    /// Override the completion endpoint base URL
    #[arg(long)]
    completion_url: Option<String>,

    /// Synthesis voice id (default: let the voice catalog pick)
    #[arg(long)]
    voice: Option<String>,

    /// Start with spoken replies muted
    #[arg(long)]
    muted: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    log::info!("🚀 Initializing tutor-voice");

    let args = Args::parse();

    let api_config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e);
            eprintln!("   Set OPENAI_API_KEY, FIREWORKS_API_KEY and ELEVENLABS_API_KEY");
            std::process::exit(1);
        }
    };

    // Capture session: microphone + streaming transcription
    let (capture_events_tx, capture_events_rx) = mpsc::channel(32);
    let capture = Arc::new(StreamingTranscriber::new(
        api_config.transcription_key().to_string(),
        TranscriberConfig::default(),
        capture_events_tx,
    ));

    // Completion client
    let mut completion_config = CompletionConfig {
        model: args.model.clone(),
        ..Default::default()
    };
    if let Some(url) = &args.completion_url {
        completion_config.base_url = url.clone();
    }
    let completion = Arc::new(OpenAiCompletion::with_config(
        api_config.completion_key().to_string(),
        completion_config,
    ));

    // Playback session: remote synthesis + local speaker
    let mut synthesizer = HttpSynthesizer::with_config(
        api_config.synthesis_key().to_string(),
        SynthesizerConfig::default(),
    );
    match &args.voice {
        Some(voice_id) => synthesizer.set_voice(voice_id.clone()),
        None => synthesizer.prefer_natural_voice().await,
    }

    let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
    let playback = Arc::new(
        VoicePlayback::new(synthesizer, PlayerConfig::default(), outcomes_tx)
            .map_err(|e| anyhow::anyhow!("Audio output unavailable: {}", e))?,
    );

    let handle = conversation::spawn(capture, completion, playback, capture_events_rx, outcomes_rx);

    if args.muted {
        handle.send(Command::ToggleMute).await?;
    }

    println!("🎧 Voice conversation ready");
    println!("   t = talk   s = stop/send   m = mute   p = pause   r = resume   q = quit");

    // Render snapshot changes as they happen
    let mut snapshots = handle.subscribe();
    let renderer = tokio::spawn(async move {
        let mut rendered_turns = 0;
        let mut notice_shown = false;
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();

            if let Some(notice) = &snapshot.capture_notice {
                if !notice_shown {
                    println!("⚠️  {}", notice);
                    notice_shown = true;
                }
            }

            for turn in snapshot.turns.iter().skip(rendered_turns) {
                match turn.role {
                    Role::User => println!("🧑 {}", turn.content),
                    Role::Assistant => println!("🤖 {}", turn.content),
                }
            }
            rendered_turns = snapshot.turns.len();

            if snapshot.phase == Phase::Closed {
                break;
            }
        }
    });

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let command = match line.trim() {
                    "t" => Some(Command::Talk),
                    "s" => Some(Command::Stop),
                    "m" => Some(Command::ToggleMute),
                    "p" => Some(Command::PauseSpeaking),
                    "r" => Some(Command::ResumeSpeaking),
                    "q" => break,
                    "" => None,
                    other => {
                        println!("Unknown command: '{}'", other);
                        None
                    }
                };
                if let Some(command) = command {
                    if handle.send(command).await.is_err() {
                        break;
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                log::info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    handle.close().await;
    renderer.abort();
    println!("\n👋 Goodbye!");

    Ok(())
}
