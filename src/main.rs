mod config;
mod health;
mod openai;
mod supervisor;
mod telegram;

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::Voice;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use config::Config;
use openai::Client as OpenAiClient;
use telegram::TelegramClient;

const GREETING: &str = "Привет! Я ИИ-бот на OpenAI. Напиши сообщение или отправь голосовое 🎙️";

struct BotState {
    config: Config,
    openai: OpenAiClient,
    telegram: TelegramClient,
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "govorun.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("govorun.log"))
        .expect("Failed to open log file");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting govorun...");
    info!("Loaded config from {config_path}");
    info!("Completion model: {}", config.model);
    info!("Transcription model: {}", config.transcription_model);

    if let Some(port) = config.health_port {
        tokio::spawn(async move {
            if let Err(e) = health::serve(port).await {
                warn!("Keepalive endpoint failed: {e}");
            }
        });
    }

    let bot = Bot::new(&config.telegram_bot_token);
    let state = Arc::new(BotState {
        openai: OpenAiClient::new(config.openai_api_key.clone()),
        telegram: TelegramClient::new(bot.clone()),
        config,
    });

    supervisor::supervise(|| run_bot(bot.clone(), state.clone())).await;
}

/// One run of the polling loop. Returns Err if startup fails (bad network,
/// Telegram outage); the supervisor restarts us with backoff.
async fn run_bot(bot: Bot, state: Arc<BotState>) -> Result<(), teloxide::RequestError> {
    let me = bot.get_me().await?;
    info!("Bot started as @{}", me.username());

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_message(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let username = msg
        .from
        .as_ref()
        .map(|u| u.username.clone().unwrap_or_else(|| u.first_name.clone()))
        .unwrap_or_else(|| "unknown".to_string());

    if let Some(voice) = msg.voice() {
        info!("🎙️ Voice message from {username} ({}s)", voice.duration.seconds());
        handle_voice(&msg, voice, &state).await;
    } else if let Some(text) = msg.text() {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        let preview: String = text.chars().take(100).collect();
        info!("📨 Message from {username}: \"{preview}\"");
        handle_text(&msg, text, &state).await;
    }

    Ok(())
}

/// What to do with an incoming text message.
#[derive(Debug, Clone, Copy, PartialEq)]
enum TextAction {
    /// `/start` - reply with the greeting.
    Greet,
    /// Any other command - no reply.
    Ignore,
    /// Forward to the completion endpoint.
    Relay,
}

fn classify_text(text: &str) -> TextAction {
    match command_name(text) {
        Some("start") => TextAction::Greet,
        Some(_) => TextAction::Ignore,
        None => TextAction::Relay,
    }
}

/// Extract the command name from "/name", "/name@botname" or "/name args".
fn command_name(text: &str) -> Option<&str> {
    let rest = text.strip_prefix('/')?;
    // The name must follow the slash directly; "/ start" is not a command
    let token = rest.split(char::is_whitespace).next().unwrap_or("");
    let name = token.split('@').next().unwrap_or(token);
    if name.is_empty() { None } else { Some(name) }
}

async fn handle_text(msg: &Message, text: &str, state: &BotState) {
    match classify_text(text) {
        TextAction::Greet => {
            state.telegram.send_reply(msg.chat.id, Some(msg.id), GREETING).await.ok();
            return;
        }
        TextAction::Ignore => {
            info!("Ignoring unhandled command");
            return;
        }
        TextAction::Relay => {}
    }

    state.telegram.send_typing(msg.chat.id).await;

    let config = &state.config;
    match state
        .openai
        .respond(
            &config.model,
            &config.system_prompt,
            text,
            config.temperature,
            config.max_output_tokens,
        )
        .await
    {
        Ok(reply) => {
            state.telegram.send_reply(msg.chat.id, Some(msg.id), &reply).await.ok();
        }
        Err(e) => {
            warn!("Completion failed: {e}");
            state
                .telegram
                .send_reply(msg.chat.id, Some(msg.id), &format!("Ошибка: {e}"))
                .await
                .ok();
        }
    }
}

async fn handle_voice(msg: &Message, voice: &Voice, state: &BotState) {
    state.telegram.send_typing(msg.chat.id).await;

    match relay_voice(voice, state).await {
        Ok(reply) => {
            state.telegram.send_reply(msg.chat.id, Some(msg.id), &reply).await.ok();
        }
        Err(e) => {
            warn!("Voice handling failed: {e}");
            state
                .telegram
                .send_reply(
                    msg.chat.id,
                    Some(msg.id),
                    &format!("Ошибка при обработке голосового: {e}"),
                )
                .await
                .ok();
        }
    }
}

/// Download, transcribe, complete. Any step can fail; the caller relays the
/// error to the user.
async fn relay_voice(voice: &Voice, state: &BotState) -> Result<String, String> {
    let config = &state.config;

    let audio = state.telegram.download_voice(voice.file.id.clone()).await?;
    let transcript = state
        .openai
        .transcribe(&config.transcription_model, audio, "voice.ogg")
        .await
        .map_err(|e| e.to_string())?;
    info!("Transcript: \"{}\"", transcript.chars().take(100).collect::<String>());

    let reply = state
        .openai
        .respond(
            &config.model,
            &config.system_prompt,
            &transcript,
            config.temperature,
            config.max_output_tokens,
        )
        .await
        .map_err(|e| e.to_string())?;

    Ok(format!("📝 Расшифровка: {transcript}\n\n💬 Ответ: {reply}"))
}
