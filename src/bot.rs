use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{Chat, Message, MessageOrigin, User};
use tracing::{error, info, warn};

use crate::classifier::Classifier;
use crate::config::Config;
use crate::error::PipelineError;
use crate::escalation;
use crate::llm::GeminiClient;
use crate::prompt::build_prompt;
use crate::redact::{redact, RawMessage, RawReply, RawSender};
use crate::router::{self, Section};

/// Shared application state: immutable after startup.
pub struct AppState {
    pub config: Config,
    pub classifier: Classifier<GeminiClient>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let classifier = Classifier::new(
            GeminiClient::new(config.gemini_api_key.clone()),
            config.model_stack.clone(),
        );
        Self { config, classifier }
    }
}

/// Start the Telegram bot
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let bot = Bot::new(&state.config.bot_token);

    info!("Starting Telegram bot...");

    let handler = Update::filter_message()
        .branch(
            dptree::filter(|msg: Message| msg.text() == Some("/start")).endpoint(handle_start),
        )
        .branch(
            dptree::filter(|msg: Message| msg.chat.is_private())
                .endpoint(handle_private_message),
        )
        .branch(dptree::endpoint(handle_group_comment));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("bot"))
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_start(bot: Bot, msg: Message) -> ResponseResult<()> {
    bot.send_message(msg.chat.id, "Bot is running and monitoring comments.")
        .await?;
    Ok(())
}

/// Group flow: classify comments in the monitored group and report spam
/// to the operator.
async fn handle_group_comment(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    if msg.chat.id.0 != state.config.group_id {
        return Ok(());
    }

    if let Err(err) = moderate_group_comment(&bot, &msg, &state).await {
        handle_pipeline_failure(&bot, &state, Some(&msg), err).await;
    }

    Ok(())
}

/// Private flow: the admin forwards a suspect message and gets the full
/// prompt and verdict echoed back, for manual policy tuning.
async fn handle_private_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    if msg.chat.id.0 != state.config.admin_id {
        return Ok(());
    }

    if let Err(err) = echo_test_verdict(&bot, &msg, &state).await {
        handle_pipeline_failure(&bot, &state, Some(&msg), err).await;
    }

    Ok(())
}

async fn handle_pipeline_failure(
    bot: &Bot,
    state: &AppState,
    msg: Option<&Message>,
    err: PipelineError,
) {
    escalation::report(bot, &state.config, msg, &err).await;
    if err.is_fatal() {
        error!("Transport failure, terminating: {}", err);
        std::process::exit(1);
    }
}

async fn moderate_group_comment(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
) -> Result<(), PipelineError> {
    let raw = extract_raw(msg);
    let (sender, record) = redact(&raw, false)?;

    if let Some(reason) = router::bypass(&state.config, &sender) {
        info!(
            "Skipping comment from {} ({}): {:?}",
            sender.name, sender.id, reason
        );
        return Ok(());
    }

    let prompt = build_prompt(&record);
    let verdict = state.classifier.classify(&prompt).await?;

    info!("Prompt:\n{}\n\nResult: {:?}", prompt, verdict);

    if verdict.spam {
        router::report_spam(bot, &state.config, msg, &sender, &record, &verdict).await?;
    }

    Ok(())
}

async fn echo_test_verdict(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
) -> Result<(), PipelineError> {
    // A forwarded message is judged as its origin sender, so the admin
    // can replay suspect comments against the current policy.
    let raw = extract_raw(msg);
    let (sender, record) = redact(&raw, true)?;

    if state.config.is_whitelisted(sender.id) {
        bot.send_message(msg.chat.id, "User is whitelisted.").await?;
    }

    let prompt = build_prompt(&record);
    let verdict = state.classifier.classify(&prompt).await?;

    router::send_report(
        bot,
        msg.chat.id,
        &[
            Section::Text("User"),
            Section::Json(serde_json::to_value(&sender).unwrap_or_default()),
            Section::Text("Comment"),
            Section::Json(serde_json::to_value(&record).unwrap_or_default()),
            Section::Text("Prompt"),
            Section::Text("---"),
            Section::Code(&prompt),
            Section::Text("---"),
            Section::Text("Result"),
            Section::Json(serde_json::to_value(&verdict).unwrap_or_default()),
        ],
    )
    .await?;

    Ok(())
}

/// Pull the documented fields out of the transport message. Everything
/// else (entity spans, forward lineage, chat linkage) stays behind.
fn extract_raw(msg: &Message) -> RawMessage {
    let forward_origin_user = match msg.forward_origin() {
        Some(MessageOrigin::User { sender_user, .. }) => Some(user_to_raw(sender_user)),
        _ => None,
    };

    let reply_to = msg.reply_to_message().map(|reply| RawReply {
        text: reply.text().map(str::to_string),
        caption: reply.caption().map(str::to_string),
        date: Some(reply.date.timestamp()),
    });

    RawMessage {
        text: msg.text().map(str::to_string),
        caption: msg.caption().map(str::to_string),
        date: Some(msg.date.timestamp()),
        from: msg.from.as_ref().map(user_to_raw),
        sender_chat: msg.sender_chat.as_ref().map(chat_to_raw),
        forward_origin_user,
        reply_to,
    }
}

fn user_to_raw(user: &User) -> RawSender {
    RawSender {
        id: user.id.0 as i64,
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        username: user.username.clone(),
        is_premium: user.is_premium,
        is_bot: user.is_bot,
        is_channel: false,
    }
}

fn chat_to_raw(chat: &Chat) -> RawSender {
    RawSender {
        id: chat.id.0,
        first_name: chat.title().unwrap_or_default().to_string(),
        last_name: None,
        username: chat.username().map(str::to_string),
        is_premium: false,
        is_bot: false,
        is_channel: chat.is_channel(),
    }
}
