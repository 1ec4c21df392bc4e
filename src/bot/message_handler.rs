//! Message Handler module for processing incoming Telegram messages

use anyhow::Result;
use chrono::Local;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{debug, error, warn};

use crate::image_input::ImageRef;
use crate::localization::t_lang;
use crate::storage::UserIdentity;

use super::dialogue_manager::{DialogueManager, FinalizedReport, Inbound};
use super::ui_builder::{format_feedback, to_reply_markup, Reply};

/// Sender identity; private chats fall back to the chat id
fn identity_from_message(msg: &Message) -> UserIdentity {
    match msg.from.as_ref() {
        Some(user) => UserIdentity {
            external_id: user.id.0.to_string(),
            display_name: Some(user.first_name.clone()),
            language_code: user.language_code.clone(),
        },
        None => UserIdentity::new(msg.chat.id.to_string()),
    }
}

fn inbound_from_message(msg: &Message) -> Inbound {
    if let Some(text) = msg.text() {
        return Inbound::Text(text.to_string());
    }

    if let Some(largest_photo) = msg.photo().and_then(|photos| photos.last()) {
        return Inbound::Image(ImageRef {
            reference: largest_photo.file.id.0.clone(),
        });
    }

    if let Some(doc) = msg.document() {
        let is_image = doc
            .mime_type
            .as_ref()
            .is_some_and(|mime| mime.to_string().starts_with("image/"));
        if is_image {
            return Inbound::Image(ImageRef {
                reference: doc.file.id.0.clone(),
            });
        }
    }

    Inbound::Unsupported
}

async fn send_replies(bot: &Bot, chat_id: ChatId, replies: &[Reply]) -> Result<()> {
    for reply in replies {
        let request = bot.send_message(chat_id, reply.text.clone());
        match &reply.keyboard {
            Some(keyboard) => request.reply_markup(to_reply_markup(keyboard)).await?,
            None => request.await?,
        };
    }
    Ok(())
}

/// Run the AI feedback step in its own task
fn spawn_feedback(
    bot: Bot,
    chat_id: ChatId,
    manager: Arc<DialogueManager>,
    finalized: FinalizedReport,
) {
    tokio::spawn(async move {
        let Some(feedback) = manager.enrich_report(&finalized).await else {
            return;
        };
        let language_code = finalized.profile.language_code.as_deref();
        if let Err(e) = bot
            .send_message(chat_id, format_feedback(&feedback, language_code))
            .await
        {
            warn!(user_id = %finalized.user_id, error = %e, "Failed to deliver AI feedback");
        }
    });
}

pub async fn message_handler(
    bot: Bot,
    msg: Message,
    manager: Arc<DialogueManager>,
) -> Result<()> {
    let identity = identity_from_message(&msg);
    let inbound = inbound_from_message(&msg);
    debug!(user_id = %identity.external_id, ?inbound, "Received message");

    let today = Local::now().date_naive();
    match manager.handle(&identity, inbound, today).await {
        Ok(outcome) => {
            send_replies(&bot, msg.chat.id, &outcome.replies).await?;
            if let Some(finalized) = outcome.finalized {
                spawn_feedback(bot, msg.chat.id, Arc::clone(&manager), finalized);
            }
        }
        Err(e) => {
            error!(user_id = %identity.external_id, error = %e, "Failed to handle message");
            bot.send_message(
                msg.chat.id,
                t_lang("error-generic", e.language_code.as_deref()),
            )
            .await?;
        }
    }

    Ok(())
}
