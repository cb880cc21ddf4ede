//! `register;1|0` button presses from the `/start` prompt.

use crate::gateway::Gateway;
use anyhow::Result;
use bc_channels::{CallbackQuery, MessageRef};
use bc_core::{Actor, GatewayError, Registration};

#[tracing::instrument(level = "info", skip_all, fields(user_id = %actor.id, accept = accept))]
pub async fn handle_register(
    gw: &Gateway,
    callback: &CallbackQuery,
    actor: &Actor,
    accept: bool,
) -> Result<()> {
    let messages = &gw.locale.messages;
    let Some(prompt) = callback.message else {
        tracing::warn!("registration press without a chat message");
        return gw.ack(&callback.id).await;
    };

    if !accept {
        edit_prompt(gw, prompt, &messages.register_cancel).await;
        return gw.ack(&callback.id).await;
    }

    let registration = Registration {
        platform_id: actor.id,
        name: actor.full_name(),
        username: actor.username.clone(),
    };
    match gw.ledger.register_user(registration).await {
        Ok(account) => {
            tracing::info!(%account, "user registered");
        }
        Err(GatewayError::Business(message)) => {
            tracing::warn!(%message, "ledger refused registration");
            return gw
                .transport
                .answer_callback(&callback.id, Some(message.as_str()), true)
                .await;
        }
        Err(error) => {
            tracing::warn!(%error, "registration failed");
            return gw
                .transport
                .answer_callback(&callback.id, Some(messages.ledger_unavailable.as_str()), true)
                .await;
        }
    }

    edit_prompt(gw, prompt, &messages.register_success).await;
    gw.ack(&callback.id).await?;
    if gw.announcements.is_active(chrono::Utc::now()) {
        gw.transport
            .send_message(prompt.chat_id, &messages.what_is_new, None)
            .await?;
    }
    gw.transport
        .send_message(prompt.chat_id, &messages.try_help, None)
        .await?;
    Ok(())
}

/// The prompt may be gone by the time the user answers; the press is still
/// acknowledged.
async fn edit_prompt(gw: &Gateway, prompt: MessageRef, text: &str) {
    if let Err(error) = gw.transport.edit_message(prompt, text, None).await {
        tracing::warn!(%error, "failed to edit registration prompt");
    }
}
