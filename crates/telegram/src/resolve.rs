use tracing::{info, warn};

use crate::{client::BotApi, error::Result};

/// Updates scanned when resolving a username.
const UPDATE_SCAN_LIMIT: u32 = 100;

/// How the operator identified themselves (`TELEGRAM_USER_ID`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactTarget {
    /// Numeric chat id, used verbatim.
    ChatId(String),
    /// `@username` (stored lowercased, without the `@`).
    Username(String),
}

impl ContactTarget {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if raw.bytes().all(|b| b.is_ascii_digit()) {
            return Some(Self::ChatId(raw.to_string()));
        }
        let name = raw.trim_start_matches('@');
        (!name.is_empty()).then(|| Self::Username(name.to_lowercase()))
    }
}

/// What could be learned about the operator's Telegram identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedContact {
    pub bot_username: Option<String>,
    pub chat_id: Option<String>,
    pub username: Option<String>,
}

/// Verify the bot token, then resolve `target` to a chat id.
///
/// Fails only when the token itself is rejected. A username that does not
/// appear in recent updates (the user never messaged the bot) resolves to a
/// contact without a chat id, and so does a failed `getUpdates` call.
pub async fn resolve_contact(api: &BotApi, target: Option<&ContactTarget>) -> Result<ResolvedContact> {
    let me = api.get_me().await?;
    info!(bot = me.username.as_deref().unwrap_or("?"), "telegram bot verified");

    let mut contact = ResolvedContact {
        bot_username: me.username,
        ..Default::default()
    };

    match target {
        None => {},
        Some(ContactTarget::ChatId(id)) => {
            info!(chat_id = %id, "using numeric telegram user id");
            contact.chat_id = Some(id.clone());
        },
        Some(ContactTarget::Username(name)) => {
            contact.username = Some(name.clone());
            match api.get_updates(UPDATE_SCAN_LIMIT).await {
                Ok(updates) => {
                    contact.chat_id = updates.iter().find_map(|update| {
                        let (chat, from) = update.participants();
                        if let Some(chat) = chat
                            && chat.username.as_deref().is_some_and(|u| u.eq_ignore_ascii_case(name))
                        {
                            return Some(chat.id.to_string());
                        }
                        from.filter(|f| f.username.as_deref().is_some_and(|u| u.eq_ignore_ascii_case(name)))
                            .map(|f| chat.map_or(f.id, |c| c.id).to_string())
                    });
                },
                Err(e) => warn!(error = %e, "could not fetch telegram updates"),
            }
            match &contact.chat_id {
                Some(id) => info!(username = %name, chat_id = %id, "resolved telegram username"),
                None => warn!(
                    username = %name,
                    "could not resolve telegram username; the user must message the bot first"
                ),
            }
        },
    }

    Ok(contact)
}
