//! The operator contact record (`USER.md`) in the agent workspace.

use std::path::{Path, PathBuf};

use {
    clawgate_telegram::{BotApi, ContactTarget, ResolvedContact, resolve_contact},
    tracing::{error, info},
};

use crate::error::Result;

pub const CONTACT_FILE: &str = "USER.md";

/// Markdown body of the contact record.
pub fn render_contact(contact: &ResolvedContact) -> String {
    let mut lines = vec!["# User".to_string()];
    match (&contact.chat_id, &contact.username) {
        (Some(chat_id), username) => {
            lines.push(String::new());
            lines.push("## Telegram".into());
            lines.push(format!("- Chat ID: {chat_id}"));
            if let Some(username) = username {
                lines.push(format!("- Username: @{username}"));
            }
            lines.push(String::new());
            lines.push(format!(
                "When sending Telegram messages to this user, use target `telegram:{chat_id}` \
                 (numeric chat ID, not @username)."
            ));
        },
        (None, Some(username)) => {
            lines.push(String::new());
            lines.push("## Telegram".into());
            lines.push(format!("- Username: @{username}"));
            lines.push("- Chat ID: unknown (user hasn't messaged the bot yet)".into());
            lines.push(String::new());
            lines.push("Cannot send Telegram messages until the user messages the bot first.".into());
        },
        (None, None) => {},
    }
    lines.push(String::new());
    lines.join("\n")
}

/// Resolve the operator's Telegram identity and write `USER.md`.
///
/// Returns the written path, or `None` when nothing was written because the
/// bot token was rejected. Network trouble after the token check still
/// produces a record with whatever was known from `user_id`.
pub async fn write_contact(
    api: &BotApi,
    user_id: Option<&str>,
    workspace_dir: &Path,
) -> Result<Option<PathBuf>> {
    let target = user_id.and_then(ContactTarget::parse);
    let contact = match resolve_contact(api, target.as_ref()).await {
        Ok(contact) => contact,
        Err(clawgate_telegram::Error::Api { description, .. }) => {
            error!(%description, "telegram bot token rejected, not writing contact record");
            return Ok(None);
        },
        Err(e) => {
            error!(error = %e, "could not resolve telegram user");
            match target {
                Some(ContactTarget::ChatId(id)) => ResolvedContact {
                    chat_id: Some(id),
                    ..Default::default()
                },
                Some(ContactTarget::Username(name)) => ResolvedContact {
                    username: Some(name),
                    ..Default::default()
                },
                None => ResolvedContact::default(),
            }
        },
    };

    std::fs::create_dir_all(workspace_dir)?;
    let path = workspace_dir.join(CONTACT_FILE);
    std::fs::write(&path, render_contact(&contact))?;
    info!(path = %path.display(), chat_id = contact.chat_id.as_deref(), "wrote contact record");
    Ok(Some(path))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn render_with_chat_id() {
        let contact = ResolvedContact {
            bot_username: Some("clawbot".into()),
            chat_id: Some("42".into()),
            username: Some("alice".into()),
        };
        assert_eq!(
            render_contact(&contact),
            "# User\n\n## Telegram\n- Chat ID: 42\n- Username: @alice\n\n\
             When sending Telegram messages to this user, use target `telegram:42` \
             (numeric chat ID, not @username).\n"
        );
    }

    #[test]
    fn render_username_only() {
        let contact = ResolvedContact {
            username: Some("bob".into()),
            ..Default::default()
        };
        let body = render_contact(&contact);
        assert!(body.contains("- Username: @bob\n- Chat ID: unknown"));
        assert!(body.ends_with("messages the bot first.\n"));
    }

    #[test]
    fn render_empty() {
        assert_eq!(render_contact(&ResolvedContact::default()), "# User\n");
    }

    #[tokio::test]
    async fn rejected_token_writes_nothing() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/bot9:bad/getMe")
            .with_status(401)
            .with_body(r#"{"ok":false,"description":"Unauthorized"}"#)
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let api = BotApi::with_base(server.url(), "9:bad");

        let written = write_contact(&api, Some("123"), dir.path()).await.unwrap();
        assert!(written.is_none());
        assert!(!dir.path().join(CONTACT_FILE).exists());
    }

    #[tokio::test]
    async fn numeric_id_is_written() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/bot9:ok/getMe")
            .with_body(r#"{"ok":true,"result":{"id":9,"username":"clawbot"}}"#)
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path().join("workspace");
        let api = BotApi::with_base(server.url(), "9:ok");

        let path = write_contact(&api, Some("555"), &ws).await.unwrap().unwrap();
        let body = std::fs::read_to_string(path).unwrap();
        assert!(body.contains("- Chat ID: 555"));
        assert!(body.contains("`telegram:555`"));
    }
}
