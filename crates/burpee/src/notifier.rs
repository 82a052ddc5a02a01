use thiserror::Error;
use tracing::info;

use crate::slack::{ChatClient, PostedMessage, SlackError};

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Failed to post message to {channel}: {source}")]
    SendFailed {
        channel: String,
        #[source]
        source: SlackError,
    },
}

/// リマインダーの本文。
pub fn message_text(counter: u64) -> String {
    format!("BURPEE TIME! Drop and give me #{counter}")
}

/// カウンター入りのリマインダーを `channel_id` に投稿する。
pub async fn send_reminder<C: ChatClient>(
    client: &C,
    channel_id: &str,
    counter: u64,
) -> Result<PostedMessage, NotifyError> {
    let text = message_text(counter);
    let posted = client
        .post_message(channel_id, &text)
        .await
        .map_err(|source| NotifyError::SendFailed {
            channel: channel_id.to_string(),
            source,
        })?;

    info!(channel = %posted.channel, ts = %posted.ts, counter, "Reminder posted");
    Ok(posted)
}
