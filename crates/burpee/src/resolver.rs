//! チャンネル名から Slack のチャンネル ID を引く。

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, warn};

use crate::slack::{ChatClient, ListChannels, SlackError};

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Channel {name} not found (scanned {scanned} channels)")]
    ChannelNotFound { name: String, scanned: usize },
    #[error("Failed to list channels: {0}")]
    ListFailed(#[source] SlackError),
}

/// チャンネル一覧の走査範囲。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelScan {
    /// 1 ページあたりの件数
    pub page_size: u32,
    /// 読むページ数の上限。`None` ならカーソルが尽きるか、同じカーソルが再び返るまで読む
    pub max_pages: Option<u32>,
}

impl Default for ChannelScan {
    fn default() -> Self {
        Self {
            page_size: 1000,
            max_pages: None,
        }
    }
}

/// `name` と完全一致する最初のチャンネルの ID を返す。
pub async fn resolve_channel<C: ChatClient>(
    client: &C,
    name: &str,
    scan: ChannelScan,
) -> Result<String, ResolveError> {
    let mut cursor: Option<String> = None;
    let mut seen_cursors = HashSet::new();
    let mut scanned = 0;
    let mut pages = 0;

    loop {
        let page = client
            .list_channels(ListChannels {
                limit: scan.page_size,
                cursor: cursor.as_deref(),
            })
            .await
            .map_err(ResolveError::ListFailed)?;
        pages += 1;

        for channel in page.channels {
            scanned += 1;
            debug!(channel = %channel.name, id = %channel.id, "Scanning channel");
            if channel.name == name {
                return Ok(channel.id);
            }
        }

        cursor = page.next_cursor;
        if let Some(next) = &cursor
            && !seen_cursors.insert(next.clone())
        {
            warn!(cursor = %next, pages, "Channel list returned a cursor twice, stopping scan");
            break;
        }
        let exhausted = scan.max_pages.is_some_and(|max| pages >= max);
        if cursor.is_none() || exhausted {
            break;
        }
    }

    Err(ResolveError::ChannelNotFound {
        name: name.to_string(),
        scanned,
    })
}
