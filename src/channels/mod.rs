use async_trait::async_trait;

pub mod whatsapp;

pub use whatsapp::CloudApi;

/// WhatsApp truncates around 4096 characters; staying under 4000 bytes keeps
/// a margin and is always within the character limit.
pub const WHATSAPP_TEXT_LIMIT: usize = 4000;

/// Media bytes fetched from the platform, with the MIME type it reported.
#[derive(Debug, Clone)]
pub struct MediaDownload {
    pub bytes: Vec<u8>,
    pub mime: String,
}

/// Outbound reply delivery.
#[async_trait]
pub trait OutboundSender: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> anyhow::Result<()>;
}

/// Media retrieval by platform media id.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, media_id: &str) -> anyhow::Result<MediaDownload>;
}

/// Split a message into chunks respecting UTF-8 character boundaries.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    if text.len() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.len() > limit {
        // Find the largest valid byte index <= limit that is a char boundary
        let mut split_at = limit;
        while split_at > 0 && !remaining.is_char_boundary(split_at) {
            split_at -= 1;
        }
        if split_at == 0 {
            // Degenerate case: single character wider than limit
            split_at = remaining
                .char_indices()
                .nth(1)
                .map_or(remaining.len(), |(i, _)| i);
        }

        // Try paragraph boundary within the safe range
        if let Some(idx) = remaining[..split_at].rfind("\n\n") {
            chunks.push(remaining[..idx].trim().to_string());
            remaining = &remaining[idx + 2..];
            continue;
        }

        // Try single newline
        if let Some(idx) = remaining[..split_at].rfind('\n') {
            chunks.push(remaining[..idx].trim().to_string());
            remaining = &remaining[idx + 1..];
            continue;
        }

        // Hard cut at char boundary
        chunks.push(remaining[..split_at].to_string());
        remaining = &remaining[split_at..];
    }

    if !remaining.is_empty() {
        chunks.push(remaining.trim().to_string());
    }

    chunks.into_iter().filter(|c| !c.is_empty()).collect()
}
