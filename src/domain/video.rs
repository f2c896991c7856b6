// Resolving course video URLs into provider-specific player references

use reqwest::Url;

const YOUTUBE_ID_LEN: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoProvider {
    YouTube,
}

/// A video the embedded player can be bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRef {
    pub provider: VideoProvider,
    pub id: String,
}

impl VideoRef {
    /// Resolve a course video URL. Returns `None` for URL shapes the player
    /// cannot be bound to; callers fall back to a passive embed.
    ///
    /// Accepted shapes:
    /// - `https://www.youtube.com/watch?v=ID`
    /// - `https://youtu.be/ID`
    /// - `https://www.youtube.com/embed/ID` (also `youtube-nocookie.com`)
    /// - `https://www.youtube.com/shorts/ID`, `/live/ID`, `/v/ID`
    pub fn resolve(video_url: &str) -> Option<Self> {
        let url = Url::parse(video_url.trim()).ok()?;
        let host = url.host_str()?.to_ascii_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host);
        let host = host.strip_prefix("m.").unwrap_or(host);

        let candidate = match host {
            "youtu.be" => url.path_segments()?.next().map(str::to_string),
            "youtube.com" | "youtube-nocookie.com" | "music.youtube.com" => {
                let mut segments = url.path_segments()?;
                match segments.next() {
                    Some("watch") => url
                        .query_pairs()
                        .find(|(k, _)| k == "v")
                        .map(|(_, v)| v.into_owned()),
                    Some("embed" | "shorts" | "live" | "v") => {
                        segments.next().map(str::to_string)
                    }
                    _ => None,
                }
            }
            _ => None,
        }?;

        if is_youtube_id(&candidate) {
            Some(VideoRef {
                provider: VideoProvider::YouTube,
                id: candidate,
            })
        } else {
            tracing::debug!(%video_url, %candidate, "rejecting malformed video id");
            None
        }
    }

    /// Canonical embed URL for this reference.
    pub fn embed_url(&self) -> String {
        match self.provider {
            VideoProvider::YouTube => format!("https://www.youtube.com/embed/{}", self.id),
        }
    }
}

fn is_youtube_id(s: &str) -> bool {
    s.len() == YOUTUBE_ID_LEN
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
