use chrono::{DateTime, Utc};
use serenity::model::id::{ChannelId, UserId};
use std::{fmt, time::Duration};

/// Un track resuelto y listo para reproducir.
///
/// Se construye una sola vez en el resolver y luego solo se mueve: de la cola a
/// la sesión y de ahí al transporte. No expone ningún setter `&mut`.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    title: String,
    duration_secs: u64,
    uploader: String,
    uploader_url: Option<String>,
    thumbnail_url: Option<String>,
    page_url: Option<String>,
    stream_url: String,
    requester: UserId,
    source_channel: ChannelId,
    requested_at: DateTime<Utc>,
}

impl Track {
    pub fn new(
        title: impl Into<String>,
        stream_url: impl Into<String>,
        requester: UserId,
        source_channel: ChannelId,
    ) -> Self {
        Self {
            title: title.into(),
            duration_secs: 0,
            uploader: "Desconocido".to_string(),
            uploader_url: None,
            thumbnail_url: None,
            page_url: None,
            stream_url: stream_url.into(),
            requester,
            source_channel,
            requested_at: Utc::now(),
        }
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }
    pub fn duration(&self) -> Option<Duration> {
        (self.duration_secs > 0).then(|| Duration::from_secs(self.duration_secs))
    }
    pub fn uploader(&self) -> &str {
        &self.uploader
    }
    pub fn uploader_url(&self) -> Option<&str> {
        self.uploader_url.as_deref()
    }
    pub fn thumbnail_url(&self) -> Option<&str> {
        self.thumbnail_url.as_deref()
    }
    pub fn page_url(&self) -> Option<&str> {
        self.page_url.as_deref()
    }
    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }
    pub fn requester(&self) -> UserId {
        self.requester
    }
    pub fn source_channel(&self) -> ChannelId {
        self.source_channel
    }
    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }

    // Constructores encadenados
    pub fn with_duration_secs(mut self, secs: u64) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn with_uploader(mut self, uploader: impl Into<String>) -> Self {
        self.uploader = uploader.into();
        self
    }

    pub fn with_uploader_url(mut self, url: Option<String>) -> Self {
        self.uploader_url = url;
        self
    }

    pub fn with_thumbnail_url(mut self, url: Option<String>) -> Self {
        self.thumbnail_url = url;
        self
    }

    pub fn with_page_url(mut self, url: Option<String>) -> Self {
        self.page_url = url;
        self
    }

    /// Duración legible, `None` si el proveedor no la conoce.
    pub fn formatted_duration(&self) -> Option<String> {
        self.duration().map(format_duration)
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "**{}** by **{}**", self.title, self.uploader)
    }
}

pub fn format_duration(duration: Duration) -> String {
    humantime::format_duration(duration).to_string()
}

/// Proyección de un track para responder al front-end tras encolar.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSummary {
    pub title: String,
    pub uploader: String,
    pub duration: Option<String>,
    pub page_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub requester: UserId,
    /// Posición 1-based dentro de la cola en el momento de encolar.
    pub position: usize,
}

impl TrackSummary {
    pub fn new(track: &Track, position: usize) -> Self {
        Self {
            title: track.title.clone(),
            uploader: track.uploader.clone(),
            duration: track.formatted_duration(),
            page_url: track.page_url.clone(),
            thumbnail_url: track.thumbnail_url.clone(),
            requester: track.requester,
            position,
        }
    }
}
