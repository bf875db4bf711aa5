//! # Sources Module
//!
//! Everything needed to turn what a user typed into a playable [`Track`]:
//!
//! - [`resolver`]: classifies the request and drives the lookup
//! - [`matcher`]: scores search candidates against foreign catalog metadata
//! - [`youtube`]: `yt-dlp` backed [`MetadataProvider`]
//! - [`direct_url`]: HTTP content-type and `ffprobe` duration probes
//! - [`spotify`]: [`CatalogScraper`] for Spotify track pages
//!
//! The provider and the scraper are traits so the resolver can be exercised
//! without spawning processes or touching the network.
//!
//! [`Track`]: crate::audio::track::Track

pub mod direct_url;
pub mod matcher;
pub mod resolver;
pub mod spotify;
pub mod youtube;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ResolveError;

pub use direct_url::DirectUrlProbe;
pub use resolver::SourceResolver;
pub use spotify::SpotifyScraper;
pub use youtube::YtDlpProvider;

/// Registro devuelto por el proveedor de búsqueda (formato `yt-dlp --dump-json`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CandidateRecord {
    #[serde(default)]
    pub title: String,
    pub channel: Option<String>,
    pub uploader: Option<String>,
    pub uploader_url: Option<String>,
    pub thumbnail: Option<String>,
    pub duration: Option<f64>,
    pub webpage_url: Option<String>,
    /// URL del formato seleccionado; solo presente tras extracción completa.
    #[serde(rename = "url")]
    pub stream_url: Option<String>,
}

impl CandidateRecord {
    /// URL de la página del track, usada para pedir la info completa.
    pub fn page_url(&self) -> Option<&str> {
        self.webpage_url.as_deref().or(self.stream_url.as_deref())
    }

    pub fn channel_name(&self) -> &str {
        self.channel
            .as_deref()
            .or(self.uploader.as_deref())
            .unwrap_or_default()
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| d.round() as u64)
            .unwrap_or(0)
    }
}

/// Metadata de referencia extraída de un catálogo externo.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceMetadata {
    pub title: String,
    pub artist: String,
    pub image: Option<String>,
    pub description: Option<String>,
}

impl ReferenceMetadata {
    /// Frase de búsqueda `"{artist} - {title}"`.
    pub fn search_phrase(&self) -> String {
        format!("{} - {}", self.artist, self.title)
    }
}

/// Proveedor de metadata y búsqueda (caja negra).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// MIME type anunciado por la URL, si lo hay.
    async fn probe_content_type(&self, url: &str) -> Result<Option<String>, ResolveError>;

    /// Hasta `max_results` candidatos; las entradas inutilizables llegan como `None`.
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<Option<CandidateRecord>>, ResolveError>;

    async fn fetch_full_info(&self, page_url: &str) -> Result<CandidateRecord, ResolveError>;

    /// Duración en segundos, `None` si no se pudo determinar.
    async fn probe_duration(&self, url: &str) -> Option<u64>;
}

/// Catálogo externo cuyas entradas hay que localizar en otro servicio.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogScraper: Send + Sync {
    fn matches(&self, request: &str) -> bool;

    async fn fetch_reference(&self, url: &str) -> Result<ReferenceMetadata, ResolveError>;

    fn source_name(&self) -> &'static str;
}

/// `true` si la petición parece una URL http(s).
pub fn is_http_url(request: &str) -> bool {
    url::Url::parse(request)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}
