use async_trait::async_trait;
use regex::Regex;
use std::{collections::HashMap, sync::LazyLock, time::Duration};
use tracing::{debug, info};

use super::{CatalogScraper, ReferenceMetadata};
use crate::error::ResolveError;

static META_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<meta\s[^>]*>").expect("static regex"));
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)([a-z][a-z0-9_:-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("static regex")
});

/// Lee título y artista de las etiquetas `<meta>` de una página de Spotify.
pub struct SpotifyScraper {
    client: reqwest::Client,
}

impl SpotifyScraper {
    pub fn new(timeout: Duration) -> Result<Self, ResolveError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (compatible; jukebox)")
            .build()
            .map_err(|e| ResolveError::provider("cliente HTTP", e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CatalogScraper for SpotifyScraper {
    fn matches(&self, request: &str) -> bool {
        url::Url::parse(request)
            .ok()
            .and_then(|u| u.host_str().map(|h| h == "spotify.com" || h.ends_with(".spotify.com")))
            .unwrap_or(false)
    }

    async fn fetch_reference(&self, url: &str) -> Result<ReferenceMetadata, ResolveError> {
        info!("🎧 Leyendo metadata de Spotify: {}", url);

        let html = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| ResolveError::provider(format!("GET {url}"), e))?
            .text()
            .await
            .map_err(|e| ResolveError::provider(format!("GET {url}"), e))?;

        let reference = parse_reference(&html, url)?;
        debug!("Referencia: {} - {}", reference.artist, reference.title);
        Ok(reference)
    }

    fn source_name(&self) -> &'static str {
        "spotify"
    }
}

/// Extrae la referencia de las etiquetas Open Graph de la página.
///
/// Si falta el artista se intenta partir el título por `" - "`.
pub fn parse_reference(html: &str, url: &str) -> Result<ReferenceMetadata, ResolveError> {
    let tags = meta_tags(html);
    let get = |key: &str| {
        tags.get(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    let mut title = get("og:title");
    let mut artist = get("music:musician_description");

    if artist.is_none() {
        if let Some((left, right)) = title.as_deref().and_then(|t| t.split_once(" - ")) {
            let (left, right) = (left.trim().to_string(), right.trim().to_string());
            artist = Some(left);
            title = Some(right);
        }
    }

    let title = title.ok_or(ResolveError::Metadata {
        url: url.to_string(),
        field: "title",
    })?;
    let artist = artist.ok_or(ResolveError::Metadata {
        url: url.to_string(),
        field: "artist",
    })?;

    Ok(ReferenceMetadata {
        title,
        artist,
        image: get("og:image"),
        description: get("og:description"),
    })
}

/// `property`/`name` → `content` de cada `<meta>`; gana la primera aparición.
fn meta_tags(html: &str) -> HashMap<String, String> {
    let mut tags = HashMap::new();

    for tag in META_TAG.find_iter(html) {
        let mut key = None;
        let mut content = None;

        for attr in ATTRIBUTE.captures_iter(tag.as_str()) {
            let value = attr
                .get(2)
                .or_else(|| attr.get(3))
                .map(|m| decode_entities(m.as_str()))
                .unwrap_or_default();
            match attr[1].to_ascii_lowercase().as_str() {
                "property" | "name" => key = Some(value),
                "content" => content = Some(value),
                _ => {}
            }
        }

        if let (Some(key), Some(content)) = (key, content) {
            tags.entry(key).or_insert(content);
        }
    }

    tags
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const URL: &str = "https://open.spotify.com/track/abc";

    #[test]
    fn reads_open_graph_tags() {
        let html = r#"<html><head>
            <meta property="og:title" content="Bohemian Rhapsody"/>
            <meta name="music:musician_description" content="Queen">
            <meta property="og:image" content='https://i.scdn.co/image/x'>
            <meta property="og:description" content="Queen &amp; friends · Song · 1975">
        </head></html>"#;

        let reference = parse_reference(html, URL).unwrap();

        assert_eq!(
            reference,
            ReferenceMetadata {
                title: "Bohemian Rhapsody".into(),
                artist: "Queen".into(),
                image: Some("https://i.scdn.co/image/x".into()),
                description: Some("Queen & friends · Song · 1975".into()),
            }
        );
        assert_eq!(reference.search_phrase(), "Queen - Bohemian Rhapsody");
    }

    #[test]
    fn artist_falls_back_to_title_split() {
        let html = r#"<meta content="Daft Punk - One More Time" property="og:title">"#;

        let reference = parse_reference(html, URL).unwrap();

        assert_eq!(reference.artist, "Daft Punk");
        assert_eq!(reference.title, "One More Time");
    }

    #[test]
    fn missing_title_or_artist_is_a_metadata_error() {
        let err = parse_reference("<html></html>", URL).unwrap_err();
        assert!(matches!(err, ResolveError::Metadata { field: "title", .. }));

        let html = r#"<meta property="og:title" content="Untitled">"#;
        let err = parse_reference(html, URL).unwrap_err();
        assert!(matches!(err, ResolveError::Metadata { field: "artist", .. }));
    }

    #[test]
    fn only_spotify_hosts_match() {
        let scraper = SpotifyScraper::new(Duration::from_secs(5)).unwrap();
        assert!(scraper.matches("https://open.spotify.com/track/abc"));
        assert!(scraper.matches("https://spotify.com/track/abc"));
        assert!(!scraper.matches("https://notspotify.com/track"));
        assert!(!scraper.matches("spotify songs"));
    }
}
