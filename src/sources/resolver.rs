use serenity::model::id::{ChannelId, UserId};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    direct_url::{is_audio_content_type, title_from_url, DIRECT_AUDIO_UPLOADER},
    is_http_url, matcher, CandidateRecord, CatalogScraper, MetadataProvider,
};
use crate::{audio::track::Track, error::ResolveError};

/// Cantidad de candidatos pedidos al emparejar con un catálogo externo.
pub const DEFAULT_SEARCH_CANDIDATES: usize = 5;

/// Convierte la petición de un usuario en un [`Track`] reproducible.
///
/// El orden de clasificación es fijo: catálogo externo, URL de audio directo
/// y, en cualquier otro caso, búsqueda en el proveedor.
pub struct SourceResolver {
    provider: Arc<dyn MetadataProvider>,
    catalogs: Vec<Arc<dyn CatalogScraper>>,
    search_candidates: usize,
}

impl SourceResolver {
    pub fn new(provider: Arc<dyn MetadataProvider>) -> Self {
        Self {
            provider,
            catalogs: Vec::new(),
            search_candidates: DEFAULT_SEARCH_CANDIDATES,
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogScraper>) -> Self {
        self.catalogs.push(catalog);
        self
    }

    pub fn with_search_candidates(mut self, candidates: usize) -> Self {
        self.search_candidates = candidates.max(1);
        self
    }

    pub async fn resolve(
        &self,
        request: &str,
        requester: UserId,
        source_channel: ChannelId,
    ) -> Result<Track, ResolveError> {
        let request = request.trim();
        if request.is_empty() {
            return Err(ResolveError::no_match(request));
        }

        if let Some(catalog) = self.catalogs.iter().find(|c| c.matches(request)) {
            return self
                .resolve_catalog(catalog.as_ref(), request, requester, source_channel)
                .await;
        }

        if is_http_url(request) && self.is_direct_audio(request).await {
            return Ok(self.resolve_direct(request, requester, source_channel).await);
        }

        self.resolve_search(request, requester, source_channel).await
    }

    async fn resolve_catalog(
        &self,
        catalog: &dyn CatalogScraper,
        url: &str,
        requester: UserId,
        source_channel: ChannelId,
    ) -> Result<Track, ResolveError> {
        let reference = catalog.fetch_reference(url).await?;
        let query = reference.search_phrase();

        info!(
            "🔗 {} → buscando \"{}\" ({} candidatos)",
            catalog.source_name(),
            query,
            self.search_candidates
        );

        let candidates = self
            .provider
            .search(&query, self.search_candidates)
            .await?;

        let (best, score) = matcher::select_best(&candidates, &reference)
            .ok_or_else(|| ResolveError::no_match(query.as_str()))?;
        debug!("Mejor candidato: {} (puntaje {})", best.title, score);

        let page_url = best
            .page_url()
            .ok_or_else(|| ResolveError::no_match(query.as_str()))?;
        let full = self.provider.fetch_full_info(page_url).await?;

        build_track(full, page_url, requester, source_channel)
    }

    async fn is_direct_audio(&self, url: &str) -> bool {
        match self.provider.probe_content_type(url).await {
            Ok(Some(content_type)) => is_audio_content_type(&content_type),
            Ok(None) => false,
            Err(e) => {
                warn!("No se pudo sondear {}: {}; se intentará como búsqueda", url, e);
                false
            }
        }
    }

    async fn resolve_direct(&self, url: &str, requester: UserId, source_channel: ChannelId) -> Track {
        let duration = self.provider.probe_duration(url).await.unwrap_or(0);
        info!("🔗 Audio directo: {} ({}s)", url, duration);

        Track::new(title_from_url(url), url, requester, source_channel)
            .with_uploader(DIRECT_AUDIO_UPLOADER)
            .with_duration_secs(duration)
            .with_page_url(Some(url.to_string()))
    }

    async fn resolve_search(
        &self,
        request: &str,
        requester: UserId,
        source_channel: ChannelId,
    ) -> Result<Track, ResolveError> {
        let results = self.provider.search(request, 1).await?;
        let first = results
            .into_iter()
            .flatten()
            .next()
            .ok_or_else(|| ResolveError::no_match(request))?;

        let page_url = first
            .page_url()
            .map(str::to_string)
            .ok_or_else(|| ResolveError::no_match(request))?;
        let full = self.provider.fetch_full_info(&page_url).await?;

        build_track(full, &page_url, requester, source_channel)
    }
}

fn build_track(
    record: CandidateRecord,
    page_url: &str,
    requester: UserId,
    source_channel: ChannelId,
) -> Result<Track, ResolveError> {
    let stream_url = record
        .stream_url
        .clone()
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ResolveError::MissingStream {
            url: page_url.to_string(),
        })?;

    let title = if record.title.trim().is_empty() {
        page_url.to_string()
    } else {
        record.title.clone()
    };

    let mut track = Track::new(title, stream_url, requester, source_channel)
        .with_duration_secs(record.duration_secs())
        .with_uploader_url(record.uploader_url.clone())
        .with_thumbnail_url(record.thumbnail.clone())
        .with_page_url(Some(
            record.webpage_url.clone().unwrap_or_else(|| page_url.to_string()),
        ));

    let uploader = record.uploader.as_deref().or(record.channel.as_deref());
    if let Some(uploader) = uploader {
        track = track.with_uploader(uploader);
    }

    Ok(track)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{MockCatalogScraper, MockMetadataProvider, ReferenceMetadata};
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;

    const USER: u64 = 7;
    const CHANNEL: u64 = 11;

    fn candidate(title: &str, channel: &str, page: &str) -> Option<CandidateRecord> {
        Some(CandidateRecord {
            title: title.to_string(),
            channel: Some(channel.to_string()),
            webpage_url: Some(page.to_string()),
            ..CandidateRecord::default()
        })
    }

    fn full_info(title: &str, page: &str) -> CandidateRecord {
        CandidateRecord {
            title: title.to_string(),
            uploader: Some("Artist".to_string()),
            duration: Some(215.0),
            thumbnail: Some("https://i.ytimg.com/x.jpg".to_string()),
            webpage_url: Some(page.to_string()),
            stream_url: Some(format!("{page}/stream")),
            ..CandidateRecord::default()
        }
    }

    fn spotify(reference: Option<ReferenceMetadata>) -> MockCatalogScraper {
        let mut catalog = MockCatalogScraper::new();
        catalog
            .expect_matches()
            .returning(|request| request.contains("spotify.com"));
        catalog.expect_source_name().return_const("spotify");
        if let Some(reference) = reference {
            catalog
                .expect_fetch_reference()
                .times(1)
                .returning(move |_| Ok(reference.clone()));
        }
        catalog
    }

    #[tokio::test]
    async fn plain_text_uses_first_search_result() {
        let mut provider = MockMetadataProvider::new();
        provider.expect_probe_content_type().never();
        provider
            .expect_search()
            .with(eq("never gonna give you up"), eq(1))
            .times(1)
            .returning(|_, _| Ok(vec![None, candidate("Rick Astley - Never", "Rick", "https://yt/1")]));
        provider
            .expect_fetch_full_info()
            .with(eq("https://yt/1"))
            .times(1)
            .returning(|page| Ok(full_info("Never Gonna Give You Up", page)));

        let resolver = SourceResolver::new(Arc::new(provider));
        let track = resolver
            .resolve("  never gonna give you up ", UserId::new(USER), ChannelId::new(CHANNEL))
            .await
            .unwrap();

        assert_eq!(track.title(), "Never Gonna Give You Up");
        assert_eq!(track.stream_url(), "https://yt/1/stream");
        assert_eq!(track.uploader(), "Artist");
        assert_eq!(track.duration_secs(), 215);
        assert_eq!(track.requester(), UserId::new(USER));
        assert_eq!(track.source_channel(), ChannelId::new(CHANNEL));
    }

    #[tokio::test]
    async fn search_with_only_null_entries_is_no_match() {
        let mut provider = MockMetadataProvider::new();
        provider
            .expect_search()
            .returning(|_, _| Ok(vec![None, None]));
        provider.expect_fetch_full_info().never();

        let resolver = SourceResolver::new(Arc::new(provider));
        let err = resolver.resolve("nothing", UserId::new(USER), ChannelId::new(CHANNEL)).await.unwrap_err();

        assert!(matches!(err, ResolveError::NoMatch { .. }));
    }

    #[tokio::test]
    async fn missing_stream_url_is_reported() {
        let mut provider = MockMetadataProvider::new();
        provider
            .expect_search()
            .returning(|_, _| Ok(vec![candidate("Song", "x", "https://yt/2")]));
        provider.expect_fetch_full_info().returning(|page| {
            Ok(CandidateRecord {
                title: "Song".into(),
                webpage_url: Some(page.to_string()),
                ..CandidateRecord::default()
            })
        });

        let resolver = SourceResolver::new(Arc::new(provider));
        let err = resolver.resolve("song", UserId::new(USER), ChannelId::new(CHANNEL)).await.unwrap_err();

        assert!(matches!(err, ResolveError::MissingStream { url } if url == "https://yt/2"));
    }

    #[tokio::test]
    async fn direct_audio_url_skips_search() {
        let url = "https://cdn.example.com/sets/night.mp3";
        let mut provider = MockMetadataProvider::new();
        provider
            .expect_probe_content_type()
            .with(eq(url))
            .returning(|_| Ok(Some("audio/mpeg".into())));
        provider
            .expect_probe_duration()
            .with(eq(url))
            .returning(|_| Some(3600));
        provider.expect_search().never();

        let resolver = SourceResolver::new(Arc::new(provider));
        let track = resolver.resolve(url, UserId::new(USER), ChannelId::new(CHANNEL)).await.unwrap();

        assert_eq!(track.title(), "night.mp3");
        assert_eq!(track.uploader(), DIRECT_AUDIO_UPLOADER);
        assert_eq!(track.stream_url(), url);
        assert_eq!(track.duration_secs(), 3600);
    }

    #[tokio::test]
    async fn direct_audio_without_duration_defaults_to_zero() {
        let mut provider = MockMetadataProvider::new();
        provider
            .expect_probe_content_type()
            .returning(|_| Ok(Some("audio/ogg".into())));
        provider.expect_probe_duration().returning(|_| None);

        let resolver = SourceResolver::new(Arc::new(provider));
        let track = resolver
            .resolve("https://radio.example.com/live", UserId::new(USER), ChannelId::new(CHANNEL))
            .await
            .unwrap();

        assert_eq!(track.duration_secs(), 0);
        assert_eq!(track.duration(), None);
    }

    #[tokio::test]
    async fn non_audio_and_failed_probes_fall_through_to_search() {
        for probe in [
            Ok(Some("text/html".to_string())),
            Err(ResolveError::provider("HEAD", "timeout".to_string())),
        ] {
            let mut provider = MockMetadataProvider::new();
            provider
                .expect_probe_content_type()
                .return_once(move |_| probe);
            provider
                .expect_search()
                .with(eq("https://www.youtube.com/watch?v=abc"), eq(1))
                .times(1)
                .returning(|q, _| Ok(vec![candidate("Video", "Chan", q)]));
            provider
                .expect_fetch_full_info()
                .returning(|page| Ok(full_info("Video", page)));

            let resolver = SourceResolver::new(Arc::new(provider));
            let track = resolver
                .resolve("https://www.youtube.com/watch?v=abc", UserId::new(USER), ChannelId::new(CHANNEL))
                .await
                .unwrap();

            assert_eq!(track.title(), "Video");
        }
    }

    #[tokio::test]
    async fn catalog_link_is_matched_against_candidates() {
        let reference = ReferenceMetadata {
            title: "Song".into(),
            artist: "Artist".into(),
            image: None,
            description: None,
        };

        let mut provider = MockMetadataProvider::new();
        provider.expect_probe_content_type().never();
        provider
            .expect_search()
            .with(eq("Artist - Song"), eq(5))
            .times(1)
            .returning(|_, _| {
                Ok(vec![
                    candidate("Song (cover)", "Kid", "https://yt/cover"),
                    None,
                    candidate("Artist - Song", "Artist - Topic", "https://yt/topic"),
                    candidate("Song (Remix)", "DJ", "https://yt/remix"),
                ])
            });
        provider
            .expect_fetch_full_info()
            .with(eq("https://yt/topic"))
            .times(1)
            .returning(|page| Ok(full_info("Artist - Song", page)));

        let resolver = SourceResolver::new(Arc::new(provider))
            .with_catalog(Arc::new(spotify(Some(reference))));
        let track = resolver
            .resolve("https://open.spotify.com/track/xyz", UserId::new(USER), ChannelId::new(CHANNEL))
            .await
            .unwrap();

        assert_eq!(track.page_url(), Some("https://yt/topic"));
        assert_eq!(track.stream_url(), "https://yt/topic/stream");
    }

    #[tokio::test]
    async fn catalog_without_candidates_is_no_match() {
        let reference = ReferenceMetadata {
            title: "Obscure".into(),
            artist: "Nobody".into(),
            image: None,
            description: None,
        };
        let mut provider = MockMetadataProvider::new();
        provider.expect_search().returning(|_, _| Ok(vec![]));
        provider.expect_fetch_full_info().never();

        let resolver = SourceResolver::new(Arc::new(provider))
            .with_catalog(Arc::new(spotify(Some(reference))))
            .with_search_candidates(3);
        let err = resolver
            .resolve("https://open.spotify.com/track/none", UserId::new(USER), ChannelId::new(CHANNEL))
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::NoMatch { query } if query == "Nobody - Obscure"));
    }

    #[tokio::test]
    async fn catalog_metadata_error_propagates() {
        let mut catalog = spotify(None);
        catalog.expect_fetch_reference().returning(|url| {
            Err(ResolveError::Metadata {
                url: url.to_string(),
                field: "artist",
            })
        });
        let mut provider = MockMetadataProvider::new();
        provider.expect_search().never();

        let resolver = SourceResolver::new(Arc::new(provider)).with_catalog(Arc::new(catalog));
        let err = resolver
            .resolve("https://open.spotify.com/track/bad", UserId::new(USER), ChannelId::new(CHANNEL))
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::Metadata { field: "artist", .. }));
    }

    #[tokio::test]
    async fn empty_request_is_no_match() {
        let provider = MockMetadataProvider::new();
        let resolver = SourceResolver::new(Arc::new(provider));

        let err = resolver.resolve("   ", UserId::new(USER), ChannelId::new(CHANNEL)).await.unwrap_err();
        assert!(matches!(err, ResolveError::NoMatch { .. }));
    }
}
