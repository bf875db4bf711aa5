use async_process::Command;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{direct_url::DirectUrlProbe, is_http_url, CandidateRecord, MetadataProvider};
use crate::error::ResolveError;

/// Proveedor de metadata respaldado por `yt-dlp`.
pub struct YtDlpProvider {
    ytdlp_path: String,
    probe: DirectUrlProbe,
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

impl YtDlpProvider {
    pub fn new(ytdlp_path: impl Into<String>, probe: DirectUrlProbe) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            probe,
            rate_limiter: Semaphore::new(3),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, ResolveError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolveError::provider("yt-dlp", e))?;

        let output = Command::new(&self.ytdlp_path)
            .args(args)
            .output()
            .await
            .map_err(|e| ResolveError::provider("Error al ejecutar yt-dlp", e))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ResolveError::provider("yt-dlp", error));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl MetadataProvider for YtDlpProvider {
    async fn probe_content_type(&self, url: &str) -> Result<Option<String>, ResolveError> {
        self.probe.content_type(url).await
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<Option<CandidateRecord>>, ResolveError> {
        let max_results = max_results.max(1);
        let limit = max_results.to_string();

        let stdout = if is_http_url(query) {
            debug!("📋 Obteniendo entradas de: {}", query);
            self.run(&[
                "--dump-json",
                "--skip-download",
                "--no-warnings",
                "--playlist-end",
                &limit,
                query,
            ])
            .await?
        } else {
            info!("🔍 Buscando en YouTube: {}", query);
            let search_query = format!("ytsearch{max_results}:{query}");
            self.run(&[
                "--no-playlist",
                "--dump-json",
                "--skip-download",
                "--no-warnings",
                &search_query,
            ])
            .await?
        };

        Ok(parse_search_output(&stdout))
    }

    async fn fetch_full_info(&self, page_url: &str) -> Result<CandidateRecord, ResolveError> {
        debug!("📊 Obteniendo info de: {}", page_url);

        let stdout = self
            .run(&[
                "--no-playlist",
                "-f",
                "bestaudio/best",
                "--dump-single-json",
                "--no-warnings",
                page_url,
            ])
            .await?;

        let info: Value = serde_json::from_str(stdout.trim())
            .map_err(|e| ResolveError::provider("Error al parsear respuesta de yt-dlp", e))?;

        first_playable(info).ok_or_else(|| ResolveError::no_match(page_url))
    }

    async fn probe_duration(&self, url: &str) -> Option<u64> {
        self.probe.duration(url).await
    }
}

/// Una entrada por línea; las líneas `null` o ilegibles quedan como `None`.
fn parse_search_output(stdout: &str) -> Vec<Option<CandidateRecord>> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| match serde_json::from_str::<Option<CandidateRecord>>(line) {
            Ok(record) => record,
            Err(e) => {
                warn!("Entrada de yt-dlp ilegible: {}", e);
                None
            }
        })
        .collect()
}

/// Info completa de un video, o la primera entrada no nula si es un grupo.
fn first_playable(info: Value) -> Option<CandidateRecord> {
    match info {
        Value::Object(mut map) => match map.remove("entries") {
            Some(Value::Array(entries)) => entries.into_iter().find_map(first_playable),
            _ => serde_json::from_value(Value::Object(map)).ok(),
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn search_output_keeps_positions_of_bad_entries() {
        let stdout = concat!(
            r#"{"title": "First", "webpage_url": "https://youtu.be/1"}"#,
            "\n",
            "null\n",
            "{broken\n",
            "\n",
            r#"{"title": "Second", "channel": "Artist - Topic"}"#,
            "\n"
        );

        let parsed = parse_search_output(stdout);

        assert_eq!(parsed.len(), 4);
        assert_eq!(parsed[0].as_ref().map(|r| r.title.as_str()), Some("First"));
        assert!(parsed[1].is_none());
        assert!(parsed[2].is_none());
        assert_eq!(
            parsed[3].as_ref().map(|r| r.channel_name()),
            Some("Artist - Topic")
        );
    }

    #[test]
    fn grouped_info_yields_first_non_null_entry() {
        let info = json!({
            "_type": "playlist",
            "title": "Mix",
            "entries": [
                null,
                {"title": "Track A", "url": "https://stream/a"},
                {"title": "Track B", "url": "https://stream/b"}
            ]
        });

        let record = first_playable(info).unwrap();
        assert_eq!(record.title, "Track A");
        assert_eq!(record.stream_url.as_deref(), Some("https://stream/a"));
    }

    #[test]
    fn grouped_info_with_only_nulls_is_empty() {
        assert!(first_playable(json!({"entries": [null, null]})).is_none());
        assert!(first_playable(Value::Null).is_none());
    }

    #[test]
    fn single_video_info_is_used_as_is() {
        let info = json!({
            "title": "Song",
            "uploader": "Artist",
            "duration": 200.0,
            "webpage_url": "https://www.youtube.com/watch?v=x",
            "url": "https://rr.googlevideo.com/x"
        });

        let record = first_playable(info).unwrap();
        assert_eq!(record.duration_secs(), 200);
        assert_eq!(record.channel_name(), "Artist");
    }
}
