use async_process::Command;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ResolveError;

/// Uploader mostrado para archivos de audio enlazados directamente.
pub const DIRECT_AUDIO_UPLOADER: &str = "Direct Audio URL";

/// Sondas para URLs que apuntan directamente a un archivo de audio.
#[derive(Debug, Clone)]
pub struct DirectUrlProbe {
    client: reqwest::Client,
    ffprobe_path: String,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

impl DirectUrlProbe {
    pub fn new(ffprobe_path: impl Into<String>, timeout: Duration) -> Result<Self, ResolveError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("jukebox/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ResolveError::provider("cliente HTTP", e))?;

        Ok(Self {
            client,
            ffprobe_path: ffprobe_path.into(),
        })
    }

    /// `Content-Type` devuelto por un `HEAD` (siguiendo redirecciones).
    pub async fn content_type(&self, url: &str) -> Result<Option<String>, ResolveError> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| ResolveError::provider(format!("HEAD {url}"), e))?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_ascii_lowercase());

        debug!("Content-Type de {}: {:?}", url, content_type);
        Ok(content_type)
    }

    /// Duración según `ffprobe`, o `None` si no se pudo leer.
    pub async fn duration(&self, url: &str) -> Option<u64> {
        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", url])
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                parse_ffprobe_duration(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(output) => {
                warn!(
                    "ffprobe falló para {}: {}",
                    url,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                None
            }
            Err(e) => {
                warn!("No se pudo ejecutar ffprobe: {}", e);
                None
            }
        }
    }
}

pub fn is_audio_content_type(content_type: &str) -> bool {
    content_type.trim().to_ascii_lowercase().starts_with("audio/")
}

/// Último segmento no vacío del path, o la URL completa si no hay ninguno.
pub fn title_from_url(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .map(str::to_string)
        })
        .unwrap_or_else(|| url.to_string())
}

fn parse_ffprobe_duration(json: &str) -> Option<u64> {
    let output: FfprobeOutput = serde_json::from_str(json).ok()?;
    let seconds: f64 = output.format?.duration?.trim().parse().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then(|| seconds.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn audio_content_types() {
        assert!(is_audio_content_type("audio/mpeg"));
        assert!(is_audio_content_type("Audio/OGG; charset=binary"));
        assert!(!is_audio_content_type("text/html; charset=utf-8"));
        assert!(!is_audio_content_type("video/mp4"));
    }

    #[test]
    fn title_is_last_path_segment() {
        assert_eq!(
            title_from_url("https://cdn.example.com/music/track01.mp3?sig=abc"),
            "track01.mp3"
        );
        assert_eq!(title_from_url("https://cdn.example.com/music/live/"), "live");
        assert_eq!(title_from_url("https://cdn.example.com"), "https://cdn.example.com");
    }

    #[test]
    fn ffprobe_duration_parsing() {
        let json = r#"{"format": {"filename": "x", "duration": "187.512000"}}"#;
        assert_eq!(parse_ffprobe_duration(json), Some(188));

        assert_eq!(parse_ffprobe_duration(r#"{"format": {}}"#), None);
        assert_eq!(parse_ffprobe_duration(r#"{"format": {"duration": "N/A"}}"#), None);
        assert_eq!(parse_ffprobe_duration("not json"), None);
    }
}
