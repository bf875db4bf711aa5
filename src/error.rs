//! Error taxonomy shared by the session layer and the resolver.
//!
//! Every operation exposed to the command layer returns [`PlayerError`], so the
//! front-end can tell a failed lookup apart from a bad queue index or a broken
//! voice connection without parsing strings.

use serenity::model::id::ChannelId;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// La petición no pudo convertirse en un track reproducible.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no se encontró nada que coincida con `{query}`")]
    NoMatch { query: String },

    #[error("metadata incompleta en `{url}`: falta `{field}`")]
    Metadata { url: String, field: &'static str },

    #[error("error del proveedor ({context})")]
    Provider {
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("no se obtuvo URL de stream para `{url}`")]
    MissingStream { url: String },
}

impl ResolveError {
    pub fn provider<E>(context: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Provider {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn no_match(query: impl Into<String>) -> Self {
        Self::NoMatch {
            query: query.into(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("índice {index} fuera de rango (la cola tiene {len} canciones)")]
pub struct IndexError {
    pub index: usize,
    pub len: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("el volumen debe estar entre 0 y 100, recibido {value}")]
pub struct RangeError {
    pub value: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("no hay una sesión activa en este servidor")]
    NoSession,
    #[error("no se está reproduciendo nada")]
    NothingPlaying,
    #[error("la reproducción no está pausada")]
    NotPaused,
    #[error("la sesión ya fue cerrada")]
    SessionClosed,
    #[error("la cola está llena (máximo {max} canciones)")]
    QueueFull { max: usize },
    #[error("la sesión ya está en otro canal de voz ({channel})")]
    OtherChannel { channel: ChannelId },
}

#[derive(Debug, Error)]
pub enum VoiceConnectionError {
    #[error("no se pudo conectar al canal de voz: {0}")]
    Connect(String),
    #[error("no se pudo abrir el stream `{url}`: {reason}")]
    Stream { url: String, reason: String },
    #[error("error de reproducción: {0}")]
    Play(String),
    #[error("error controlando el track: {0}")]
    Control(String),
}

/// Error devuelto por todas las operaciones del registro de sesiones.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Voice(#[from] VoiceConnectionError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn provider_error_keeps_cause() {
        let cause = std::io::Error::new(std::io::ErrorKind::NotFound, "yt-dlp missing");
        let err = ResolveError::provider("búsqueda", cause);

        let source = err.source().expect("cause should be attached");
        assert_eq!(source.to_string(), "yt-dlp missing");
    }

    #[test]
    fn player_error_preserves_variant() {
        let err: PlayerError = RangeError { value: 101 }.into();
        assert!(matches!(err, PlayerError::Range(RangeError { value: 101 })));

        let err: PlayerError = StateError::NoSession.into();
        assert!(matches!(err, PlayerError::State(StateError::NoSession)));
    }
}
