//! Heurística para elegir, entre los resultados de búsqueda, el que mejor
//! corresponde a un track de un catálogo externo.
//!
//! Los pesos son aditivos y no están normalizados:
//!
//! | señal                                              | peso |
//! |----------------------------------------------------|------|
//! | título de referencia contenido en el título        | +10  |
//! | artista de referencia contenido en el título       | +5   |
//! | canal terminado en `- topic` (canal oficial auto)  | +3   |
//! | el título contiene `official`                      | +2   |
//! | el título contiene `cover`                         | −5   |
//! | `remix` en el título pero no en la referencia      | −3   |

use regex::Regex;
use std::sync::LazyLock;

use super::{CandidateRecord, ReferenceMetadata};

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("static regex"));

/// Entrada efímera del scorer.
#[derive(Debug, Clone, Copy)]
pub struct MatchCandidate<'a> {
    pub title: &'a str,
    pub channel_name: &'a str,
    pub reference_title: &'a str,
    pub reference_artist: &'a str,
}

/// Minúsculas, sin puntuación, espacios colapsados.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    NON_WORD
        .replace_all(&lowered, "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn score(candidate: &MatchCandidate<'_>) -> f64 {
    let title = normalize(candidate.title);
    let reference_title = normalize(candidate.reference_title);
    let reference_artist = normalize(candidate.reference_artist);

    let mut score = 0.0;

    if title.contains(&reference_title) {
        score += 10.0;
    }
    if title.contains(&reference_artist) {
        score += 5.0;
    }

    // Preferir contenido oficial
    if candidate
        .channel_name
        .trim_end()
        .to_lowercase()
        .ends_with("- topic")
    {
        score += 3.0;
    }
    if title.contains("official") {
        score += 2.0;
    }

    // Penalizar coincidencias probablemente incorrectas
    if title.contains("cover") {
        score -= 5.0;
    }
    if title.contains("remix") && !reference_title.contains("remix") {
        score -= 3.0;
    }

    score
}

/// Elige el candidato de mayor puntaje; en empate gana el primero visto.
///
/// Las entradas `None` y las que no tienen título se ignoran.
pub fn select_best<'a>(
    candidates: &'a [Option<CandidateRecord>],
    reference: &ReferenceMetadata,
) -> Option<(&'a CandidateRecord, f64)> {
    let mut best: Option<(&CandidateRecord, f64)> = None;

    for record in candidates.iter().flatten() {
        if record.title.trim().is_empty() {
            continue;
        }
        let value = score(&MatchCandidate {
            title: &record.title,
            channel_name: record.channel_name(),
            reference_title: &reference.title,
            reference_artist: &reference.artist,
        });

        match best {
            Some((_, best_score)) if value <= best_score => {}
            _ => best = Some((record, value)),
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn reference(title: &str, artist: &str) -> ReferenceMetadata {
        ReferenceMetadata {
            title: title.to_string(),
            artist: artist.to_string(),
            image: None,
            description: None,
        }
    }

    fn record(title: &str, channel: &str) -> Option<CandidateRecord> {
        Some(CandidateRecord {
            title: title.to_string(),
            channel: Some(channel.to_string()),
            webpage_url: Some(format!("https://www.youtube.com/watch?v={}", title.len())),
            ..CandidateRecord::default()
        })
    }

    fn score_of(title: &str, channel: &str, reference_title: &str, reference_artist: &str) -> f64 {
        score(&MatchCandidate {
            title,
            channel_name: channel,
            reference_title,
            reference_artist,
        })
    }

    #[test]
    fn normalize_strips_punctuation_and_whitespace() {
        assert_eq!(normalize("  Don't   Stop (Official)  — Live! "), "dont stop official live");
    }

    #[test]
    fn score_is_deterministic() {
        let a = score_of("Artist - Song (Official Audio)", "Artist - Topic", "Song", "Artist");
        let b = score_of("Artist - Song (Official Audio)", "Artist - Topic", "Song", "Artist");
        assert_eq!(a, b);
        assert_eq!(a, 20.0);
    }

    #[test]
    fn official_upload_beats_cover() {
        let official = score_of("Artist Official Topic — Song", "", "Song", "Artist");
        let cover = score_of("Song (cover)", "", "Song", "Artist");
        assert!(official > cover, "{official} should beat {cover}");
        assert_eq!(official, 17.0);
        assert_eq!(cover, 5.0);
    }

    #[test]
    fn remix_penalty_only_when_reference_is_not_a_remix() {
        assert_eq!(score_of("Song (Remix)", "", "Song", "Nobody"), 7.0);
        assert_eq!(score_of("Song (Remix)", "", "Song Remix", "Nobody"), 10.0);
    }

    #[test]
    fn topic_suffix_is_case_insensitive() {
        assert_eq!(score_of("Something", "Artist - TOPIC", "x", "y"), 3.0);
        assert_eq!(score_of("Something", "Topic Records", "x", "y"), 0.0);
    }

    #[test]
    fn ties_keep_first_seen() {
        let candidates = vec![
            None,
            record("Song", "first"),
            record("Song", "second"),
        ];
        let (best, value) = select_best(&candidates, &reference("Song", "Artist")).unwrap();
        assert_eq!(best.channel.as_deref(), Some("first"));
        assert_eq!(value, 10.0);
    }

    #[test]
    fn picks_strictly_highest_score() {
        let candidates = vec![
            record("Song (cover)", "Some Kid"),
            record("Song (Remix)", "DJ"),
            record("Artist - Song", "Artist - Topic"),
        ];
        let (best, value) = select_best(&candidates, &reference("Song", "Artist")).unwrap();
        assert_eq!(best.title, "Artist - Song");
        assert_eq!(value, 18.0);
    }

    #[test]
    fn empty_or_null_candidates_have_no_match() {
        let reference = reference("Song", "Artist");
        assert!(select_best(&[], &reference).is_none());
        assert!(select_best(&[None, None], &reference).is_none());
        assert!(select_best(&[record("   ", "x")], &reference).is_none());
    }
}
