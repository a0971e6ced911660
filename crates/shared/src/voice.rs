//! Maps speech-recognition transcripts to UI commands.
//!
//! Matching runs over a short ordered list of French patterns; the first
//! match wins and anything unrecognized is handed back verbatim so the
//! caller can fall back to free-text search.

use std::sync::LazyLock;

use regex::Regex;

static SEARCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:rechercher|recherche|cherche[rz]?|trouve[rz]?)\s+(.+)$")
        .expect("search pattern")
});

static NAVIGATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:aller à|aller a|ouvrir|afficher)\s+(.+)$").expect("navigate pattern")
});

static HELP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:aide|aidez-moi|au secours)$").expect("help pattern"));

static CANCEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:annuler|annule|stop)$").expect("cancel pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceCommand {
    Search { query: String },
    Navigate { target: String },
    Help,
    Cancel,
    Raw { transcript: String },
}

pub fn parse_transcript(transcript: &str) -> VoiceCommand {
    let text = transcript.trim();
    if let Some(captures) = SEARCH_RE.captures(text) {
        return VoiceCommand::Search {
            query: captures[1].trim().to_string(),
        };
    }
    if let Some(captures) = NAVIGATE_RE.captures(text) {
        return VoiceCommand::Navigate {
            target: captures[1].trim().to_string(),
        };
    }
    if HELP_RE.is_match(text) {
        return VoiceCommand::Help;
    }
    if CANCEL_RE.is_match(text) {
        return VoiceCommand::Cancel;
    }
    VoiceCommand::Raw {
        transcript: transcript.to_string(),
    }
}
