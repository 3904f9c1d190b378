use crate::language::LanguageCode;
use tokio::sync::broadcast;
use tracing::trace;

/// Progress of the relay, for captions and operator status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    SourceLanguage {
        code: LanguageCode,
    },
    /// A final utterance in the source language.
    Caption {
        sequence: u64,
        text: String,
    },
    Translated {
        sequence: u64,
        text: String,
    },
    SpeechPlayed {
        sequence: u64,
    },
    SpeechDiscarded {
        sequence: u64,
        latest: u64,
    },
    Presence {
        attendees: usize,
    },
    Error {
        stage: String,
        message: String,
    },
}

/// Send to whoever is listening; nobody listening is fine.
pub(crate) fn publish(events: &broadcast::Sender<RelayEvent>, event: RelayEvent) {
    if events.send(event).is_err() {
        trace!("No relay event subscribers");
    }
}
