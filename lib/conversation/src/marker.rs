//! End-of-conversation marker handling.
//!
//! On follow-up turns the model may append [`END_CONVERSATION_MARKER`] to
//! signal that the caller is done. The marker is never spoken.

/// Text the model appends when the caller is done.
pub const END_CONVERSATION_MARKER: &str = "[END_CONVERSATION]";

/// A model reply with the end marker removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    /// What to speak, trimmed.
    pub text: String,
    /// Whether the model asked to end the call.
    pub end_requested: bool,
}

/// Strips every end marker from `raw` and reports whether it asked to end.
///
/// The marker is removed on every turn but only honoured when
/// `follow_up` is set, i.e. from the second caller turn on.
#[must_use]
pub fn parse_reply(raw: &str, follow_up: bool) -> ParsedReply {
    let found = raw.contains(END_CONVERSATION_MARKER);
    let text = if found {
        raw.replace(END_CONVERSATION_MARKER, "").trim().to_string()
    } else {
        raw.trim().to_string()
    };

    ParsedReply {
        text,
        end_requested: found && follow_up,
    }
}
