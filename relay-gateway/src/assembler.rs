//! Conversation assembly.
//!
//! The hosted model rejects system-role messages, so the context blob is sent
//! as a priming exchange instead: a user turn carrying the blob verbatim,
//! answered by a fixed acknowledgement. The pair is synthesized on every call
//! and must never reach session storage.

use crate::context::ContextBlob;
use crate::message::Message;

/// Assistant reply that closes the priming exchange.
pub const PRIMING_ACK: &str =
    "Understood. I'll answer questions about my portfolio and resume in first person.";

/// Number of messages the priming exchange adds to every request.
pub const PRIMING_LEN: usize = 2;

/// The user/assistant pair standing in for a system instruction.
pub fn priming_pair(context: &ContextBlob) -> [Message; PRIMING_LEN] {
    [
        Message::user(context.as_str()),
        Message::assistant(PRIMING_ACK),
    ]
}

/// Build the exact message sequence for one completion call:
/// priming pair, then prior turns oldest first, then the new user message.
pub fn assemble(context: &ContextBlob, history: &[Message], new_user_text: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(PRIMING_LEN + history.len() + 1);
    messages.extend(priming_pair(context));
    messages.extend_from_slice(history);
    messages.push(Message::user(new_user_text));
    messages
}
