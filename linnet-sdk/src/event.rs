//! Events the classifier queues for plugin dispatch.
//!
//! Variants carry resolved names rather than store handles so a payload
//! stays meaningful even when classification destroyed the entity in the
//! same step (QUIT, ERROR, a kick that orphaned the victim).

/// Whether a message line was a PRIVMSG or a NOTICE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Privmsg,
    Notice,
}

/// One classified inbound event.
///
/// Word-list payloads (`text`, `args`, `reason`) are the fields after the
/// verb's fixed parameters, whitespace-split, with the trailing `:`
/// sentinel stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A user joined a channel.
    Joined { channel: String, nick: String },

    /// A user left a channel.
    Parted { channel: String, nick: String },

    /// Someone was kicked from a channel. `victim` is `None` when the
    /// kicked name was never a known user.
    Kicked {
        channel: String,
        victim: Option<String>,
        reason: Vec<String>,
    },

    /// A mode change on a channel or user target; `args` verbatim.
    ModeChanged { target: String, args: Vec<String> },

    /// A PRIVMSG or NOTICE. `from` is `None` for server-sourced lines.
    Message {
        kind: MessageKind,
        from: Option<String>,
        target: String,
        text: Vec<String>,
    },

    /// A user changed nick. The store already holds the new nick.
    NickChanged { old_nick: String, new_nick: String },

    /// A user quit the network and has been removed from the store.
    UserQuit { nick: String, reason: Vec<String> },

    /// The server reported a fatal ERROR line.
    Error { args: Vec<String> },
}
