//! Registration and capability negotiation.
//!
//! Numeric replies never reach the event queue; they drive the phase
//! machine and the capability/roster bookkeeping instead.

use rand::Rng;

use crate::session::Session;
use crate::wire;

/// Connection phases. `Negotiating` covers a server that advertises
/// capabilities before welcoming us; most servers go straight from
/// `Registering` to `Ready` on the welcome numeric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Registering,
    Negotiating,
    Ready,
}

const RPL_WELCOME: u16 = 1;
const RPL_ISUPPORT: u16 = 5;
const RPL_NAMREPLY: u16 = 353;
const ERR_NICKNAMEINUSE: u16 = 433;

/// Rank glyphs a roster entry may carry, and the mode flag each one maps
/// to. `: * !` show up as stray decoration on some servers and are
/// stripped without contributing a flag.
const RANK_GLYPHS: [(char, char); 5] = [
    ('~', 'q'),
    ('&', 'a'),
    ('@', 'o'),
    ('%', 'h'),
    ('+', 'v'),
];

impl Session {
    /// `params` excludes the source prefix and the numeric itself; the
    /// client-nick parameter is still at index 0.
    pub(crate) fn handle_numeric(&mut self, num: u16, params: &[String]) {
        match num {
            ERR_NICKNAMEINUSE if self.phase != Phase::Ready => self.retry_nickname(),
            RPL_WELCOME => self.finish_registration(params),
            RPL_ISUPPORT => self.absorb_isupport(params),
            RPL_NAMREPLY => self.absorb_names(params),
            _ => {
                tracing::trace!(num, "numeric ignored");
            }
        }
    }

    /// Nickname collision while registering: pick a candidate never tried
    /// on this connection and resend the nickname-set command. Safe to
    /// repeat indefinitely; the phase does not change.
    fn retry_nickname(&mut self) {
        let candidate = self.next_nick_candidate();
        tracing::info!(taken = %self.nickname, trying = %candidate, "nickname in use");
        self.attempted_nicks.insert(candidate.clone());
        self.send_raw(wire::nick_line(&candidate));
    }

    fn next_nick_candidate(&mut self) -> String {
        if let Some(alt) = self.config.alt_nick.clone()
            && !self.attempted_nicks.contains(&alt)
        {
            return alt;
        }
        let mut rng = rand::thread_rng();
        loop {
            let suffix: String = (0..3)
                .map(|_| char::from_digit(rng.gen_range(0..10), 10).unwrap_or('0'))
                .collect();
            let candidate = format!("{}-{}", self.nickname, suffix);
            if !self.attempted_nicks.contains(&candidate) {
                return candidate;
            }
        }
    }

    /// Welcome numeric: the server's echo of our `nick!ident@host` at the
    /// end of the trailing field is the authoritative nickname, even when
    /// it matches what we already assumed.
    fn finish_registration(&mut self, params: &[String]) {
        let echoed = params
            .iter()
            .rev()
            .flat_map(|p| p.split_whitespace().rev())
            .next()
            .and_then(|tok| tok.split('!').next());
        if let Some(nick) = echoed {
            self.nickname = nick.to_owned();
        }
        let nickname = self.nickname.clone();
        let id = self.store.find_or_create_user(&nickname);
        self.self_user = Some(id);
        self.phase = Phase::Ready;
        tracing::info!(nick = %nickname, "connected and registered");
        if let Some(channel) = self.config.channel.clone() {
            self.send_raw(wire::join_line(&channel));
        }
    }

    /// Capability advertisement (may span several replies). Tokens between
    /// the client nick and the trailing terminator split on `=` into name
    /// and optional value. Accumulates, never resets.
    fn absorb_isupport(&mut self, params: &[String]) {
        if self.phase == Phase::Registering {
            self.phase = Phase::Negotiating;
        }
        if params.len() < 2 {
            return;
        }
        for token in &params[1..params.len() - 1] {
            let (name, value) = match token.split_once('=') {
                Some((n, v)) => (n.to_owned(), Some(v.to_owned())),
                None => (token.clone(), None),
            };
            tracing::debug!(cap = %name, value = ?value, "capability advertised");
            self.support.insert(name, value);
        }
    }

    /// Membership roster for a channel, possibly paginated. Each listed
    /// name is stripped of leading rank glyphs; every recognized glyph
    /// contributes one accumulated mode flag for that member.
    fn absorb_names(&mut self, params: &[String]) {
        if params.len() < 2 {
            return;
        }
        let channel_name = params[params.len() - 2].clone();
        let names = params[params.len() - 1].clone();
        let channel = self.store.find_or_create_channel(&channel_name);

        for name in names.split_whitespace() {
            let mut rest = name;
            let mut flags = String::new();
            loop {
                let Some(c) = rest.chars().next() else { break };
                if let Some(&(_, flag)) = RANK_GLYPHS.iter().find(|&&(g, _)| g == c) {
                    if !flags.contains(flag) {
                        flags.push(flag);
                    }
                } else if !matches!(c, ':' | '*' | '!') {
                    break;
                }
                rest = &rest[c.len_utf8()..];
            }
            if rest.is_empty() {
                continue;
            }
            let user = self.store.find_or_create_user(rest);
            if let Some(ch) = self.store.channel_mut(channel) {
                ch.add_member(user);
                for flag in flags.chars() {
                    ch.add_member_flag(user, flag);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;
    use crate::config::SessionConfig;
    use crate::plugin::PluginRegistry;

    fn session_with(config: SessionConfig) -> Session {
        let mut s = Session::new(config, Arc::new(PluginRegistry::new()));
        s.begin_registration();
        s.take_outbound();
        s
    }

    fn session() -> Session {
        session_with(SessionConfig {
            nickname: "wren".to_owned(),
            host: "irc.example.net".to_owned(),
            port: 6667,
            ..Default::default()
        })
    }

    #[test]
    fn registration_pair_sent_on_begin() {
        let config = SessionConfig {
            nickname: "wren".to_owned(),
            host: "irc.example.net".to_owned(),
            port: 6667,
            ..Default::default()
        };
        let mut s = Session::new(config, Arc::new(PluginRegistry::new()));
        assert_eq!(s.phase(), Phase::Connecting);
        s.begin_registration();
        assert_eq!(s.phase(), Phase::Registering);
        assert_eq!(s.take_outbound(), vec!["NICK wren", "USER wren 0 * :wren"]);
    }

    #[test]
    fn collision_retries_are_distinct() {
        let mut s = session();
        let mut seen = HashSet::new();
        for _ in 0..20 {
            s.feed(b":srv 433 * wren :Nickname is already in use\r\n");
            let out = s.take_outbound();
            assert_eq!(out.len(), 1);
            let nick = out[0].strip_prefix("NICK ").unwrap().to_owned();
            assert!(seen.insert(nick), "retry nickname repeated");
            assert_eq!(s.phase(), Phase::Registering);
        }
    }

    #[test]
    fn collision_prefers_configured_alternate() {
        let mut s = session_with(SessionConfig {
            nickname: "wren".to_owned(),
            alt_nick: Some("wren_spare".to_owned()),
            host: "irc.example.net".to_owned(),
            port: 6667,
            ..Default::default()
        });
        s.feed(b":srv 433 * wren :Nickname is already in use\r\n");
        assert_eq!(s.take_outbound(), vec!["NICK wren_spare"]);
        // The alternate is burned; the next retry falls back to suffixes.
        s.feed(b":srv 433 * wren_spare :Nickname is already in use\r\n");
        let out = s.take_outbound();
        assert!(out[0].starts_with("NICK wren-"));
    }

    #[test]
    fn welcome_nick_is_authoritative() {
        let mut s = session();
        s.feed(b":srv 001 wren2 :Welcome to the test net wren2!u@h\r\n");
        assert_eq!(s.phase(), Phase::Ready);
        assert!(s.is_registered());
        assert_eq!(s.nickname(), "wren2");
        let me = s.self_user().unwrap();
        assert_eq!(s.store().user(me).unwrap().nickname, "wren2");
    }

    #[test]
    fn welcome_joins_configured_channel() {
        let mut s = session_with(SessionConfig {
            nickname: "wren".to_owned(),
            host: "irc.example.net".to_owned(),
            port: 6667,
            channel: Some("#linnet".to_owned()),
            ..Default::default()
        });
        s.feed(b":srv 001 wren :Welcome wren!u@h\r\n");
        assert_eq!(s.take_outbound(), vec!["JOIN #linnet"]);
    }

    #[test]
    fn isupport_accumulates_across_replies() {
        let mut s = session();
        s.feed(b":srv 005 wren CHANTYPES=# EXCEPTS :are supported by this server\r\n");
        assert_eq!(s.phase(), Phase::Negotiating);
        s.feed(b":srv 005 wren PREFIX=(ov)@+ :are supported by this server\r\n");

        assert_eq!(s.chan_types(), Some("#"));
        assert_eq!(s.support().get("EXCEPTS"), Some(&None));
        assert_eq!(
            s.support().get("PREFIX"),
            Some(&Some("(ov)@+".to_owned()))
        );
        // The trailing terminator was not absorbed as a capability.
        assert!(!s.support().contains_key("are"));
    }

    #[test]
    fn names_reply_builds_roster_with_flags() {
        let mut s = session();
        s.feed(b":srv 001 wren :Welcome wren!u@h\r\n");
        s.feed(b":srv 353 wren = #x :@alice +bob carol\r\n");

        let ch = s.store().find_channel("#x").unwrap();
        let channel = s.store().channel(ch).unwrap();
        assert_eq!(channel.members().len(), 3);

        let alice = s.store().find_user("alice").unwrap();
        let bob = s.store().find_user("bob").unwrap();
        let carol = s.store().find_user("carol").unwrap();
        assert_eq!(channel.member_modes(alice), Some("o"));
        assert_eq!(channel.member_modes(bob), Some("v"));
        assert_eq!(channel.member_modes(carol), Some(""));
    }

    #[test]
    fn names_reply_pagination_accumulates() {
        let mut s = session();
        s.feed(b":srv 353 wren = #x :@alice\r\n");
        s.feed(b":srv 353 wren = #x :+bob ~&@alice\r\n");

        let ch = s.store().find_channel("#x").unwrap();
        let channel = s.store().channel(ch).unwrap();
        assert_eq!(channel.members().len(), 2);
        let alice = s.store().find_user("alice").unwrap();
        // Flags from both pages accumulated, no duplicates.
        assert_eq!(channel.member_modes(alice), Some("oqa"));
    }

    #[test]
    fn unknown_numerics_are_ignored() {
        let mut s = session();
        s.feed(b":srv 372 wren :- motd line\r\n");
        s.feed(b":srv 422 wren :MOTD missing\r\n");
        assert!(s.take_outbound().is_empty());
        assert_eq!(s.phase(), Phase::Registering);
    }
}
