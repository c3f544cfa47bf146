//! Event classification: one parsed line in, store mutations and queued
//! events out.
//!
//! Numerics go to the registration machine and PING is answered on the
//! spot; everything else resolves an acting user from the prefix and a
//! target from the first parameter, with find-or-create semantics so a
//! named entity is never duplicated.

use crate::event::{Event, MessageKind};
use crate::session::Session;
use crate::state::Entity;
use crate::wire::{self, Message};

/// Flatten params into whitespace-split words (trailing already has its
/// sentinel stripped by the parser).
fn words(params: &[String]) -> Vec<String> {
    params
        .iter()
        .flat_map(|p| p.split_whitespace())
        .map(str::to_owned)
        .collect()
}

impl Session {
    pub(crate) fn classify_line(&mut self, msg: &Message) {
        let verb = msg.verb.to_ascii_uppercase();

        if let Ok(num) = verb.parse::<u16>() {
            self.handle_numeric(num, &msg.params);
            return;
        }

        if verb == "PING" {
            // Mirrored synchronously; never queued as an event.
            let token = msg.params.first().map(String::as_str).unwrap_or("");
            self.send_raw(wire::pong_line(token));
            return;
        }

        let actor = self.resolve_actor(msg);

        match verb.as_str() {
            // Prefix-only verbs: no target to resolve.
            "QUIT" => {
                let Some(actor) = actor else { return };
                let nick = match self.store.user(actor) {
                    Some(u) => u.nickname.clone(),
                    None => return,
                };
                self.push_event(Event::UserQuit {
                    nick,
                    reason: words(&msg.params),
                });
                self.store.destroy_user(actor);
            }
            "NICK" => {
                let Some(actor) = actor else { return };
                let Some(new_nick) = msg.params.first() else { return };
                let Some(user) = self.store.user_mut(actor) else { return };
                let old_nick = std::mem::replace(&mut user.nickname, new_nick.clone());
                tracing::info!(old = %old_nick, new = %new_nick, "user changed nick");
                self.push_event(Event::NickChanged {
                    old_nick,
                    new_nick: new_nick.clone(),
                });
            }
            "ERROR" => {
                self.push_event(Event::Error {
                    args: words(&msg.params),
                });
                // The sender may never have had an entry.
                if let Some(actor) = actor {
                    self.store.destroy_user(actor);
                }
            }

            // Targeted verbs. Until CHANTYPES is advertised no target can
            // be told apart from a user, so resolution is skipped and the
            // line dropped.
            "JOIN" => {
                let Some(Entity::Channel(channel)) = self.resolve_target(msg) else {
                    return;
                };
                let Some(actor) = actor else { return };
                if let Some(ch) = self.store.channel_mut(channel) {
                    ch.add_member(actor);
                }
                let (channel_name, nick) = match (self.store.channel(channel), self.store.user(actor)) {
                    (Some(c), Some(u)) => (c.name.clone(), u.nickname.clone()),
                    _ => return,
                };
                self.push_event(Event::Joined {
                    channel: channel_name,
                    nick,
                });
            }
            "PART" => {
                let Some(Entity::Channel(channel)) = self.resolve_target(msg) else {
                    return;
                };
                let Some(actor) = actor else { return };
                let (channel_name, nick) = match (self.store.channel(channel), self.store.user(actor)) {
                    (Some(c), Some(u)) => (c.name.clone(), u.nickname.clone()),
                    _ => return,
                };
                self.push_event(Event::Parted {
                    channel: channel_name,
                    nick,
                });
                self.store.remove_membership(channel, actor, self.self_user);
            }
            "KICK" => {
                let Some(Entity::Channel(channel)) = self.resolve_target(msg) else {
                    return;
                };
                let Some(victim_name) = msg.params.get(1) else { return };
                let channel_name = match self.store.channel(channel) {
                    Some(c) => c.name.clone(),
                    None => return,
                };
                let victim = self.store.find_user(victim_name);
                self.push_event(Event::Kicked {
                    channel: channel_name,
                    victim: victim.map(|_| victim_name.clone()),
                    reason: words(&msg.params[2..]),
                });
                if let Some(victim) = victim {
                    self.store.remove_membership(channel, victim, self.self_user);
                }
            }
            "MODE" => {
                let Some(target) = self.resolve_target(msg) else { return };
                let args = words(&msg.params[1..]);
                if args.is_empty() {
                    return;
                }
                let target_name = match self.entity_name(target) {
                    Some(n) => n,
                    None => return,
                };
                self.push_event(Event::ModeChanged {
                    target: target_name,
                    args,
                });
            }
            "PRIVMSG" | "NOTICE" => {
                let Some(target) = self.resolve_target(msg) else { return };
                let text = words(&msg.params[1..]);
                if text.is_empty() {
                    return;
                }
                let target_name = match self.entity_name(target) {
                    Some(n) => n,
                    None => return,
                };
                let from = actor.and_then(|a| self.store.user(a)).map(|u| u.nickname.clone());
                let kind = if verb == "PRIVMSG" {
                    MessageKind::Privmsg
                } else {
                    MessageKind::Notice
                };
                self.push_event(Event::Message {
                    kind,
                    from,
                    target: target_name,
                    text,
                });
            }

            _ => {
                tracing::trace!(verb = %verb, "unclassified verb ignored");
            }
        }
    }

    /// Resolve the acting user from a full `nick!ident@host` prefix,
    /// creating the entry on first reference and lazily filling ident/host.
    fn resolve_actor(&mut self, msg: &Message) -> Option<crate::state::UserId> {
        let nick = msg.source_nick()?;
        let id = self.store.find_or_create_user(nick);
        if let Some((ident, host)) = msg.source_ident_host()
            && let Some(user) = self.store.user_mut(id)
            && user.ident.is_empty()
        {
            user.ident = ident.to_owned();
            user.host = host.to_owned();
        }
        Some(id)
    }

    /// Classify the first parameter as channel or user by testing its
    /// leading character against the advertised channel markers. Without
    /// CHANTYPES there is nothing to test against and resolution is
    /// skipped entirely.
    fn resolve_target(&mut self, msg: &Message) -> Option<Entity> {
        let chan_types = self.chan_types()?.to_owned();
        let name = msg.params.first()?;
        let first = name.chars().next()?;
        if chan_types.contains(first) {
            Some(Entity::Channel(self.store.find_or_create_channel(name)))
        } else {
            Some(Entity::User(self.store.find_or_create_user(name)))
        }
    }

    fn entity_name(&self, entity: Entity) -> Option<String> {
        match entity {
            Entity::User(u) => self.store.user(u).map(|u| u.nickname.clone()),
            Entity::Channel(c) => self.store.channel(c).map(|c| c.name.clone()),
        }
    }
}
