//! Per-session state store: known users, channels, and channel membership.
//!
//! Entities live in slot arenas and are referred to by index handles, so a
//! nickname change mutates the `User` in place and every membership handle
//! stays valid. Lookups are linear scans by name — membership sizes at IRC
//! scale don't warrant an index, and an index keyed by a mutable nickname
//! would have to be rebuilt on every rename anyway.

use std::collections::HashMap;

/// Handle to a [`User`] slot. Stale after the user is purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId(usize);

/// Handle to a [`Channel`] slot. Stale after the channel is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(usize);

/// A known participant. ident/host stay empty until a full
/// `nick!ident@host` prefix is seen for them.
#[derive(Debug, Clone)]
pub struct User {
    pub nickname: String,
    pub ident: String,
    pub host: String,
}

impl User {
    fn new(nickname: &str) -> Self {
        Self {
            nickname: nickname.to_owned(),
            ident: String::new(),
            host: String::new(),
        }
    }
}

/// A joined or referenced channel.
///
/// `users` and `usermodes` always hold exactly the same membership set;
/// they are only ever updated together through [`Channel::add_member`] and
/// the store's removal operations.
#[derive(Debug, Clone, Default)]
pub struct Channel {
    pub name: String,
    pub topic: String,
    pub modes: String,
    users: Vec<UserId>,
    usermodes: HashMap<UserId, String>,
}

impl Channel {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    pub fn members(&self) -> &[UserId] {
        &self.users
    }

    pub fn has_member(&self, user: UserId) -> bool {
        self.users.contains(&user)
    }

    /// The mode-flag string for a member (e.g. `"ov"`), empty for a plain
    /// member, `None` for a non-member.
    pub fn member_modes(&self, user: UserId) -> Option<&str> {
        self.usermodes.get(&user).map(String::as_str)
    }

    pub(crate) fn add_member(&mut self, user: UserId) {
        if !self.users.contains(&user) {
            self.users.push(user);
            self.usermodes.insert(user, String::new());
        }
    }

    /// Accumulate one mode flag for an existing member. Duplicate flags
    /// are ignored; unknown users are not added here.
    pub(crate) fn add_member_flag(&mut self, user: UserId, flag: char) {
        if let Some(flags) = self.usermodes.get_mut(&user)
            && !flags.contains(flag)
        {
            flags.push(flag);
        }
    }

    /// Drop a member from both collections in one step. Returns whether
    /// the user was actually a member.
    fn remove_member(&mut self, user: UserId) -> bool {
        let Some(pos) = self.users.iter().position(|&u| u == user) else {
            return false;
        };
        self.users.remove(pos);
        self.usermodes.remove(&user);
        true
    }
}

/// The session's directed association to everything it has learned about.
#[derive(Debug, Default)]
pub struct Store {
    users: Vec<Option<User>>,
    channels: Vec<Option<Channel>>,
}

impl Store {
    pub fn user(&self, id: UserId) -> Option<&User> {
        self.users.get(id.0).and_then(Option::as_ref)
    }

    pub fn user_mut(&mut self, id: UserId) -> Option<&mut User> {
        self.users.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(id.0).and_then(Option::as_ref)
    }

    pub fn channel_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.channels.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn users(&self) -> impl Iterator<Item = (UserId, &User)> {
        self.users
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|u| (UserId(i), u)))
    }

    pub fn channels(&self) -> impl Iterator<Item = (ChannelId, &Channel)> {
        self.channels
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|c| (ChannelId(i), c)))
    }

    pub fn find_user(&self, nickname: &str) -> Option<UserId> {
        self.users().find(|(_, u)| u.nickname == nickname).map(|(id, _)| id)
    }

    pub fn find_channel(&self, name: &str) -> Option<ChannelId> {
        self.channels().find(|(_, c)| c.name == name).map(|(id, _)| id)
    }

    /// Look up an entity by name or nickname; users win on a (pathological)
    /// name clash, mirroring lookup order elsewhere in the engine.
    pub fn find_by_name(&self, name: &str) -> Option<Entity> {
        if let Some(u) = self.find_user(name) {
            return Some(Entity::User(u));
        }
        self.find_channel(name).map(Entity::Channel)
    }

    pub fn find_or_create_user(&mut self, nickname: &str) -> UserId {
        if let Some(id) = self.find_user(nickname) {
            return id;
        }
        tracing::debug!(nick = nickname, "learned new user");
        self.insert_user(User::new(nickname))
    }

    pub fn find_or_create_channel(&mut self, name: &str) -> ChannelId {
        if let Some(id) = self.find_channel(name) {
            return id;
        }
        tracing::debug!(channel = name, "learned new channel");
        self.insert_channel(Channel::new(name))
    }

    fn insert_user(&mut self, user: User) -> UserId {
        match self.users.iter().position(Option::is_none) {
            Some(slot) => {
                self.users[slot] = Some(user);
                UserId(slot)
            }
            None => {
                self.users.push(Some(user));
                UserId(self.users.len() - 1)
            }
        }
    }

    fn insert_channel(&mut self, channel: Channel) -> ChannelId {
        match self.channels.iter().position(Option::is_none) {
            Some(slot) => {
                self.channels[slot] = Some(channel);
                ChannelId(slot)
            }
            None => {
                self.channels.push(Some(channel));
                ChannelId(self.channels.len() - 1)
            }
        }
    }

    /// One logical membership-removal step.
    ///
    /// Removes the user from the channel's `users` and `usermodes`
    /// together, then applies the lifecycle rule: the local identity
    /// leaving destroys the channel; anyone else leaving triggers the
    /// orphan check on the departing user.
    pub fn remove_membership(&mut self, channel: ChannelId, user: UserId, local: Option<UserId>) {
        let removed = match self.channel_mut(channel) {
            Some(ch) => ch.remove_member(user),
            None => false,
        };
        if !removed {
            return;
        }
        if local == Some(user) {
            self.destroy_channel(channel);
        } else {
            self.purge_if_orphaned(user, local);
        }
    }

    /// Drop a user who shares no channel with the session. The local
    /// identity is never treated as an orphan.
    pub fn purge_if_orphaned(&mut self, user: UserId, local: Option<UserId>) {
        if local == Some(user) {
            return;
        }
        if self.channels.iter().flatten().any(|c| c.has_member(user)) {
            return;
        }
        if let Some(slot) = self.users.get_mut(user.0)
            && let Some(u) = slot.take()
        {
            tracing::debug!(nick = %u.nickname, "no shared channels left, purging user");
        }
    }

    /// Remove a user everywhere: all channel memberships, then the user
    /// itself. Used for QUIT/ERROR, where visibility ends outright.
    pub fn destroy_user(&mut self, user: UserId) {
        for ch in self.channels.iter_mut().flatten() {
            ch.remove_member(user);
        }
        if let Some(slot) = self.users.get_mut(user.0)
            && let Some(u) = slot.take()
        {
            tracing::debug!(nick = %u.nickname, "user destroyed");
        }
    }

    pub fn destroy_channel(&mut self, channel: ChannelId) {
        if let Some(slot) = self.channels.get_mut(channel.0)
            && let Some(ch) = slot.take()
        {
            tracing::debug!(channel = %ch.name, "channel destroyed");
        }
    }
}

/// A named entity: either a user or a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User(UserId),
    Channel(ChannelId),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members_eq(store: &Store, ch: ChannelId, nicks: &[&str]) -> bool {
        let channel = store.channel(ch).unwrap();
        let mut got: Vec<&str> = channel
            .members()
            .iter()
            .map(|&u| store.user(u).unwrap().nickname.as_str())
            .collect();
        got.sort_unstable();
        let mut want = nicks.to_vec();
        want.sort_unstable();
        got == want
    }

    #[test]
    fn find_or_create_never_duplicates() {
        let mut store = Store::default();
        let a = store.find_or_create_user("alice");
        let b = store.find_or_create_user("alice");
        assert_eq!(a, b);
        assert_eq!(store.users().count(), 1);
    }

    #[test]
    fn membership_collections_stay_in_sync() {
        let mut store = Store::default();
        let ch = store.find_or_create_channel("#x");
        let alice = store.find_or_create_user("alice");
        store.channel_mut(ch).unwrap().add_member(alice);

        let channel = store.channel(ch).unwrap();
        assert!(channel.has_member(alice));
        assert_eq!(channel.member_modes(alice), Some(""));

        store.remove_membership(ch, alice, None);
        let channel = store.channel(ch).unwrap();
        assert!(!channel.has_member(alice));
        assert_eq!(channel.member_modes(alice), None);
    }

    #[test]
    fn rename_keeps_membership_handles_valid() {
        let mut store = Store::default();
        let ch = store.find_or_create_channel("#x");
        let alice = store.find_or_create_user("alice");
        store.channel_mut(ch).unwrap().add_member(alice);

        store.user_mut(alice).unwrap().nickname = "alicia".to_owned();
        assert!(store.channel(ch).unwrap().has_member(alice));
        assert_eq!(store.find_user("alicia"), Some(alice));
        assert_eq!(store.find_user("alice"), None);
    }

    #[test]
    fn departure_of_orphan_purges_user() {
        let mut store = Store::default();
        let me = store.find_or_create_user("me");
        let ch = store.find_or_create_channel("#x");
        let bob = store.find_or_create_user("bob");
        store.channel_mut(ch).unwrap().add_member(bob);

        store.remove_membership(ch, bob, Some(me));
        assert!(store.user(bob).is_none());
        assert!(store.channel(ch).is_some());
    }

    #[test]
    fn departure_with_shared_channel_keeps_user() {
        let mut store = Store::default();
        let me = store.find_or_create_user("me");
        let ch1 = store.find_or_create_channel("#x");
        let ch2 = store.find_or_create_channel("#y");
        let bob = store.find_or_create_user("bob");
        store.channel_mut(ch1).unwrap().add_member(bob);
        store.channel_mut(ch2).unwrap().add_member(bob);

        store.remove_membership(ch1, bob, Some(me));
        assert!(store.user(bob).is_some());
        assert!(members_eq(&store, ch2, &["bob"]));
    }

    #[test]
    fn own_departure_destroys_channel_not_user() {
        let mut store = Store::default();
        let me = store.find_or_create_user("me");
        let ch = store.find_or_create_channel("#x");
        store.channel_mut(ch).unwrap().add_member(me);

        store.remove_membership(ch, me, Some(me));
        assert!(store.channel(ch).is_none());
        assert!(store.user(me).is_some());
    }

    #[test]
    fn destroy_user_clears_all_memberships() {
        let mut store = Store::default();
        let ch1 = store.find_or_create_channel("#x");
        let ch2 = store.find_or_create_channel("#y");
        let bob = store.find_or_create_user("bob");
        store.channel_mut(ch1).unwrap().add_member(bob);
        store.channel_mut(ch2).unwrap().add_member(bob);

        store.destroy_user(bob);
        assert!(store.user(bob).is_none());
        assert!(members_eq(&store, ch1, &[]));
        assert!(members_eq(&store, ch2, &[]));
    }

    #[test]
    fn slots_are_reused_after_purge() {
        let mut store = Store::default();
        let bob = store.find_or_create_user("bob");
        store.destroy_user(bob);
        let carol = store.find_or_create_user("carol");
        assert_eq!(bob, carol);
        assert_eq!(store.user(carol).unwrap().nickname, "carol");
    }

    #[test]
    fn member_flags_accumulate_without_duplicates() {
        let mut store = Store::default();
        let ch = store.find_or_create_channel("#x");
        let alice = store.find_or_create_user("alice");
        let channel = store.channel_mut(ch).unwrap();
        channel.add_member(alice);
        channel.add_member_flag(alice, 'o');
        channel.add_member_flag(alice, 'v');
        channel.add_member_flag(alice, 'o');
        assert_eq!(store.channel(ch).unwrap().member_modes(alice), Some("ov"));
    }
}
