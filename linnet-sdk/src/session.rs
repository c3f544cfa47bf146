//! The per-connection session: owned state, event queue, outbound queue.
//!
//! A session is mutated from exactly one task; inbound chunks flow through
//! [`Session::feed`] which tokenizes, classifies (mutating the store),
//! queues events, and flushes the queue to plugins one line at a time.
//! Outbound lines accumulate in a queue the transport driver drains.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::config::SessionConfig;
use crate::event::Event;
use crate::plugin::{LoadedPlugin, PluginOp, PluginRegistry};
use crate::registration::Phase;
use crate::state::{Store, UserId};
use crate::wire;

pub struct Session {
    pub(crate) config: SessionConfig,
    pub(crate) nickname: String,
    pub(crate) phase: Phase,
    pub(crate) support: HashMap<String, Option<String>>,
    pub(crate) store: Store,
    pub(crate) self_user: Option<UserId>,
    pub(crate) attempted_nicks: HashSet<String>,

    events: Vec<Event>,
    outbound: VecDeque<String>,
    line_buf: wire::LineBuffer,
    active: bool,

    pub(crate) registry: Arc<PluginRegistry>,
    pub(crate) plugins: Vec<LoadedPlugin>,
    pub(crate) loaded_order: Vec<String>,
    pub(crate) dispatching: bool,
    pub(crate) deferred_plugin_ops: Vec<PluginOp>,
}

impl Session {
    /// Build a fresh session. Nickname placeholders are expanded here, at
    /// registration time; nothing touches the network yet.
    pub fn new(config: SessionConfig, registry: Arc<PluginRegistry>) -> Self {
        let nickname = config.effective_nickname();
        tracing::debug!(nick = %nickname, host = %config.host, "session created");
        Self {
            config,
            nickname,
            phase: Phase::Connecting,
            support: HashMap::new(),
            store: Store::default(),
            self_user: None,
            attempted_nicks: HashSet::new(),
            events: Vec::new(),
            outbound: VecDeque::new(),
            line_buf: wire::LineBuffer::new(),
            active: true,
            registry,
            plugins: Vec::new(),
            loaded_order: Vec::new(),
            dispatching: false,
            deferred_plugin_ops: Vec::new(),
        }
    }

    // ── State access ──

    /// The session's nickname. Authoritative only once registered.
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_registered(&self) -> bool {
        self.phase == Phase::Ready
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The capability table built from server advertisements. Values are
    /// `None` for flag-only capabilities.
    pub fn support(&self) -> &HashMap<String, Option<String>> {
        &self.support
    }

    /// The advertised channel-marker characters, once known.
    pub fn chan_types(&self) -> Option<&str> {
        self.support.get("CHANTYPES")?.as_deref()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The store handle for the local identity, once registered.
    pub fn self_user(&self) -> Option<UserId> {
        self.self_user
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ── Inbound ──

    /// Feed one raw inbound chunk through tokenize → classify → dispatch.
    ///
    /// Each completed line is classified and its event batch flushed to
    /// plugins before the next line is parsed: plugins observe strict
    /// per-line batches. Malformed lines are dropped, never fatal.
    pub fn feed(&mut self, chunk: &[u8]) {
        for line in self.line_buf.push(chunk) {
            if !self.active {
                break;
            }
            let Ok(msg) = wire::Message::parse(&line) else {
                continue;
            };
            tracing::trace!(line = %line, ">>");
            let raw: Vec<String> = line.split_whitespace().map(str::to_owned).collect();
            self.classify_line(&msg);
            self.dispatch_pending(&raw);
        }
    }

    pub(crate) fn push_event(&mut self, event: Event) {
        tracing::debug!(?event, "event queued");
        self.events.push(event);
    }

    pub(crate) fn take_pending_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    // ── Outbound ──

    /// Queue one wire line (without CRLF) for the transport driver.
    pub fn send_raw(&mut self, line: impl Into<String>) {
        if !self.active {
            return;
        }
        self.outbound.push_back(line.into());
    }

    /// Drain everything queued for the wire.
    pub fn take_outbound(&mut self) -> Vec<String> {
        self.outbound.drain(..).collect()
    }

    pub fn say(&mut self, target: &str, text: &str) {
        self.send_raw(wire::privmsg_line(target, text));
    }

    pub fn join(&mut self, channel: &str) {
        self.send_raw(wire::join_line(channel));
    }

    pub fn part(&mut self, channel: &str) {
        self.send_raw(wire::part_line(channel));
    }

    pub fn set_nick(&mut self, nick: &str) {
        self.send_raw(wire::nick_line(nick));
    }

    /// Announce departure and mark the session for teardown. The driver
    /// drains the QUIT line before closing the transport.
    pub fn quit(&mut self, reason: Option<&str>) {
        self.send_raw(wire::quit_line(reason));
        self.active = false;
    }

    // ── Lifecycle ──

    /// Send the registration pair. The one unconditional transition:
    /// Connecting → Registering.
    pub fn begin_registration(&mut self) {
        self.phase = Phase::Registering;
        self.attempted_nicks.insert(self.nickname.clone());
        let nick = self.nickname.clone();
        let realname = self.config.realname.clone().unwrap_or_else(|| nick.clone());
        self.send_raw(wire::nick_line(&nick));
        self.send_raw(wire::user_line(&nick, &realname));
        tracing::info!(nick = %nick, "registration started");
    }

    /// Tear the session down: mark inactive and unload every plugin.
    /// Classification never runs again after this.
    pub fn shutdown(&mut self) {
        if !self.active && self.plugins.is_empty() {
            return;
        }
        self.active = false;
        self.unload_all_plugins();
        tracing::info!(nick = %self.nickname, "session closed");
    }
}
