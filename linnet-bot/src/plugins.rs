//! Built-in plugins: a channel greeter and a control-command handler.

use anyhow::Result;
use linnet_sdk::{Event, Plugin, Session};

/// Where a reply to a message should go: back to the channel, or back to
/// the sender when the message was private.
fn reply_target<'a>(session: &Session, from: Option<&'a str>, target: &'a str) -> Option<&'a str> {
    if target == session.nickname() { from } else { Some(target) }
}

/// Greets joiners and answers a couple of toy commands.
pub struct Greeter;

impl Plugin for Greeter {
    fn handle(&mut self, session: &mut Session, event: &Event, _raw: &[String]) -> Result<()> {
        match event {
            Event::Joined { channel, nick } if nick != session.nickname() => {
                let line = format!("Welcome to {channel}, {nick}!");
                session.say(channel, &line);
            }
            Event::Kicked {
                channel,
                victim: Some(victim),
                reason,
            } => {
                session.say(channel, &format!("Why did you kick {victim}?!"));
                session.say(
                    channel,
                    &format!("'{}' is not a good reason! :(", reason.join(" ")),
                );
            }
            Event::Message {
                from, target, text, ..
            } => {
                let Some(reply_to) = reply_target(session, from.as_deref(), target) else {
                    return Ok(());
                };
                match text.first().map(String::as_str) {
                    Some("!sup") => {
                        if let Some(from) = from {
                            let line = format!("Sup {from}!");
                            session.say(reply_to, &line);
                        }
                    }
                    Some("!users") => {
                        let members: Vec<String> = session
                            .store()
                            .find_channel(target)
                            .and_then(|id| session.store().channel(id))
                            .map(|channel| {
                                channel
                                    .members()
                                    .iter()
                                    .filter_map(|&u| session.store().user(u))
                                    .map(|u| u.nickname.clone())
                                    .collect()
                            })
                            .unwrap_or_default();
                        for nick in members {
                            session.say(reply_to, &nick);
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Session control commands: identity, plugin management, raw access,
/// and a clean shutdown.
pub struct Ctl;

impl Plugin for Ctl {
    fn handle(&mut self, session: &mut Session, event: &Event, _raw: &[String]) -> Result<()> {
        let Event::Message {
            from, target, text, ..
        } = event
        else {
            return Ok(());
        };
        let Some(reply_to) = reply_target(session, from.as_deref(), target) else {
            return Ok(());
        };
        let reply_to = reply_to.to_owned();

        match text.first().map(String::as_str) {
            Some("!whoareyou") => {
                let nick = session.nickname().to_owned();
                session.say(&reply_to, &nick);
            }
            Some("!modules") => {
                for id in session.loaded_plugins() {
                    session.say(&reply_to, &id);
                }
            }
            Some("!reload") => {
                session.say(&reply_to, "Reloading all modules...");
                for id in session.loaded_plugins() {
                    session.reload_plugin(&id)?;
                }
                session.say(&reply_to, "Done!");
            }
            Some("!listusers") => {
                let mut lines = Vec::new();
                for (_, user) in session.store().users() {
                    lines.push(user.nickname.clone());
                }
                for (_, channel) in session.store().channels() {
                    lines.push(channel.name.clone());
                    for &member in channel.members() {
                        if let Some(user) = session.store().user(member) {
                            lines.push(format!("> {}", user.nickname));
                        }
                    }
                }
                for line in lines {
                    session.say(&reply_to, &line);
                }
            }
            Some("!raw") if text.len() > 1 => {
                session.send_raw(text[1..].join(" "));
            }
            Some("!bye") => {
                session.quit(Some("Byebye!"));
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use linnet_sdk::{PluginRegistry, SessionConfig};

    use super::*;

    fn bot_session() -> Session {
        let mut registry = PluginRegistry::new();
        registry.register("ctl", |_s| Box::new(Ctl));
        registry.register("greeter", |_s| Box::new(Greeter));

        let dir = std::env::temp_dir().join("linnet-bot-test");
        let config = SessionConfig {
            nickname: "bot".to_owned(),
            host: "irc.example.net".to_owned(),
            port: 6667,
            data_root: Some(dir),
            ..Default::default()
        };
        let mut s = Session::new(config, Arc::new(registry));
        s.load_startup_plugins();
        s.begin_registration();
        s.feed(b":srv 001 bot :Welcome bot!b@h\r\n:srv 005 bot CHANTYPES=# :ok\r\n");
        s.take_outbound();
        s
    }

    #[test]
    fn greeter_welcomes_others_but_not_itself() {
        let mut s = bot_session();
        s.feed(b":alice!a@h JOIN #room\r\n:bot!b@h JOIN #room\r\n");
        assert_eq!(s.take_outbound(), vec!["PRIVMSG #room :Welcome to #room, alice!"]);
    }

    #[test]
    fn whoareyou_replies_with_nickname() {
        let mut s = bot_session();
        s.feed(b":alice!a@h PRIVMSG #room :!whoareyou\r\n");
        assert_eq!(s.take_outbound(), vec!["PRIVMSG #room :bot"]);
    }

    #[test]
    fn private_command_replies_to_sender() {
        let mut s = bot_session();
        s.feed(b":alice!a@h PRIVMSG bot :!whoareyou\r\n");
        assert_eq!(s.take_outbound(), vec!["PRIVMSG alice :bot"]);
    }

    #[test]
    fn modules_lists_loaded_plugins_in_order() {
        let mut s = bot_session();
        s.feed(b":alice!a@h PRIVMSG #room :!modules\r\n");
        assert_eq!(
            s.take_outbound(),
            vec!["PRIVMSG #room :ctl", "PRIVMSG #room :greeter"]
        );
    }

    #[test]
    fn reload_keeps_both_plugins_loaded() {
        let mut s = bot_session();
        s.feed(b":alice!a@h PRIVMSG #room :!reload\r\n");
        assert_eq!(s.loaded_plugins(), vec!["ctl", "greeter"]);
        let out = s.take_outbound();
        assert!(out.contains(&"PRIVMSG #room :Reloading all modules...".to_owned()));
        assert!(out.contains(&"PRIVMSG #room :Done!".to_owned()));
    }

    #[test]
    fn bye_quits_the_session() {
        let mut s = bot_session();
        s.feed(b":alice!a@h PRIVMSG #room :!bye\r\n");
        assert!(!s.is_active());
        assert!(s.take_outbound().contains(&"QUIT :Byebye!".to_owned()));
    }

    #[test]
    fn raw_forwards_the_rest_of_the_line() {
        let mut s = bot_session();
        s.feed(b":alice!a@h PRIVMSG #room :!raw TOPIC #room :hi there\r\n");
        assert_eq!(s.take_outbound(), vec!["TOPIC #room :hi there"]);
    }
}
