//! Verb handlers: one method per command this server understands, plus the
//! nickname/channel registry operations they share. Grounded line-for-line
//! on the reference server's dispatch table and per-verb processors.

use std::collections::HashSet;

use crate::net::types::ConnectionId;

use super::connection::{self, ConnectionState};
use super::parser;
use super::IrcServer;

/// Builds a `\r\n`-terminated line by concatenating byte slices, mirroring
/// the reference server's `%`-formatted byte literals.
fn line(parts: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for part in parts {
        out.extend_from_slice(part);
    }
    out.extend_from_slice(b"\r\n");
    out
}

impl IrcServer {
    pub(super) fn interpret_message(&mut self, id: ConnectionId, msg: &[u8]) {
        let fields = parser::split_fields(msg);
        if fields.len() < 2 {
            return;
        }

        let verb = fields[0].to_ascii_uppercase();
        match verb.as_slice() {
            b"PING" => {
                let payload = parser::join_fields(&fields[1..]);
                self.process_ping(id, &payload);
            }
            b"NICK" => self.process_nick(id, &fields[1]),
            b"PRIVMSG" if fields.len() >= 3 => {
                let payload = parser::join_fields(&fields[2..]);
                if fields[1].first() == Some(&b'#') {
                    self.process_channel_privmsg(id, &fields[1], &payload);
                } else {
                    self.process_personal_privmsg(id, &fields[1], &payload);
                }
            }
            b"JOIN" if self.is_registered(id) => self.process_join(id, &fields[1]),
            b"PART" => self.process_part(id, &fields[1]),
            _ => {}
        }
    }

    fn is_registered(&self, id: ConnectionId) -> bool {
        self.connections.get(&id).map(ConnectionState::is_registered).unwrap_or(false)
    }

    fn process_ping(&mut self, id: ConnectionId, payload: &[u8]) {
        self.reply(id, line(&[b":server PONG server :", payload]));
    }

    fn process_nick(&mut self, id: ConnectionId, nickname: &[u8]) {
        let Some(old_nickname) = self.connections.get(&id).map(|s| s.nickname.clone()) else { return };

        if !parser::is_valid_name(nickname) {
            self.reply(id, line(&[b":server 432 ", &old_nickname, b" ", nickname, b" :Erroneous nickname"]));
            return;
        }

        if !self.try_new_nickname(id, nickname) {
            self.reply(id, line(&[b":server 433 ", &old_nickname, b" ", nickname, b" :Nickname is already in use"]));
            return;
        }

        if old_nickname == connection::UNREGISTERED_NICK {
            self.reply(id, line(&[b":server 001 ", nickname, b" :Welcome"]));
            self.reply(id, line(&[b":server 422 ", nickname, b" :MOTD File is missing"]));
        } else {
            for colleague in self.find_colleagues(id) {
                self.reply(colleague, line(&[b":", &old_nickname, b" NICK ", nickname]));
            }
        }

        if let Some(state) = self.connections.get_mut(&id) {
            state.nickname = nickname.to_vec();
        }
    }

    fn process_personal_privmsg(&mut self, id: ConnectionId, recipient: &[u8], content: &[u8]) {
        let Some(state) = self.connections.get(&id) else { return };
        if !state.is_registered() || content.len() < 2 || content[0] != b':' {
            return;
        }
        let sender_nick = state.nickname.clone();

        let Some(&recipient_id) = self.nicks.get(&recipient.to_ascii_lowercase()) else { return };
        let Some(recipient_nick) = self.connections.get(&recipient_id).map(|s| s.nickname.clone()) else { return };

        self.reply(recipient_id, line(&[b":", &sender_nick, b" PRIVMSG ", &recipient_nick, b" ", content]));
    }

    fn process_channel_privmsg(&mut self, id: ConnectionId, channel: &[u8], content: &[u8]) {
        let Some(state) = self.connections.get(&id) else { return };
        if !state.is_registered() || content.len() < 2 || content[0] != b':' {
            return;
        }
        let sender_nick = state.nickname.clone();
        let lower_channel = channel.to_ascii_lowercase();

        let Some(members) = self.channels.get(&lower_channel).cloned() else { return };
        for member in members {
            if member != id {
                self.reply(member, line(&[b":", &sender_nick, b" PRIVMSG ", &lower_channel, b" ", content]));
            }
        }
    }

    fn process_join(&mut self, id: ConnectionId, channel: &[u8]) {
        let name_part = channel.get(1..).unwrap_or(&[]);
        if channel.first() != Some(&b'#') || !parser::is_valid_name(name_part) {
            self.reply(id, line(&[b":server 403 ", channel, b" :No such channel"]));
            return;
        }

        let lower_channel = channel.to_ascii_lowercase();
        let members = self.add_member_to_channel(id, &lower_channel);
        if let Some(state) = self.connections.get_mut(&id) {
            state.channels.insert(lower_channel.clone());
        }
        let Some(nick) = self.connections.get(&id).map(|s| s.nickname.clone()) else { return };

        for member in &members {
            if *member != id {
                self.reply(*member, line(&[b":", &nick, b" JOIN :", &lower_channel]));
            }
        }
        self.reply(id, line(&[b":", &nick, b" JOIN :", &lower_channel]));

        self.send_names_reply(id, &nick, &lower_channel, &members);
    }

    /// Mirrors the reference implementation's accumulate-until-close-to-510-bytes
    /// `RPL_NAMREPLY` batching, splitting into multiple lines if the member
    /// list doesn't fit one.
    fn send_names_reply(&mut self, id: ConnectionId, nick: &[u8], channel: &[u8], members: &HashSet<ConnectionId>) {
        let mut names: Vec<Vec<u8>> = members
            .iter()
            .filter_map(|m| self.connections.get(m))
            .map(|c| c.nickname.to_ascii_lowercase())
            .collect();
        names.sort();

        let prefix = |nick: &[u8], channel: &[u8]| -> Vec<u8> {
            let mut buf = Vec::new();
            buf.extend_from_slice(b":server 353 ");
            buf.extend_from_slice(nick);
            buf.extend_from_slice(b" = ");
            buf.extend_from_slice(channel);
            buf.extend_from_slice(b" :");
            buf
        };

        let mut msg_buffer = prefix(nick, channel);
        for name in &names {
            if msg_buffer.len() + name.len() < 510 {
                msg_buffer.extend_from_slice(name);
                msg_buffer.push(b' ');
            } else {
                msg_buffer.pop();
                msg_buffer.extend_from_slice(b"\r\n");
                self.reply(id, std::mem::replace(&mut msg_buffer, prefix(nick, channel)));
                msg_buffer.extend_from_slice(name);
                msg_buffer.push(b' ');
            }
        }
        msg_buffer.pop();
        msg_buffer.extend_from_slice(b"\r\n");
        self.reply(id, msg_buffer);

        self.reply(id, line(&[b":server 366 ", nick, b" ", channel, b" :End of /NAMES list."]));
    }

    fn process_part(&mut self, id: ConnectionId, channel: &[u8]) {
        let lower_channel = channel.to_ascii_lowercase();
        let joined = self.connections.get(&id).map(|s| s.channels.contains(&lower_channel)).unwrap_or(false);
        if !joined {
            return;
        }

        let members = self.remove_channel_member(id, &lower_channel);
        if let Some(state) = self.connections.get_mut(&id) {
            state.channels.remove(&lower_channel);
        }
        let Some(nick) = self.connections.get(&id).map(|s| s.nickname.clone()) else { return };

        for member in members {
            self.reply(member, line(&[b":", &nick, b" PART ", &lower_channel]));
        }
        self.reply(id, line(&[b":", &nick, b" PART ", &lower_channel]));
    }

    pub(super) fn process_exit(&mut self, id: ConnectionId) {
        let Some(state) = self.connections.get(&id) else { return };
        let channels: Vec<Vec<u8>> = state.channels.iter().cloned().collect();
        let nickname = state.nickname.clone();
        let registered = state.is_registered();

        let mut colleagues = HashSet::new();
        for channel in &channels {
            colleagues.extend(self.remove_channel_member(id, channel));
        }
        if registered {
            self.nicks.remove(&nickname.to_ascii_lowercase());
        }

        for colleague in colleagues {
            self.reply(colleague, line(&[b":", &nickname, b" QUIT :Connection closed"]));
        }
    }

    fn try_new_nickname(&mut self, id: ConnectionId, nickname: &[u8]) -> bool {
        let lower = nickname.to_ascii_lowercase();
        if self.nicks.contains_key(&lower) {
            return false;
        }

        if let Some(state) = self.connections.get(&id) {
            if state.is_registered() {
                let old_lower = state.nickname.to_ascii_lowercase();
                self.nicks.remove(&old_lower);
            }
        }
        self.nicks.insert(lower, id);
        true
    }

    fn find_colleagues(&self, id: ConnectionId) -> HashSet<ConnectionId> {
        let mut colleagues = HashSet::new();
        colleagues.insert(id);
        if let Some(state) = self.connections.get(&id) {
            for channel in &state.channels {
                if let Some(members) = self.channels.get(channel) {
                    colleagues.extend(members.iter().copied());
                }
            }
        }
        colleagues
    }

    fn add_member_to_channel(&mut self, id: ConnectionId, channel: &[u8]) -> HashSet<ConnectionId> {
        let set = self.channels.entry(channel.to_vec()).or_default();
        set.insert(id);
        set.clone()
    }

    fn remove_channel_member(&mut self, id: ConnectionId, channel: &[u8]) -> HashSet<ConnectionId> {
        let Some(set) = self.channels.get_mut(channel) else { return HashSet::new() };
        set.remove(&id);
        if set.is_empty() {
            self.channels.remove(channel);
            HashSet::new()
        } else {
            set.clone()
        }
    }
}
