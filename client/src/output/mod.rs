//! Console output for session events

use crate::bnet::BnetEvent;
use protocol::bnet::ChatEvent;
use protocol::constants::ChatEventId;

pub struct OutputManager {
    print_chat: bool,
}

impl OutputManager {
    pub fn new(print_chat: bool) -> Self {
        Self { print_chat }
    }

    pub fn update(&self, event: &BnetEvent) {
        if !self.print_chat {
            return;
        }

        if let Some(line) = format_event(event) {
            println!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), line);
        }
    }
}

/// Render an event as one console line, `None` for events not worth showing
pub fn format_event(event: &BnetEvent) -> Option<String> {
    match event {
        BnetEvent::LoggedIn => Some("logged in".to_string()),
        BnetEvent::EnteredChat { unique_name } => Some(format!("entered chat as {}", unique_name)),
        BnetEvent::Chat(chat) => format_chat(chat),
        BnetEvent::CommandQueued(text) => Some(format!("[QUEUED] {}", text)),
        BnetEvent::FriendsList(friends) => {
            let names: Vec<&str> = friends.iter().map(|f| f.account.as_str()).collect();
            Some(format!("friends ({}): {}", friends.len(), names.join(", ")))
        }
        BnetEvent::ClanMembers(members) => {
            let online = members.iter().filter(|m| m.online).count();
            Some(format!("clan members: {} ({} online)", members.len(), online))
        }
        BnetEvent::GameList(games) => {
            if games.is_empty() {
                return Some("no games found".to_string());
            }
            let names: Vec<&str> = games.iter().map(|g| g.name.as_str()).collect();
            Some(format!("games ({}): {}", games.len(), names.join(", ")))
        }
        BnetEvent::Disconnected(reason) => Some(format!("disconnected: {:?}", reason)),
    }
}

fn format_chat(chat: &ChatEvent) -> Option<String> {
    let line = match chat.kind()? {
        ChatEventId::Talk => format!("[{}] {}", chat.user, chat.message),
        ChatEventId::Whisper => format!("[WHISPER] [{}] {}", chat.user, chat.message),
        ChatEventId::WhisperSent => format!("[WHISPER TO] [{}] {}", chat.user, chat.message),
        ChatEventId::Emote => format!("[EMOTE] {} {}", chat.user, chat.message),
        ChatEventId::Broadcast => format!("[BROADCAST] {}", chat.message),
        ChatEventId::Channel => format!("joined channel [{}]", chat.message),
        ChatEventId::Info => format!("[INFO] {}", chat.message),
        ChatEventId::Error => format!("[ERROR] {}", chat.message),
        ChatEventId::ChannelFull
        | ChatEventId::ChannelDoesNotExist
        | ChatEventId::ChannelRestricted => format!("cannot join channel [{}]", chat.message),
        ChatEventId::ShowUser | ChatEventId::Join | ChatEventId::Leave | ChatEventId::UserFlags => {
            return None;
        }
    };
    Some(line)
}
