//! Interactive session: stdin commands in, conversation updates out.
//!
//! ```text
//! <text>          send a message
//! /draft <text>   set the draft without sending (drives typing-start/stop)
//! /nudge          nudge the peer
//! /clear          clear this conversation's history
//! /help           list commands
//! /quit           leave
//! ```

use std::net::IpAddr;
use std::sync::Arc;

use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use buddy_core::{
    BuddyError, ChatListener, ChatMessage, Conversation, ConversationHandle, ConversationUpdate,
    HistoryStore, LogMutation, PeerEndpoint, PeerOutbound,
};

use crate::config::ChatConfig;

const BELL: char = '\u{7}';

// ── Commands ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Draft(String),
    Nudge,
    Clear,
    Help,
    Quit,
}

impl Command {
    /// Anything that is not a known slash command is a message.
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let (word, rest) = trimmed
            .split_once(char::is_whitespace)
            .unwrap_or((trimmed, ""));
        match word {
            "/nudge" => Self::Nudge,
            "/clear" => Self::Clear,
            "/help" => Self::Help,
            "/quit" | "/exit" => Self::Quit,
            "/draft" => Self::Draft(rest.trim_start().to_string()),
            _ => Self::Send(line.to_string()),
        }
    }
}

// ── Rendering ────────────────────────────────────────────────────

/// Terminal lines for one conversation update.
pub fn render(update: &ConversationUpdate, peer_name: &str) -> Vec<String> {
    match update {
        ConversationUpdate::Loaded(entries) => {
            let mut lines: Vec<String> = entries.iter().map(|m| format_entry(m, peer_name)).collect();
            if !lines.is_empty() {
                lines.push(format!("-- {} earlier messages --", entries.len()));
            }
            lines
        }
        ConversationUpdate::NudgeReceived => vec![format!("{BELL}*** {peer_name} nudged you ***")],
        ConversationUpdate::Log(mutation) => match mutation {
            LogMutation::Appended(m) if m.typing => vec![format!("{peer_name} is typing...")],
            LogMutation::Appended(m) => vec![format_entry(m, peer_name)],
            LogMutation::Updated(m) if m.is_own() => {
                vec![format!("   {} delivered", m.id)]
            }
            LogMutation::Updated(m) => vec![format!("{} (updated)", format_entry(m, peer_name))],
            LogMutation::Removed(_) => Vec::new(),
            LogMutation::Cleared => vec!["-- history cleared --".to_string()],
        },
    }
}

fn format_entry(message: &ChatMessage, peer_name: &str) -> String {
    let time = message.timestamp.with_timezone(&Local).format("%H:%M:%S");
    let who = if message.is_own() { "me" } else { peer_name };
    let pending = if message.is_own() && !message.delivered {
        " (not delivered)"
    } else {
        ""
    };
    // Continuation lines line up under the first one.
    let text = message.text.replace('\n', "\n    ");
    format!("[{time}] {} {who}: {text}{pending}", message.id)
}

// ── Peer resolution ──────────────────────────────────────────────

/// Find the peer named by `query`. A bare IP address that no directory
/// entry matches becomes an ad-hoc peer keyed by that address.
pub fn resolve_peer(peers: &[PeerEndpoint], query: &str) -> Option<PeerEndpoint> {
    let query = query.trim();
    if let Some(peer) = peers.iter().find(|p| p.matches(query)) {
        return Some(peer.clone());
    }
    query
        .parse::<IpAddr>()
        .ok()
        .map(|ip| PeerEndpoint::new(ip.to_string(), ip.to_string(), ip.to_string(), false))
}

// ── ChatSession ──────────────────────────────────────────────────

pub struct ChatSession {
    config: ChatConfig,
    peer: PeerEndpoint,
}

impl ChatSession {
    pub fn new(config: ChatConfig, peer: PeerEndpoint) -> Self {
        Self { config, peer }
    }

    /// Run until `/quit`, end of input, or Ctrl-C.
    pub async fn run(self) -> Result<(), BuddyError> {
        let port = self.config.network.port;
        let outbound = Arc::new(PeerOutbound::new(self.peer.address.clone(), port));
        let (handle, mut updates, task) = Conversation::spawn(
            self.peer.clone(),
            outbound,
            HistoryStore::new(self.config.history_dir()),
            self.config.to_conversation_settings(),
        );

        let mut listener = ChatListener::with_bind_ip(self.config.bind_ip());
        let local = listener.start(port, handle.line_handler()).await?;
        info!("chatting with {} ({}) from {local}", self.peer.name, self.peer.address);
        println!("Chatting with {}. Type /help for commands.", self.peer.name);

        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                line = stdin.next_line() => match line {
                    Ok(Some(line)) => {
                        if !self.dispatch(&handle, Command::parse(&line))? {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("stdin read failed: {e}");
                        break;
                    }
                },
                update = updates.recv() => match update {
                    Some(update) => {
                        for line in render(&update, &self.peer.name) {
                            println!("{line}");
                        }
                    }
                    None => break,
                },
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received, leaving");
                    break;
                }
            }
        }

        let _ = handle.shutdown();
        listener.stop().await;
        if let Err(e) = task.await {
            warn!("conversation task ended abnormally: {e}");
        }
        Ok(())
    }

    /// Apply one command. `false` ends the session.
    fn dispatch(&self, handle: &ConversationHandle, command: Command) -> Result<bool, BuddyError> {
        match command {
            // Straight to the wire: a whole line is not a composing session.
            Command::Send(text) => handle.send_text(text)?,
            Command::Draft(text) => handle.set_draft(text)?,
            Command::Nudge => {
                handle.nudge()?;
                println!("you nudged {}", self.peer.name);
            }
            Command::Clear => handle.clear()?,
            Command::Help => println!("commands: /draft <text>, /nudge, /clear, /help, /quit"),
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use buddy_core::{Direction, MessageId, Outbound, Payload};
    use chrono::Utc;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Payload>>);

    #[async_trait]
    impl Outbound for Recorder {
        async fn deliver(&self, payload: Payload) -> bool {
            self.0.lock().unwrap().push(payload);
            true
        }
    }

    fn message(id: u64, text: &str, direction: Direction, delivered: bool) -> ChatMessage {
        ChatMessage {
            id: MessageId(id),
            text: text.into(),
            direction,
            timestamp: Utc::now(),
            delivered,
            typing: false,
        }
    }

    #[test]
    fn parse_commands() {
        assert_eq!(Command::parse("/nudge"), Command::Nudge);
        assert_eq!(Command::parse("  /quit  "), Command::Quit);
        assert_eq!(Command::parse("/draft  hello there"), Command::Draft("hello there".into()));
        assert_eq!(Command::parse("/draft"), Command::Draft(String::new()));
        assert_eq!(Command::parse("hi /nudge"), Command::Send("hi /nudge".into()));
        assert_eq!(Command::parse("/shrug"), Command::Send("/shrug".into()));
    }

    #[test]
    fn render_incoming_and_typing() {
        let m = message(1, "Hello\nWorld", Direction::Incoming, true);
        let lines = render(&ConversationUpdate::Log(LogMutation::Appended(m)), "bob");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("#1 bob: Hello\n    World"));

        let mut typing = message(2, "Typing...", Direction::Incoming, false);
        typing.typing = true;
        let lines = render(&ConversationUpdate::Log(LogMutation::Appended(typing.clone())), "bob");
        assert_eq!(lines, vec!["bob is typing...".to_string()]);
        assert!(render(&ConversationUpdate::Log(LogMutation::Removed(typing)), "bob").is_empty());
    }

    #[test]
    fn render_own_delivery_and_nudge() {
        let pending = message(3, "hi", Direction::Own, false);
        let lines = render(&ConversationUpdate::Log(LogMutation::Appended(pending)), "bob");
        assert!(lines[0].ends_with("me: hi (not delivered)"));

        let delivered = message(3, "hi", Direction::Own, true);
        let lines = render(&ConversationUpdate::Log(LogMutation::Updated(delivered)), "bob");
        assert_eq!(lines, vec!["   #3 delivered".to_string()]);

        let lines = render(&ConversationUpdate::NudgeReceived, "bob");
        assert!(lines[0].starts_with(BELL));
    }

    #[test]
    fn render_loaded_history() {
        assert!(render(&ConversationUpdate::Loaded(Vec::new()), "bob").is_empty());
        let entries = vec![
            message(1, "old", Direction::Incoming, true),
            message(2, "reply", Direction::Own, true),
        ];
        let lines = render(&ConversationUpdate::Loaded(entries), "bob");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], "-- 2 earlier messages --");
    }

    #[tokio::test]
    async fn typed_line_is_sent_without_typing_signals() {
        let dir = TempDir::new().unwrap();
        let peer = PeerEndpoint::new("nodekey:aaa", "laptop", "100.64.0.2", true);
        let session = ChatSession::new(ChatConfig::default(), peer.clone());
        let outbound = Arc::new(Recorder::default());
        let (handle, _updates, _task) = Conversation::spawn(
            peer,
            outbound.clone(),
            HistoryStore::new(dir.path()),
            session.config.to_conversation_settings(),
        );

        assert!(session.dispatch(&handle, Command::parse("hi")).unwrap());
        tokio::time::timeout(Duration::from_secs(5), async {
            while outbound.0.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("line not sent");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*outbound.0.lock().unwrap(), vec![Payload::text("hi")]);
        assert!(!session.dispatch(&handle, Command::Quit).unwrap());
    }

    #[test]
    fn resolve_by_directory_or_address() {
        let peers = vec![PeerEndpoint::new("nodekey:aaa", "laptop", "100.64.0.2", true)];
        assert_eq!(resolve_peer(&peers, "Laptop").unwrap().id, "nodekey:aaa");
        assert_eq!(resolve_peer(&peers, "100.64.0.2").unwrap().name, "laptop");

        let adhoc = resolve_peer(&peers, "192.168.1.9").unwrap();
        assert_eq!(adhoc.address, "192.168.1.9");
        assert!(!adhoc.online);

        assert!(resolve_peer(&peers, "desktop").is_none());
    }
}
