//! Interactive confirmation prompts over the asynchronous reply stream.
//!
//! Each prompt is a strict two-step protocol: emit the prompt message,
//! then suspend until a matching reply arrives from the same author in
//! the same conversation, or the timeout elapses. Timeouts are normal
//! outcomes, not errors. The wait is registered before the prompt is
//! sent, so a reply can never race past it. Shutdown releases every
//! pending wait as "no reply".

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use burrowbot_common::models::chat::{ChannelId, ChatMessage, ChatTarget, UserId};
use burrowbot_common::traits::platform_traits::ChatTransport;

use crate::Error;

/// Default wait for yes/no confirmations.
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);
/// Default wait for numbered-choice prompts.
pub const DEFAULT_CHOICE_TIMEOUT: Duration = Duration::from_secs(30);

type WaitKey = (ChannelId, UserId);

/// What counts as a reply for a pending wait. Non-matching messages are
/// left to the rest of the pipeline and the wait keeps waiting.
enum WaitMatcher {
    /// Any reply resolves the wait.
    Any,
    /// A single whitespace-free token (extension names).
    Word,
    /// A reply whose leading character is a valid 1-based index.
    Choice { len: usize },
}

impl WaitMatcher {
    fn matches(&self, content: &str) -> bool {
        match self {
            WaitMatcher::Any => true,
            WaitMatcher::Word => {
                let trimmed = content.trim();
                !trimmed.is_empty() && !trimmed.contains(char::is_whitespace)
            }
            WaitMatcher::Choice { len } => parse_choice(content, *len).is_some(),
        }
    }
}

struct PendingWait {
    id: u64,
    matcher: WaitMatcher,
    tx: mpsc::UnboundedSender<ChatMessage>,
}

/// Manages all outstanding interactive waits. One wait per
/// (channel, author) pair; callers sequence their own prompts.
pub struct InteractionController {
    transport: Arc<dyn ChatTransport>,
    pending: DashMap<WaitKey, PendingWait>,
    next_wait_id: AtomicU64,
    shutdown_rx: watch::Receiver<bool>,
}

impl InteractionController {
    pub fn new(transport: Arc<dyn ChatTransport>, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            transport,
            pending: DashMap::new(),
            next_wait_id: AtomicU64::new(1),
            shutdown_rx,
        }
    }

    /// Offers an inbound message to the pending wait for its
    /// (channel, author) pair. Returns true if the message was claimed
    /// as a reply; claimed messages are not commands.
    pub fn deliver(&self, msg: &ChatMessage) -> bool {
        let key = (msg.channel, msg.author.user_id);
        let stale = {
            let Some(entry) = self.pending.get(&key) else {
                return false;
            };
            if !entry.matcher.matches(&msg.content) {
                return false;
            }
            entry.tx.send(msg.clone()).is_err()
        };
        if stale {
            // The waiting side is gone; drop the registration.
            self.pending.remove(&key);
            return false;
        }
        true
    }

    /// Whether a wait is currently outstanding for this pair.
    pub fn has_pending(&self, channel: ChannelId, author: UserId) -> bool {
        self.pending.contains_key(&(channel, author))
    }

    /// Asks a yes/no question. `Some(true)` for an affirmative reply,
    /// `Some(false)` for anything else, `None` when no reply arrived in
    /// time (distinct from an explicit "no").
    pub async fn ask_yes_no(
        &self,
        channel: ChannelId,
        author: UserId,
        prompt: &str,
        timeout: Duration,
    ) -> Result<Option<bool>, Error> {
        let (guard, mut rx) = self.register(channel, author, WaitMatcher::Any);
        self.transport
            .send_message(ChatTarget::Channel(channel), prompt)
            .await?;
        let reply = self.await_reply(&mut rx, timeout).await;
        drop(guard);
        Ok(reply.map(|msg| is_affirmative(&msg.content)))
    }

    /// Presents `choices` as a 1-based numbered list and waits for a
    /// reply selecting one of them. Malformed or out-of-range replies do
    /// not consume the wait. Returns the zero-based index of the choice.
    pub async fn ask_choice(
        &self,
        channel: ChannelId,
        author: UserId,
        prompt: &str,
        choices: &[String],
        timeout: Duration,
    ) -> Result<Option<usize>, Error> {
        if choices.is_empty() {
            return Ok(None);
        }
        let (guard, mut rx) = self.register(
            channel,
            author,
            WaitMatcher::Choice {
                len: choices.len(),
            },
        );

        let mut rendered = String::from(prompt);
        rendered.push_str("\n\n");
        for (i, choice) in choices.iter().enumerate() {
            rendered.push_str(&format!("**{}**: {}\n", i + 1, choice));
        }
        self.transport
            .send_message(ChatTarget::Channel(channel), rendered.trim_end())
            .await?;

        let reply = self.await_reply(&mut rx, timeout).await;
        drop(guard);
        Ok(reply.and_then(|msg| parse_choice(&msg.content, choices.len())))
    }

    /// Waits for a single whitespace-free token, e.g. an extension name.
    pub async fn ask_name(
        &self,
        channel: ChannelId,
        author: UserId,
        prompt: &str,
        timeout: Duration,
    ) -> Result<Option<String>, Error> {
        let (guard, mut rx) = self.register(channel, author, WaitMatcher::Word);
        self.transport
            .send_message(ChatTarget::Channel(channel), prompt)
            .await?;
        let reply = self.await_reply(&mut rx, timeout).await;
        drop(guard);
        Ok(reply.map(|msg| msg.content.trim().to_string()))
    }

    fn register(
        &self,
        channel: ChannelId,
        author: UserId,
        matcher: WaitMatcher,
    ) -> (WaitGuard<'_>, mpsc::UnboundedReceiver<ChatMessage>) {
        let key = (channel, author);
        let id = self.next_wait_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        if self
            .pending
            .insert(key, PendingWait { id, matcher, tx })
            .is_some()
        {
            warn!(
                "replaced an outstanding wait for channel={} user={}",
                channel, author
            );
        }
        (WaitGuard {
            controller: self,
            key,
            id,
        }, rx)
    }

    async fn await_reply(
        &self,
        rx: &mut mpsc::UnboundedReceiver<ChatMessage>,
        timeout: Duration,
    ) -> Option<ChatMessage> {
        let mut shutdown_rx = self.shutdown_rx.clone();
        if *shutdown_rx.borrow() {
            return None;
        }
        tokio::select! {
            msg = rx.recv() => msg,
            _ = tokio::time::sleep(timeout) => {
                debug!("interactive wait timed out after {:?}", timeout);
                None
            }
            _ = shutdown_rx.changed() => None,
        }
    }
}

/// Removes the wait registration when the asking side is done with it,
/// whether it resolved, timed out, or was cancelled.
struct WaitGuard<'a> {
    controller: &'a InteractionController,
    key: WaitKey,
    id: u64,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.controller
            .pending
            .remove_if(&self.key, |_, wait| wait.id == self.id);
    }
}

fn is_affirmative(content: &str) -> bool {
    matches!(content.trim().to_lowercase().as_str(), "yes" | "y")
}

fn parse_choice(content: &str, len: usize) -> Option<usize> {
    let first = content.trim().chars().next()?;
    let index = first.to_digit(10)? as usize;
    if (1..=len).contains(&index) {
        Some(index - 1)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use burrowbot_common::models::chat::MessageAuthor;
    use tokio::sync::Mutex;
    use tokio::time::sleep;

    struct RecordingTransport {
        sent: Mutex<Vec<(ChatTarget, String)>>,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self {
                sent: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        async fn send_message(&self, target: ChatTarget, text: &str) -> Result<(), Error> {
            self.sent.lock().await.push((target, text.to_string()));
            Ok(())
        }

        async fn send_direct(&self, user: UserId, text: &str) -> Result<(), Error> {
            self.sent
                .lock()
                .await
                .push((ChatTarget::User(user), text.to_string()));
            Ok(())
        }
    }

    const CHANNEL: ChannelId = ChannelId(10);
    const AUTHOR: UserId = UserId(20);

    fn reply(content: &str) -> ChatMessage {
        ChatMessage::new(
            CHANNEL,
            None,
            MessageAuthor {
                user_id: AUTHOR,
                is_bot: false,
            },
            content,
        )
    }

    fn controller() -> (Arc<InteractionController>, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let transport = Arc::new(RecordingTransport::new());
        (
            Arc::new(InteractionController::new(transport, shutdown_rx)),
            shutdown_tx,
        )
    }

    #[tokio::test]
    async fn test_yes_no_affirmative_and_negative() {
        let (controller, _tx) = controller();

        for (content, expected) in [("yes", true), ("Y", true), ("no", false), ("maybe", false)] {
            let asker = controller.clone();
            let handle = tokio::spawn(async move {
                asker
                    .ask_yes_no(CHANNEL, AUTHOR, "Proceed? (yes/no)", Duration::from_secs(5))
                    .await
                    .unwrap()
            });
            // Let the wait register and the prompt go out.
            sleep(Duration::from_millis(20)).await;
            assert!(controller.deliver(&reply(content)));
            assert_eq!(handle.await.unwrap(), Some(expected));
        }
    }

    #[tokio::test]
    async fn test_yes_no_timeout_is_distinct_from_no() {
        let (controller, _tx) = controller();
        let answer = controller
            .ask_yes_no(CHANNEL, AUTHOR, "Proceed? (yes/no)", Duration::from_millis(30))
            .await
            .unwrap();
        assert_eq!(answer, None);
        assert!(!controller.has_pending(CHANNEL, AUTHOR));
    }

    #[tokio::test]
    async fn test_choice_ignores_malformed_replies() {
        let (controller, _tx) = controller();
        let choices: Vec<String> = vec!["alpha".into(), "beta".into(), "gamma".into()];

        let asker = controller.clone();
        let choices_clone = choices.clone();
        let handle = tokio::spawn(async move {
            asker
                .ask_choice(
                    CHANNEL,
                    AUTHOR,
                    "Pick one:",
                    &choices_clone,
                    Duration::from_secs(5),
                )
                .await
                .unwrap()
        });
        sleep(Duration::from_millis(20)).await;

        // Non-numeric and out-of-range replies are not claimed and do
        // not resolve the wait.
        assert!(!controller.deliver(&reply("nope")));
        assert!(!controller.deliver(&reply("7")));
        assert!(controller.has_pending(CHANNEL, AUTHOR));

        assert!(controller.deliver(&reply("2")));
        assert_eq!(handle.await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_replies_from_other_conversations_are_not_claimed() {
        let (controller, _tx) = controller();

        let asker = controller.clone();
        let handle = tokio::spawn(async move {
            asker
                .ask_yes_no(CHANNEL, AUTHOR, "Proceed? (yes/no)", Duration::from_millis(200))
                .await
                .unwrap()
        });
        sleep(Duration::from_millis(20)).await;

        let mut other_channel = reply("yes");
        other_channel.channel = ChannelId(99);
        assert!(!controller.deliver(&other_channel));

        let mut other_author = reply("yes");
        other_author.author.user_id = UserId(99);
        assert!(!controller.deliver(&other_author));

        assert_eq!(handle.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_shutdown_releases_pending_wait() {
        let (controller, shutdown_tx) = controller();

        let asker = controller.clone();
        let handle = tokio::spawn(async move {
            asker
                .ask_yes_no(CHANNEL, AUTHOR, "Proceed? (yes/no)", Duration::from_secs(60))
                .await
                .unwrap()
        });
        sleep(Duration::from_millis(20)).await;

        shutdown_tx.send(true).unwrap();
        assert_eq!(handle.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ask_name_requires_single_token() {
        let (controller, _tx) = controller();

        let asker = controller.clone();
        let handle = tokio::spawn(async move {
            asker
                .ask_name(CHANNEL, AUTHOR, "Which extension?", Duration::from_secs(5))
                .await
                .unwrap()
        });
        sleep(Duration::from_millis(20)).await;

        assert!(!controller.deliver(&reply("two words")));
        assert!(controller.deliver(&reply("weather")));
        assert_eq!(handle.await.unwrap(), Some("weather".to_string()));
    }
}
