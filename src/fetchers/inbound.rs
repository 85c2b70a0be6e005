use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::AppError;
use crate::fetchers::{Fetcher, RawCandidate};
use crate::normalize;
use crate::ratelimit::RateLimiter;
use crate::registry::{SourceDefinition, SourceKind};

/// One event from the chat collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub channel: String,
    pub text: String,
}

/// Buffer between the push-driven chat webhook and the pull-shaped fetcher
/// contract: message arrival enqueues here and triggers the owning source,
/// whose fetch then drains the queue in arrival order.
#[derive(Default)]
pub struct InboundHub {
    queues: Mutex<HashMap<String, VecDeque<ChatMessage>>>,
}

impl InboundHub {
    pub fn new() -> InboundHub {
        InboundHub::default()
    }

    pub fn push(&self, source_key: &str, message: ChatMessage) {
        let mut queues = self.queues.lock().expect("inbound hub lock poisoned");
        queues
            .entry(source_key.to_string())
            .or_default()
            .push_back(message);
    }

    pub fn drain(&self, source_key: &str) -> Vec<ChatMessage> {
        let mut queues = self.queues.lock().expect("inbound hub lock poisoned");
        queues
            .get_mut(source_key)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default()
    }
}

/// Case-insensitive allow-list check; an empty list admits every channel.
pub fn channel_allowed(allowed: &[String], channel: &str) -> bool {
    allowed.is_empty() || allowed.iter().any(|entry| entry.eq_ignore_ascii_case(channel))
}

/// Chat-bot channel fetcher. Synthesizes exactly one candidate per buffered
/// message that carries an extractable URL; messages without one are
/// silently dropped.
pub struct InboundFetcher {
    hub: Arc<InboundHub>,
}

impl InboundFetcher {
    pub fn new(hub: Arc<InboundHub>) -> InboundFetcher {
        InboundFetcher { hub }
    }
}

#[async_trait]
impl Fetcher for InboundFetcher {
    fn kind(&self) -> SourceKind {
        SourceKind::Inbound
    }

    async fn fetch(
        &self,
        source: &SourceDefinition,
        _limiter: &RateLimiter,
    ) -> Result<Vec<RawCandidate>, AppError> {
        let candidates = self
            .hub
            .drain(&source.key)
            .into_iter()
            .filter(|message| normalize::extract_url(&message.text).is_some())
            .map(|message| RawCandidate::Inbound {
                channel: message.channel,
                text: message.text,
            })
            .collect();
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_list_matches_case_insensitively() {
        let allowed = vec!["deals-chat".to_string(), "VIP".to_string()];
        assert!(channel_allowed(&allowed, "Deals-Chat"));
        assert!(channel_allowed(&allowed, "vip"));
        assert!(!channel_allowed(&allowed, "random"));
    }

    #[test]
    fn empty_allow_list_admits_all_channels() {
        assert!(channel_allowed(&[], "anything"));
    }

    #[test]
    fn drain_empties_the_queue_in_order() {
        let hub = InboundHub::new();
        hub.push(
            "chat",
            ChatMessage {
                channel: "a".into(),
                text: "first".into(),
            },
        );
        hub.push(
            "chat",
            ChatMessage {
                channel: "a".into(),
                text: "second".into(),
            },
        );
        let drained = hub.drain("chat");
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].text, "first");
        assert!(hub.drain("chat").is_empty());
        assert!(hub.drain("unknown").is_empty());
    }
}
