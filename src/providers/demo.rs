use super::{canned_events, CallContext, Credentials, ProviderAdapter};
use crate::tokens::estimate_token_count;
use crate::types::{EventStream, Request, Usage};
use crate::Result;
use async_trait::async_trait;
use futures::stream;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

static KEYWORD_REPLIES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (
            r"(?i)\b(workout|exercise|training|lift|gym|run)",
            "Here's a balanced plan: warm up for 5 minutes, then do 3 rounds of 10 squats, \
             10 push-ups and a 30-second plank. Finish with 5 minutes of stretching. \
             Add one round each week as it gets easier.",
        ),
        (
            r"(?i)\b(meal|nutrition|food|protein|calorie|diet|eat)",
            "Aim for a palm-sized portion of protein, a fist of vegetables and a cupped \
             hand of whole grains at each meal. Keep snacks simple: fruit, yogurt or nuts.",
        ),
        (
            r"(?i)\b(sleep|recover|rest|tired|sore)",
            "Recovery is where progress happens. Target 7 to 9 hours of sleep, keep a \
             consistent bedtime, and take an easy day when soreness lingers.",
        ),
        (
            r"(?i)\b(water|hydrat|drink)",
            "Start the day with a glass of water and keep a bottle nearby. A good baseline \
             is about 30 ml per kilogram of body weight, more on training days.",
        ),
        (
            r"(?i)\b(motivat|goal|habit|consisten)",
            "Small wins compound. Pick one habit for this week, make it easy to start, \
             and track it every day. Consistency beats intensity.",
        ),
    ]
    .into_iter()
    .filter_map(|(pattern, reply)| Regex::new(pattern).ok().map(|re| (re, reply)))
    .collect()
});

const FALLBACK_REPLIES: &[&str] = &[
    "Thanks for checking in! Tell me about your training, meals or sleep and I'll help you plan.",
    "I'm your demo coach. Ask me about workouts, nutrition, hydration or recovery.",
    "Every healthy day starts with one good choice. What would you like to work on?",
    "Demo mode is active. Connect a provider for personalised coaching; until then, ask me about a workout plan.",
];

/// Works with zero configuration and no network. The reply is a pure function of
/// the last user message: a keyword match picks a canned coaching reply, otherwise
/// a content hash picks one of the fallback replies.
#[derive(Debug, Default)]
pub struct DemoAdapter;

impl DemoAdapter {
    pub fn new() -> Self {
        Self
    }

    pub fn reply_for(text: &str) -> &'static str {
        if let Some((_, reply)) = KEYWORD_REPLIES.iter().find(|(re, _)| re.is_match(text)) {
            return *reply;
        }
        let digest = Sha256::digest(text.trim().as_bytes());
        FALLBACK_REPLIES[digest[0] as usize % FALLBACK_REPLIES.len()]
    }
}

#[async_trait]
impl ProviderAdapter for DemoAdapter {
    fn name(&self) -> &str {
        "demo"
    }

    async fn configure(&self, _credentials: Option<&Credentials>) -> Result<()> {
        Ok(())
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn send(self: Arc<Self>, request: Arc<Request>, ctx: CallContext) -> EventStream {
        let prompt = request.last_user_text().unwrap_or_default();
        let reply = Self::reply_for(prompt);
        debug!(request_id = ctx.request_id.as_str(), "demo reply selected");
        let usage = Usage::new(
            estimate_token_count(prompt) as u64,
            estimate_token_count(reply) as u64,
        );
        Box::pin(stream::iter(canned_events(
            reply,
            request.stream,
            request.response_format,
            Some(usage),
        )))
    }

    async fn probe(&self) -> Result<()> {
        Ok(())
    }

    async fn available_models(&self) -> Result<Vec<String>> {
        Ok(vec!["demo-coach".to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Transcript;
    use std::time::Duration;

    #[test]
    fn keyword_replies() {
        assert!(DemoAdapter::reply_for("help me plan a workout").contains("plan"));
        assert!(DemoAdapter::reply_for("How much PROTEIN do I need?").contains("protein"));
        assert!(DemoAdapter::reply_for("my legs are sore").starts_with("Recovery"));
    }

    #[test]
    fn fallback_is_deterministic() {
        let a = DemoAdapter::reply_for("hello there");
        let b = DemoAdapter::reply_for("hello there");
        assert_eq!(a, b);
        assert!(FALLBACK_REPLIES.contains(&a));
    }

    #[tokio::test]
    async fn same_request_same_output() {
        let adapter = Arc::new(DemoAdapter::new());
        let request = Arc::new(Request::user("help me plan a workout"));
        let ctx = || CallContext::new("demo", Duration::from_secs(1));
        let first = Transcript::collect(adapter.clone().send(request.clone(), ctx())).await;
        let second = Transcript::collect(adapter.send(request, ctx())).await;
        assert!(!first.text().is_empty());
        assert_eq!(first, second);
        assert!(first.is_done());
    }
}
