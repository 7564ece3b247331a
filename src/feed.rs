use crate::store::GameStore;
use futures::{
    Stream,
    StreamExt,
};
use generated_abi::{
    EntityId,
    ModelName,
    ModelPayload,
    PayloadError,
};
use std::future::Future;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{
    debug,
    info,
    warn,
};

/// One push from the world's subscription service.
#[derive(Clone, Debug, PartialEq)]
pub enum FeedMessage {
    /// Current value of a model on an entity.
    EntityUpdated {
        entity_id: EntityId,
        model: String,
        payload: serde_json::Value,
    },
    /// One-shot event, keyed by the entity it was emitted for.
    Event {
        entity_id: EntityId,
        name: String,
        payload: serde_json::Value,
    },
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("subscription closed")]
    Closed,
    #[error("subscription transport failed: {0}")]
    Transport(String),
}

pub trait EntityFeed {
    fn next_message(&mut self) -> impl Future<Output = Result<FeedMessage, FeedError>> + Send;
}

/// Feed backed by an in-process channel.
pub struct ChannelFeed {
    receiver: mpsc::Receiver<FeedMessage>,
}

impl ChannelFeed {
    pub fn new(receiver: mpsc::Receiver<FeedMessage>) -> Self {
        Self { receiver }
    }

    pub fn new_with_sender(buffer: usize) -> (Self, mpsc::Sender<FeedMessage>) {
        let (sender, receiver) = mpsc::channel(buffer);
        (Self::new(receiver), sender)
    }
}

impl EntityFeed for ChannelFeed {
    async fn next_message(&mut self) -> Result<FeedMessage, FeedError> {
        self.receiver.recv().await.ok_or(FeedError::Closed)
    }
}

/// Adapts any message stream, e.g. a websocket subscription.
pub struct StreamFeed<S> {
    stream: S,
}

impl<S> StreamFeed<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

impl<S> EntityFeed for StreamFeed<S>
where
    S: Stream<Item = Result<FeedMessage, FeedError>> + Unpin + Send,
{
    async fn next_message(&mut self) -> Result<FeedMessage, FeedError> {
        self.stream.next().await.unwrap_or(Err(FeedError::Closed))
    }
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("{model} on {entity_id} is outside the subscription")]
    NotSubscribed {
        entity_id: EntityId,
        model: ModelName,
    },
    #[error("`{0}` is a model, not an event")]
    NotAnEvent(ModelName),
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

/// Decodes `message` and upserts it into `store`.
pub fn apply_message(store: &GameStore, message: FeedMessage) -> Result<(), ApplyError> {
    let (entity_id, model, payload, expect_event) = match message {
        FeedMessage::EntityUpdated {
            entity_id,
            model,
            payload,
        } => (entity_id, model, payload, false),
        FeedMessage::Event {
            entity_id,
            name,
            payload,
        } => (entity_id, name, payload, true),
    };
    let model: ModelName = model.parse()?;
    if expect_event && !model.is_event() {
        return Err(ApplyError::NotAnEvent(model));
    }
    if !store.query().accepts(entity_id, model) {
        return Err(ApplyError::NotSubscribed { entity_id, model });
    }
    let payload = ModelPayload::decode(model, payload)?;
    store.upsert(entity_id, payload);
    Ok(())
}

/// Pumps `feed` into `store` until the feed closes.
///
/// Bad messages are logged and skipped; they never stop the session.
pub async fn run_feed<F: EntityFeed>(mut feed: F, store: GameStore) -> Result<(), FeedError> {
    loop {
        let message = match feed.next_message().await {
            Ok(message) => message,
            Err(FeedError::Closed) => {
                info!("subscription feed closed");
                return Ok(());
            }
            Err(err) => {
                warn!(?err, "subscription feed failed");
                return Err(err);
            }
        };
        match apply_message(&store, message) {
            Ok(()) => {}
            Err(err @ ApplyError::NotSubscribed { .. }) => {
                debug!(%err, "ignoring update");
            }
            Err(err) => {
                warn!(%err, "skipping malformed update");
            }
        }
    }
}
