// Scriptable in-memory backend for unit tests

use crate::backend::{BackendError, BackendEvent, Command, EventStream, Reply, Result, SpatialBackend, Topic};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

type Responder = Box<dyn FnMut(&Command) -> Result<Reply> + Send>;

/// What the next `subscribe` call does
pub(crate) enum ScriptedSubscription {
    /// `subscribe` itself fails
    Refuse,
    /// Stream fed by the test through the paired sender
    Open(mpsc::UnboundedReceiver<Result<BackendEvent>>),
}

pub(crate) struct FakeBackend {
    commands: Mutex<Vec<Command>>,
    responder: Mutex<Responder>,
    subscriptions: Mutex<VecDeque<ScriptedSubscription>>,
    subscribe_calls: AtomicUsize,
    topics: Mutex<Vec<Topic>>,
}

impl FakeBackend {
    /// Every command succeeds with `OK`
    pub fn new() -> Self {
        Self::with_responder(|_| Ok(Reply::Text("OK".to_string())))
    }

    pub fn with_responder(
        responder: impl FnMut(&Command) -> Result<Reply> + Send + 'static,
    ) -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            responder: Mutex::new(Box::new(responder)),
            subscriptions: Mutex::new(VecDeque::new()),
            subscribe_calls: AtomicUsize::new(0),
            topics: Mutex::new(Vec::new()),
        }
    }

    /// Queue the outcome of a future `subscribe` call
    pub fn script_subscription(&self, outcome: ScriptedSubscription) {
        self.subscriptions.lock().push_back(outcome);
    }

    /// Queue an open subscription and return its feeding end
    pub fn open_subscription(&self) -> mpsc::UnboundedSender<Result<BackendEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.script_subscription(ScriptedSubscription::Open(rx));
        tx
    }

    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().clone()
    }

    pub fn commands_named(&self, name: &str) -> Vec<Command> {
        self.commands
            .lock()
            .iter()
            .filter(|c| c.name() == name)
            .cloned()
            .collect()
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.topics.lock().clone()
    }
}

#[async_trait]
impl SpatialBackend for FakeBackend {
    async fn command(&self, command: &Command) -> Result<Reply> {
        self.commands.lock().push(command.clone());
        let mut responder = self.responder.lock();
        (&mut **responder)(command)
    }

    async fn subscribe(&self, topics: &[Topic]) -> Result<EventStream> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        *self.topics.lock() = topics.to_vec();

        let scripted = self.subscriptions.lock().pop_front();
        match scripted {
            Some(ScriptedSubscription::Refuse) => Err(BackendError::SubscriptionClosed),
            Some(ScriptedSubscription::Open(rx)) => {
                let closed = stream::once(async { Err(BackendError::SubscriptionClosed) });
                Ok(UnboundedReceiverStream::new(rx).chain(closed).boxed())
            }
            // Unscripted subscriptions stay open and silent
            None => Ok(stream::pending().boxed()),
        }
    }
}

/// Build a `[cursor, [[id, object], ...]]` search reply
pub(crate) fn object_page(cursor: i64, objects: &[(&str, String)]) -> Reply {
    Reply::Array(vec![
        Reply::Int(cursor),
        Reply::Array(
            objects
                .iter()
                .map(|(id, object)| {
                    Reply::Array(vec![Reply::Text(id.to_string()), Reply::Text(object.clone())])
                })
                .collect(),
        ),
    ])
}

/// Build a `[cursor, [id, ...]]` IDS search reply
pub(crate) fn id_page(cursor: i64, ids: &[&str]) -> Reply {
    Reply::Array(vec![
        Reply::Int(cursor),
        Reply::Array(ids.iter().map(|id| Reply::Text(id.to_string())).collect()),
    ])
}
