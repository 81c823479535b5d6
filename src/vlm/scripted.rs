//! Scripted inference service.
//!
//! Replies are queued per `PromptKind`. When a queue runs dry its last reply
//! repeats; a kind with no replies at all fails with `EmptyResponse`.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::{InferenceService, PromptKind, VlmError, VlmResult};

#[derive(Debug, Default)]
struct Queues {
    pending: HashMap<PromptKind, VecDeque<String>>,
    last: HashMap<PromptKind, String>,
    calls: Vec<(PromptKind, f32)>,
    unrouted: usize,
}

#[derive(Debug, Default)]
pub struct ScriptedInference {
    queues: Mutex<Queues>,
    unavailable: bool,
}

impl ScriptedInference {
    pub fn new() -> Self {
        Self::default()
    }

    /// Service whose every call fails with a connection error
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Queue replies for one prompt kind
    pub fn replies<I, S>(self, kind: PromptKind, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_queues(|q| {
            q.pending
                .entry(kind)
                .or_default()
                .extend(replies.into_iter().map(Into::into));
        });
        self
    }

    /// Total number of calls made
    pub fn call_count(&self) -> usize {
        self.with_queues(|q| q.calls.len() + q.unrouted)
    }

    /// Number of calls made for one prompt kind
    pub fn calls_for(&self, kind: PromptKind) -> usize {
        self.with_queues(|q| q.calls.iter().filter(|(k, _)| *k == kind).count())
    }

    /// Temperatures used for one prompt kind, in call order
    pub fn temperatures_for(&self, kind: PromptKind) -> Vec<f32> {
        self.with_queues(|q| {
            q.calls
                .iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, t)| *t)
                .collect()
        })
    }

    fn with_queues<T>(&self, f: impl FnOnce(&mut Queues) -> T) -> T {
        match self.queues.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

impl InferenceService for ScriptedInference {
    fn infer(&self, _image: Option<&[u8]>, prompt: &str, temperature: f32) -> VlmResult<String> {
        let Some(kind) = PromptKind::of(prompt) else {
            self.with_queues(|q| q.unrouted += 1);
            return Err(VlmError::InvalidResponse("unrecognised prompt".to_string()));
        };
        if self.unavailable {
            self.with_queues(|q| q.calls.push((kind, temperature)));
            return Err(VlmError::ConnectionFailed("scripted outage".to_string()));
        }

        self.with_queues(|q| {
            q.calls.push((kind, temperature));
            let next = q.pending.get_mut(&kind).and_then(VecDeque::pop_front);
            match next {
                Some(reply) => {
                    q.last.insert(kind, reply.clone());
                    Ok(reply)
                }
                None => q.last.get(&kind).cloned().ok_or(VlmError::EmptyResponse),
            }
        })
    }
}
