//! In-process [`ContextHost`].
//!
//! Each context holds a page snapshot and, once provisioned, the command
//! sender of its [`ReaderAgent`].  Every agent shares one
//! [`PlaybackEngine`], the process's single audio output.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::extract::{ContentExtractor, Document};
use crate::playback::PlaybackEngine;

use super::agent::ReaderAgent;
use super::context::{AgentCommand, ContextError, ContextHost, ContextId, HostEvent};

struct ContextSlot {
    document: Document,
    agent: Option<mpsc::UnboundedSender<AgentCommand>>,
}

#[derive(Default)]
struct HostInner {
    next_id: u64,
    active: Option<ContextId>,
    contexts: HashMap<ContextId, ContextSlot>,
}

pub struct LocalContextHost {
    inner: Mutex<HostInner>,
    engine: Arc<PlaybackEngine>,
    extractor: ContentExtractor,
    events: mpsc::UnboundedSender<HostEvent>,
    installs: AtomicUsize,
}

impl LocalContextHost {
    /// `events` receives status and agent-lost notifications from every
    /// context; hand its receiver to the coordinator's event pump.
    pub fn new(engine: Arc<PlaybackEngine>, events: mpsc::UnboundedSender<HostEvent>) -> Self {
        Self {
            inner: Mutex::new(HostInner::default()),
            engine,
            extractor: ContentExtractor::new(),
            events,
            installs: AtomicUsize::new(0),
        }
    }

    pub fn with_extractor(mut self, extractor: ContentExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    fn lock(&self) -> MutexGuard<'_, HostInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a context showing `document` and make it active.
    pub fn open_context(&self, document: Document) -> ContextId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = ContextId(inner.next_id);
        inner.contexts.insert(
            id,
            ContextSlot {
                document,
                agent: None,
            },
        );
        inner.active = Some(id);
        log::debug!("host: opened {id}");
        id
    }

    pub fn focus(&self, context: ContextId) -> Result<(), ContextError> {
        let mut inner = self.lock();
        if !inner.contexts.contains_key(&context) {
            return Err(ContextError::NotFound(context));
        }
        inner.active = Some(context);
        Ok(())
    }

    /// Load a new page into `context`.  Its agent does not survive.
    pub fn navigate(&self, context: ContextId, document: Document) -> Result<(), ContextError> {
        let dropped = {
            let mut inner = self.lock();
            let slot = inner
                .contexts
                .get_mut(&context)
                .ok_or(ContextError::NotFound(context))?;
            slot.document = document;
            slot.agent.take()
        };
        if dropped.is_some() {
            self.agent_lost(context);
        }
        Ok(())
    }

    /// Close `context`, shutting down its agent.
    pub fn close_context(&self, context: ContextId) -> Result<(), ContextError> {
        let slot = {
            let mut inner = self.lock();
            if inner.active == Some(context) {
                inner.active = None;
            }
            inner
                .contexts
                .remove(&context)
                .ok_or(ContextError::NotFound(context))?
        };
        log::debug!("host: closed {context}");
        if slot.agent.is_some() {
            self.agent_lost(context);
        }
        Ok(())
    }

    pub fn has_agent(&self, context: ContextId) -> bool {
        self.lock()
            .contexts
            .get(&context)
            .is_some_and(|slot| slot.agent.is_some())
    }

    /// Number of agents installed so far.
    pub fn install_count(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }

    fn agent_lost(&self, context: ContextId) {
        log::info!("host: agent in {context} is gone");
        let _ = self.events.send(HostEvent::AgentLost(context));
    }
}

#[async_trait]
impl ContextHost for LocalContextHost {
    fn active_context(&self) -> Option<ContextId> {
        self.lock().active
    }

    fn send(&self, context: ContextId, command: AgentCommand) -> Result<(), ContextError> {
        let inner = self.lock();
        let slot = inner
            .contexts
            .get(&context)
            .ok_or(ContextError::NotFound(context))?;
        let agent = slot.agent.as_ref().ok_or(ContextError::NoAgent(context))?;
        agent
            .send(command)
            .map_err(|_| ContextError::NoAgent(context))
    }

    async fn install(&self, context: ContextId) -> Result<(), ContextError> {
        let mut inner = self.lock();
        let slot = inner
            .contexts
            .get_mut(&context)
            .ok_or(ContextError::NotFound(context))?;

        let agent = ReaderAgent::new(
            context,
            slot.document.clone(),
            Arc::clone(&self.engine),
            self.extractor.clone(),
            self.events.clone(),
        );
        slot.agent = Some(agent.spawn());
        self.installs.fetch_add(1, Ordering::SeqCst);
        log::info!("host: installed agent in {context}");
        Ok(())
    }
}
