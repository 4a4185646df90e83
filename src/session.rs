//! Per-connection session state machine and the write/listen dispatch
//! logic shared by the WebSocket and REST surfaces.
//!
//! This module is transport-agnostic: [`Dispatcher`] and [`Session`] know
//! nothing about `axum` or sockets, so the core write/listen/fan-out
//! semantics can be exercised directly in tests (`tests/scenarios.rs`)
//! without standing up a real connection. [`crate::ws`] and
//! [`crate::rest`] adapt these to the two wire surfaces.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, warn};

use crate::codec::{Action, Envelope, Request};
use crate::error::Result;
use crate::path::Ref;
use crate::query::QueryDescriptor;
use crate::registry::{ChannelId, Registry};
use crate::rules::Rules;
use crate::tree::Tree;

/// States a session passes through. `Connecting` and `Closed` are
/// transient — entered and exited within one call to the driving loop in
/// `crate::ws` — but are named explicitly so the lifecycle is visible
/// rather than implicit in control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Live,
    Closing,
    Closed,
}

/// Routes a session's outbound channel id to its live sender. Kept
/// separate from [`Registry`], which only ever sees the opaque
/// [`ChannelId`] key (the registry's job is matching refs to listeners,
/// not owning delivery sinks).
#[derive(Default)]
struct ChannelTable {
    inner: Mutex<HashMap<ChannelId, UnboundedSender<Envelope>>>,
}

impl ChannelTable {
    fn register(&self, id: ChannelId, sender: UnboundedSender<Envelope>) {
        self.inner.lock().insert(id, sender);
    }

    fn unregister(&self, id: ChannelId) {
        self.inner.lock().remove(&id);
    }

    /// Best-effort delivery: a closed or already-unregistered channel is
    /// tolerated, not an error: producers must tolerate a closed or
    /// already-unregistered listener gracefully.
    fn send(&self, id: ChannelId, envelope: Envelope) {
        let sender = self.inner.lock().get(&id).cloned();
        match sender {
            Some(sender) => {
                if sender.send(envelope).is_err() {
                    warn!(channel = id.raw(), "dropping delivery: outbound channel closed");
                }
            }
            None => warn!(channel = id.raw(), "dropping delivery: channel no longer registered"),
        }
    }
}

/// Shared core: the tree, the subscription registry, and the channel
/// table every session dispatches through. One `Dispatcher` is shared by
/// every connection and by the REST adapter.
pub struct Dispatcher {
    tree: Tree,
    registry: Arc<Registry>,
    rules: Option<Arc<Rules>>,
    channels: ChannelTable,
}

impl Dispatcher {
    pub fn new(tree: Tree, registry: Arc<Registry>, rules: Option<Arc<Rules>>) -> Arc<Self> {
        Arc::new(Dispatcher { tree, registry, rules, channels: ChannelTable::default() })
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// `set` (wire tag `p`): overwrite the subtree, then fan out to every
    /// listener whose view may have changed.
    pub async fn handle_set(&self, ref_: &Ref, data: serde_json::Value) -> Result<()> {
        self.tree.set(ref_, data).await?;
        self.fan_out(&[ref_.clone()]).await;
        Ok(())
    }

    /// `update` (wire tag `m`): multi-path write, fan out per sub-path
    /// changed ref.
    pub async fn handle_update(&self, base: &Ref, data: serde_json::Value) -> Result<()> {
        let changed = self.tree.update(base, data).await?;
        self.fan_out(&changed).await;
        Ok(())
    }

    /// `listen`/`query` (wire tags `l`/`q`): register the listener, then
    /// deliver exactly one initial snapshot on `channel` before any
    /// change-notification tied to a later write.
    ///
    /// Returns whether the `no_index` warning applies.
    pub async fn handle_listen(
        &self,
        ref_: &Ref,
        query: QueryDescriptor,
        channel: ChannelId,
    ) -> Result<bool> {
        self.registry.register(ref_, channel, query.clone());
        let value = self.tree.get(ref_, &query).await?;
        self.channels.send(
            channel,
            Envelope::Data { ref_: ref_.to_string(), query_id: query.id, value },
        );
        Ok(!self.has_index(ref_, &query))
    }

    /// `unlisten` (wire tag `n`): remove the `(ref, channel, query)` triple.
    pub fn handle_unlisten(&self, ref_: &Ref, query: &QueryDescriptor, channel: ChannelId) {
        self.registry.unregister(ref_, channel, query);
    }

    pub fn register_channel(&self, id: ChannelId, sender: UnboundedSender<Envelope>) {
        self.channels.register(id, sender);
    }

    /// Session teardown: unregister every listener this channel owns, then
    /// drop its delivery sink. Must run on every close path, including
    /// errors.
    pub fn close_channel(&self, id: ChannelId) {
        self.registry.unregister_channel(id);
        self.channels.unregister(id);
    }

    pub async fn reset(&self) -> Result<()> {
        self.registry.clean();
        self.tree.reset().await
    }

    fn has_index(&self, ref_: &Ref, query: &QueryDescriptor) -> bool {
        match &self.rules {
            // Without a rules file loaded, index coverage can't be
            // determined; the original reference relies entirely on the
            // rules engine for this, so absence of rules never produces a
            // warning.
            None => true,
            Some(rules) => rules.child(ref_).has_index_for(&query.order_by),
        }
    }

    async fn fan_out(&self, changed_refs: &[Ref]) {
        for affected_ref in self.registry.find(changed_refs) {
            for (channel, query) in self.registry.listeners_at(&affected_ref) {
                match self.tree.get(&affected_ref, &query).await {
                    Ok(value) => self.channels.send(
                        channel,
                        Envelope::Data {
                            ref_: affected_ref.to_string(),
                            query_id: query.id,
                            value,
                        },
                    ),
                    Err(err) => {
                        error!(ref_ = %affected_ref, %err, "fan-out read failed, skipping delivery");
                    }
                }
            }
        }
    }
}

/// Per-connection handle: owns this connection's channel id and forwards
/// decoded requests to the shared [`Dispatcher`].
pub struct Session {
    pub channel: ChannelId,
    dispatcher: Arc<Dispatcher>,
}

impl Session {
    pub fn new(dispatcher: Arc<Dispatcher>, outbound: UnboundedSender<Envelope>) -> Self {
        let channel = ChannelId::next();
        dispatcher.register_channel(channel, outbound);
        Session { channel, dispatcher }
    }

    /// Handles one decoded request, returning the OK envelope to send, or
    /// `None` for a malformed request: no OK is sent for that request.
    pub async fn handle(&self, req: Request) -> Option<Envelope> {
        let ref_ = match Ref::parse(&req.ref_) {
            Ok(r) => r,
            Err(err) => {
                warn!(raw_ref = %req.ref_, %err, "invalid reference, dropping request");
                return None;
            }
        };

        match req.action {
            Action::Set => match self.dispatcher.handle_set(&ref_, req.data).await {
                Ok(()) => Some(Envelope::Ok { request_id: req.request_id, no_index: false }),
                Err(err) => {
                    error!(%err, ref_ = %ref_, "set failed");
                    None
                }
            },
            Action::Update => match self.dispatcher.handle_update(&ref_, req.data).await {
                Ok(()) => Some(Envelope::Ok { request_id: req.request_id, no_index: false }),
                Err(err) => {
                    error!(%err, ref_ = %ref_, "update failed");
                    None
                }
            },
            Action::Listen => {
                match self.dispatcher.handle_listen(&ref_, req.query, self.channel).await {
                    Ok(no_index) => Some(Envelope::Ok { request_id: req.request_id, no_index }),
                    Err(err) => {
                        error!(%err, ref_ = %ref_, "listen failed");
                        None
                    }
                }
            }
            Action::Unlisten => {
                self.dispatcher.handle_unlisten(&ref_, &req.query, self.channel);
                Some(Envelope::Ok { request_id: req.request_id, no_index: false })
            }
        }
    }

    /// Must be called on every close path.
    pub fn close(&self) {
        self.dispatcher.close_channel(self.channel);
    }
}
