//! The subscription registry: tracks live listeners keyed by reference
//! path and answers "which listeners are affected by a write at path P?"

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::path::Ref;
use crate::query::QueryDescriptor;

/// Unique id for a session's outbound channel, used as the registry's
/// channel key since the channel sender itself isn't hashable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

impl ChannelId {
    pub fn next() -> Self {
        ChannelId(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

type QueriesByKey = HashMap<String, QueryDescriptor>;
type ChannelsAtRef = HashMap<ChannelId, QueriesByKey>;

/// Grounded in `examples/original_source/pkg/store/listener.go`: a single
/// mutex guarding `ref -> channel -> query` nesting, held only for the
/// duration of register/unregister/find. No I/O ever runs under this lock.
#[derive(Default)]
pub struct Registry {
    inner: Mutex<HashMap<Box<str>, ChannelsAtRef>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Inserts `(ref, channel, query)`. Idempotent on the triple: a
    /// re-register with an identical query is a no-op (the dedupe key
    /// collides and the query is simply overwritten with itself).
    pub fn register(&self, ref_: &Ref, channel: ChannelId, query: QueryDescriptor) {
        let mut inner = self.inner.lock();
        inner
            .entry(ref_.as_str().into())
            .or_default()
            .entry(channel)
            .or_default()
            .insert(query.dedupe_key(), query);
    }

    /// Removes the `(ref, channel, query)` triple if present. Leaves empty
    /// intermediate containers in place rather than pruning them, matching
    /// the Go reference, which doesn't prune either.
    pub fn unregister(&self, ref_: &Ref, channel: ChannelId, query: &QueryDescriptor) {
        let mut inner = self.inner.lock();
        if let Some(channels) = inner.get_mut(ref_.as_str()) {
            if let Some(queries) = channels.get_mut(&channel) {
                queries.remove(&query.dedupe_key());
            }
        }
    }

    /// Removes every query registered by `channel`, at every ref. Used when
    /// a session closes, including on error paths.
    pub fn unregister_channel(&self, channel: ChannelId) {
        let mut inner = self.inner.lock();
        for channels in inner.values_mut() {
            channels.remove(&channel);
        }
    }

    /// Drops all listeners.
    pub fn clean(&self) {
        self.inner.lock().clear();
    }

    /// For each registered ref `R`, includes `R` in the result if it is `/`,
    /// or shares ancestry (in either direction) with any of `changed_refs`.
    /// Each `R` appears at most once.
    pub fn find(&self, changed_refs: &[Ref]) -> Vec<Ref> {
        let inner = self.inner.lock();
        inner
            .keys()
            .filter_map(|raw| {
                let r = Ref::parse(raw).ok()?;
                let matches = r.is_root() || changed_refs.iter().any(|c| r.shares_ancestry_with(c));
                matches.then_some(r)
            })
            .collect()
    }

    /// Returns every `(channel, query)` pair registered at exactly `ref_`,
    /// for the fan-out loop to re-evaluate and deliver.
    pub fn listeners_at(&self, ref_: &Ref) -> Vec<(ChannelId, QueryDescriptor)> {
        let inner = self.inner.lock();
        let Some(channels) = inner.get(ref_.as_str()) else {
            return Vec::new();
        };
        channels
            .iter()
            .flat_map(|(channel, queries)| queries.values().map(move |q| (*channel, q.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_matches_root_exact_ancestor_and_descendant() {
        let registry = Registry::new();
        let ch = ChannelId::next();
        registry.register(&Ref::root(), ch, QueryDescriptor::default());
        registry.register(&Ref::parse("/a").unwrap(), ch, QueryDescriptor::default());
        registry.register(&Ref::parse("/a/b/c").unwrap(), ch, QueryDescriptor::default());
        registry.register(&Ref::parse("/a/b/c/d").unwrap(), ch, QueryDescriptor::default());
        registry.register(&Ref::parse("/unrelated").unwrap(), ch, QueryDescriptor::default());

        let affected = registry.find(&[Ref::parse("/a/b/c").unwrap()]);
        let set: std::collections::HashSet<_> = affected.iter().map(Ref::to_string).collect();
        assert!(set.contains("/"));
        assert!(set.contains("/a"));
        assert!(set.contains("/a/b/c"));
        assert!(set.contains("/a/b/c/d"));
        assert!(!set.contains("/unrelated"));
    }

    #[test]
    fn prefix_safety_foo_vs_foobar() {
        let registry = Registry::new();
        let ch = ChannelId::next();
        registry.register(&Ref::parse("/foo").unwrap(), ch, QueryDescriptor::default());
        registry.register(&Ref::parse("/foobar").unwrap(), ch, QueryDescriptor::default());

        let affected = registry.find(&[Ref::parse("/foo/x").unwrap()]);
        let set: std::collections::HashSet<_> = affected.iter().map(Ref::to_string).collect();
        assert!(set.contains("/foo"));
        assert!(!set.contains("/foobar"));
    }

    #[test]
    fn distinct_queries_on_same_path_are_both_tracked() {
        let registry = Registry::new();
        let ch = ChannelId::next();
        let r = Ref::parse("/path").unwrap();
        registry.register(&r, ch, QueryDescriptor::default());
        registry.register(
            &r,
            ch,
            QueryDescriptor { limit: 1, ..Default::default() },
        );
        assert_eq!(registry.listeners_at(&r).len(), 2);
    }

    #[test]
    fn unregister_is_effective() {
        let registry = Registry::new();
        let ch = ChannelId::next();
        let r = Ref::parse("/path").unwrap();
        let q = QueryDescriptor::default();
        registry.register(&r, ch, q.clone());
        registry.unregister(&r, ch, &q);
        assert_eq!(registry.listeners_at(&r).len(), 0);
    }

    #[test]
    fn unregister_channel_clears_every_ref() {
        let registry = Registry::new();
        let ch = ChannelId::next();
        registry.register(&Ref::parse("/a").unwrap(), ch, QueryDescriptor::default());
        registry.register(&Ref::parse("/b").unwrap(), ch, QueryDescriptor::default());
        registry.unregister_channel(ch);
        assert_eq!(registry.listeners_at(&Ref::parse("/a").unwrap()).len(), 0);
        assert_eq!(registry.listeners_at(&Ref::parse("/b").unwrap()).len(), 0);
    }
}
