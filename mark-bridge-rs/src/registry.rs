use crate::BridgeAdapter;
use mark_rs::types::BridgeTag;
use std::{collections::HashMap, sync::Arc};

/// Maps a [`BridgeTag`] to its single adapter instance. Registration happens
/// once at startup; adapters are stateless across calls.
#[derive(Clone, Default)]
pub struct Registry {
    adapters: HashMap<BridgeTag, Arc<dyn BridgeAdapter>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn BridgeAdapter>) {
        let tag = adapter.bridge();
        self.adapters.insert(tag, adapter);
    }

    pub fn contains(&self, tag: BridgeTag) -> bool {
        self.adapters.contains_key(&tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = BridgeTag> + '_ {
        self.adapters.keys().copied()
    }

    /// Look up the adapter for a tag. Dispatching a tag that was never
    /// registered is a programmer error, not a runtime condition; callers
    /// gate on [`Registry::contains`] at plan time.
    pub fn adapter(&self, tag: BridgeTag) -> Arc<dyn BridgeAdapter> {
        self.adapters
            .get(&tag)
            .cloned()
            .unwrap_or_else(|| panic!("bridge adapter `{tag}` is not registered"))
    }
}
