//! Generation-checked ownership of long-lived GPU objects.
//!
//! The [`ResourceRegistry`] owns pipeline layouts, render passes and
//! pipelines. Everything else holds keys. A key whose object was removed
//! (or whose slot has been reused) fails lookups with
//! [`RhiError::InvalidHandle`] instead of touching a destroyed handle.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::pipeline::PipelineLayout;
//! use vkframe_rhi::registry::ResourceRegistry;
//!
//! # fn example(device: Arc<Device>) -> Result<(), vkframe_rhi::RhiError> {
//! let mut registry = ResourceRegistry::new();
//! let key = registry.insert_layout(PipelineLayout::new(device, &[], &[])?);
//! let layout = registry.layout(key)?;
//! # Ok(())
//! # }
//! ```

use slotmap::{Key, SlotMap, new_key_type};
use tracing::debug;

use crate::error::{RhiError, RhiResult};
use crate::pipeline::{Pipeline, PipelineLayout};
use crate::render_pass::RenderPass;

new_key_type! {
    /// Key of a [`PipelineLayout`] in a [`ResourceRegistry`].
    pub struct PipelineLayoutKey;
    /// Key of a [`RenderPass`] in a [`ResourceRegistry`].
    pub struct RenderPassKey;
    /// Key of a [`Pipeline`] in a [`ResourceRegistry`].
    pub struct PipelineKey;
}

/// Owner of pipeline layouts, render passes and pipelines.
///
/// Destruction order on [`clear`](Self::clear) and drop: pipelines, then
/// layouts, then render passes.
///
/// # Thread Safety
///
/// Lookups take `&self` and insertions take `&mut self`, so the borrow
/// checker keeps a pipeline from being replaced while a reference to it is
/// being recorded.
#[derive(Default)]
pub struct ResourceRegistry {
    /// Graphics pipelines, dropped first.
    pipelines: SlotMap<PipelineKey, Pipeline>,
    /// Pipeline layouts referenced by the pipelines.
    layouts: SlotMap<PipelineLayoutKey, PipelineLayout>,
    /// Render passes referenced by pipelines and framebuffers.
    render_passes: SlotMap<RenderPassKey, RenderPass>,
}

impl ResourceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of a pipeline layout.
    ///
    /// # Returns
    ///
    /// The key to pass to [`PipelineState::set_pipeline_layout`](crate::pipeline::PipelineState::set_pipeline_layout).
    pub fn insert_layout(&mut self, layout: PipelineLayout) -> PipelineLayoutKey {
        self.layouts.insert(layout)
    }

    /// Looks up a pipeline layout.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] if the key is stale.
    pub fn layout(&self, key: PipelineLayoutKey) -> RhiResult<&PipelineLayout> {
        lookup(&self.layouts, key, "pipeline layout")
    }

    /// Takes ownership of a render pass.
    pub fn insert_render_pass(&mut self, render_pass: RenderPass) -> RenderPassKey {
        self.render_passes.insert(render_pass)
    }

    /// Looks up a render pass.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] if the key is stale.
    pub fn render_pass(&self, key: RenderPassKey) -> RhiResult<&RenderPass> {
        lookup(&self.render_passes, key, "render pass")
    }

    /// Replaces the render pass behind `key`, dropping the old one.
    ///
    /// Pipelines built against the old pass must be rebuilt before their
    /// next use, and the device must be idle.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] if the key is stale.
    pub fn replace_render_pass(
        &mut self,
        key: RenderPassKey,
        render_pass: RenderPass,
    ) -> RhiResult<()> {
        replace(&mut self.render_passes, key, render_pass, "render pass")
    }

    /// Takes ownership of a pipeline.
    pub fn insert_pipeline(&mut self, pipeline: Pipeline) -> PipelineKey {
        self.pipelines.insert(pipeline)
    }

    /// Looks up a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] if the key is stale.
    pub fn pipeline(&self, key: PipelineKey) -> RhiResult<&Pipeline> {
        lookup(&self.pipelines, key, "pipeline")
    }

    /// Removes and returns a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] if the key is stale.
    pub fn remove_pipeline(&mut self, key: PipelineKey) -> RhiResult<Pipeline> {
        take(&mut self.pipelines, key, "pipeline")
    }

    /// Replaces the pipeline behind `key`, dropping the old one.
    ///
    /// Used when a resize rebuilds the pipeline; holders of `key` keep working.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] if the key is stale.
    pub fn replace_pipeline(&mut self, key: PipelineKey, pipeline: Pipeline) -> RhiResult<()> {
        replace(&mut self.pipelines, key, pipeline, "pipeline")
    }

    /// Returns `(pipelines, layouts, render passes)` currently owned.
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.pipelines.len(),
            self.layouts.len(),
            self.render_passes.len(),
        )
    }

    /// Destroys everything in dependency order.
    ///
    /// The device must be idle.
    pub fn clear(&mut self) {
        let (pipelines, layouts, render_passes) = self.counts();
        if pipelines + layouts + render_passes == 0 {
            return;
        }
        self.pipelines.clear();
        self.layouts.clear();
        self.render_passes.clear();
        debug!(
            "Registry cleared ({} pipelines, {} layouts, {} render passes)",
            pipelines, layouts, render_passes
        );
    }
}

impl Drop for ResourceRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}

fn stale<K: Key>(kind: &str, key: K) -> RhiError {
    RhiError::InvalidHandle(format!("{kind} {:?} is stale", key.data()))
}

fn lookup<'a, K: Key, T>(map: &'a SlotMap<K, T>, key: K, kind: &str) -> RhiResult<&'a T> {
    map.get(key).ok_or_else(|| stale(kind, key))
}

fn take<K: Key, T>(map: &mut SlotMap<K, T>, key: K, kind: &str) -> RhiResult<T> {
    map.remove(key).ok_or_else(|| stale(kind, key))
}

fn replace<K: Key, T>(map: &mut SlotMap<K, T>, key: K, value: T, kind: &str) -> RhiResult<()> {
    let slot = map.get_mut(key).ok_or_else(|| stale(kind, key))?;
    *slot = value;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_live_key() {
        let mut map: SlotMap<PipelineKey, u32> = SlotMap::with_key();
        let key = map.insert(7);
        assert_eq!(*lookup(&map, key, "pipeline").unwrap(), 7);
    }

    #[test]
    fn test_removed_key_is_stale() {
        let mut map: SlotMap<RenderPassKey, u32> = SlotMap::with_key();
        let key = map.insert(1);
        assert_eq!(take(&mut map, key, "render pass").unwrap(), 1);

        match lookup(&map, key, "render pass") {
            Err(RhiError::InvalidHandle(msg)) => assert!(msg.contains("render pass")),
            other => panic!("expected InvalidHandle, got {:?}", other.map(|_| ())),
        }
        assert!(matches!(
            take(&mut map, key, "render pass"),
            Err(RhiError::InvalidHandle(_))
        ));
    }

    #[test]
    fn test_replace_keeps_key_valid() {
        let mut map: SlotMap<RenderPassKey, &str> = SlotMap::with_key();
        let key = map.insert("bgra");
        replace(&mut map, key, "rgba", "render pass").unwrap();

        assert_eq!(*lookup(&map, key, "render pass").unwrap(), "rgba");
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_replace_stale_key_fails() {
        let mut map: SlotMap<PipelineKey, u32> = SlotMap::with_key();
        let key = map.insert(1);
        map.remove(key);

        assert!(matches!(
            replace(&mut map, key, 2, "pipeline"),
            Err(RhiError::InvalidHandle(_))
        ));
        assert!(map.is_empty());
    }

    #[test]
    fn test_reused_slot_rejects_old_generation() {
        let mut map: SlotMap<PipelineLayoutKey, &str> = SlotMap::with_key();
        let old = map.insert("first");
        map.remove(old);
        let new = map.insert("second");

        assert_ne!(old, new);
        assert!(lookup(&map, old, "pipeline layout").is_err());
        assert_eq!(*lookup(&map, new, "pipeline layout").unwrap(), "second");
    }

    #[test]
    fn test_null_key_is_invalid() {
        let map: SlotMap<PipelineKey, u32> = SlotMap::with_key();
        assert!(matches!(
            lookup(&map, PipelineKey::default(), "pipeline"),
            Err(RhiError::InvalidHandle(_))
        ));
    }

    #[test]
    fn test_empty_registry() {
        let mut registry = ResourceRegistry::new();
        assert_eq!(registry.counts(), (0, 0, 0));
        assert!(registry.pipeline(PipelineKey::default()).is_err());
        assert!(registry.render_pass(RenderPassKey::default()).is_err());
        registry.clear();
    }
}
