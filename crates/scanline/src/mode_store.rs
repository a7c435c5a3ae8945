//! Per-resolution capture parameters and resolution aliases.

use tracing::{debug, info};

use scanline_core::prelude::{
    ColorParams, GeometryParams, ModeParams, Resolution, ResolutionAlias, StatusBus, StatusEvent,
};

/// Keyed map of capture parameters per input resolution, plus the alias set
/// that substitutes one reported resolution for another.
///
/// Mode identity is width and height; bit depth never participates in
/// lookups. Display order (for the shell) is pixel count ascending, which
/// does not affect lookup.
///
/// # Example
/// ```rust
/// use scanline::mode_store::ModeStore;
/// use scanline_core::prelude::*;
///
/// let mut store = ModeStore::new();
/// let bus = StatusBus::new();
/// let defaults = (ColorParams::default(), GeometryParams::default());
/// store.upsert(Resolution::new(640, 480, 32), None, None, defaults, &bus);
/// assert_eq!(store.modes().len(), 1);
/// ```
#[derive(Default)]
pub struct ModeStore {
    modes: Vec<ModeParams>,
    aliases: Vec<ResolutionAlias>,
    current_is_aliased: bool,
}

impl ModeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or update the entry for `resolution`. A new entry starts from
    /// the supplied driver defaults and announces itself on the bus; only
    /// the provided parameter blocks overwrite existing values.
    pub fn upsert(
        &mut self,
        resolution: Resolution,
        color: Option<ColorParams>,
        geometry: Option<GeometryParams>,
        defaults: (ColorParams, GeometryParams),
        bus: &StatusBus,
    ) {
        let idx = match self.index_of(&resolution) {
            Some(idx) => idx,
            None => {
                self.modes.push(ModeParams {
                    resolution,
                    color: defaults.0,
                    geometry: defaults.1,
                });
                bus.publish(&StatusEvent::NewKnownMode(resolution));
                self.modes.len() - 1
            }
        };
        if let Some(color) = color {
            self.modes[idx].color = color;
        }
        if let Some(geometry) = geometry {
            self.modes[idx].geometry = geometry;
        }
    }

    /// The stored entry for `resolution`, or a fresh default entry that is
    /// not inserted.
    pub fn params_for(
        &self,
        resolution: Resolution,
        defaults: (ColorParams, GeometryParams),
    ) -> ModeParams {
        match self.index_of(&resolution) {
            Some(idx) => self.modes[idx],
            None => {
                info!(%resolution, "unknown video mode; returning default parameters");
                ModeParams {
                    resolution,
                    color: defaults.0,
                    geometry: defaults.1,
                }
            }
        }
    }

    /// Replace the whole known-mode list (used by the loader). Entries are
    /// sorted for display and re-announced on the bus.
    pub fn replace_modes(&mut self, mut modes: Vec<ModeParams>, bus: &StatusBus) {
        modes.sort_by_key(|m| m.resolution.pixel_count());
        self.modes = modes;
        bus.publish(&StatusEvent::ClearKnownModes);
        for mode in &self.modes {
            bus.publish(&StatusEvent::NewKnownMode(mode.resolution));
        }
    }

    pub fn modes(&self) -> &[ModeParams] {
        &self.modes
    }

    /// The alias target for `from`, if one is defined.
    pub fn resolve_alias(&self, from: Resolution) -> Option<Resolution> {
        self.aliases.iter().find(|a| a.matches(&from)).map(|a| a.to)
    }

    /// Replace the alias set atomically. Duplicate `from` keys collapse to
    /// the last occurrence; the survivors are sorted by target pixel count
    /// for display and re-announced on the bus.
    pub fn set_aliases(&mut self, list: Vec<ResolutionAlias>, bus: &StatusBus) {
        let mut deduped: Vec<ResolutionAlias> = Vec::with_capacity(list.len());
        for alias in list {
            if let Some(existing) = deduped.iter_mut().find(|a| a.from.same_extent(&alias.from)) {
                *existing = alias;
            } else {
                deduped.push(alias);
            }
        }
        deduped.sort_by_key(|a| a.to.pixel_count());
        self.aliases = deduped;

        debug!(count = self.aliases.len(), "broadcasting alias set");
        bus.publish(&StatusEvent::ClearKnownAliases);
        for alias in &self.aliases {
            bus.publish(&StatusEvent::NewKnownAlias(*alias));
        }
    }

    pub fn aliases(&self) -> &[ResolutionAlias] {
        &self.aliases
    }

    /// Whether the current capture resolution was reached via an alias.
    pub fn is_current_aliased(&self) -> bool {
        self.current_is_aliased
    }

    pub fn set_current_aliased(&mut self, aliased: bool) {
        self.current_is_aliased = aliased;
    }

    fn index_of(&self, resolution: &Resolution) -> Option<usize> {
        self.modes
            .iter()
            .position(|m| m.resolution.same_extent(resolution))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> (ColorParams, GeometryParams) {
        (ColorParams::default(), GeometryParams::default())
    }

    fn alias(fw: u32, fh: u32, tw: u32, th: u32) -> ResolutionAlias {
        ResolutionAlias {
            from: Resolution::new(fw, fh, 0),
            to: Resolution::new(tw, th, 0),
        }
    }

    #[test]
    fn upsert_creates_once_and_updates_in_place() {
        let mut store = ModeStore::new();
        let bus = StatusBus::new();
        let r = Resolution::new(800, 600, 32);

        store.upsert(r, None, None, defaults(), &bus);
        assert_eq!(store.modes().len(), 1);

        let color = ColorParams { bright: 9, ..ColorParams::default() };
        store.upsert(r, Some(color), None, defaults(), &bus);
        assert_eq!(store.modes().len(), 1);
        assert_eq!(store.params_for(r, defaults()).color.bright, 9);
        // Geometry was left alone.
        assert_eq!(store.params_for(r, defaults()).geometry, GeometryParams::default());
    }

    #[test]
    fn params_for_unknown_mode_is_not_inserted() {
        let store = ModeStore::new();
        let got = store.params_for(Resolution::new(320, 200, 16), defaults());
        assert_eq!(got.resolution.w, 320);
        assert!(store.modes().is_empty());
    }

    #[test]
    fn duplicate_alias_from_keys_last_write_wins() {
        let mut store = ModeStore::new();
        let bus = StatusBus::new();
        store.set_aliases(
            vec![
                alias(800, 600, 1024, 768),
                alias(800, 600, 1280, 960),
            ],
            &bus,
        );
        assert_eq!(store.aliases().len(), 1);
        assert_eq!(
            store.resolve_alias(Resolution::new(800, 600, 32)),
            Some(Resolution::new(1280, 960, 0))
        );
    }

    #[test]
    fn set_aliases_twice_is_idempotent() {
        let mut store = ModeStore::new();
        let bus = StatusBus::new();
        let list = vec![alias(640, 400, 1280, 800), alias(800, 600, 1024, 768)];
        store.set_aliases(list.clone(), &bus);
        let first = store.aliases().to_vec();
        store.set_aliases(list, &bus);
        assert_eq!(store.aliases(), &first[..]);
    }

    #[test]
    fn aliases_sort_by_target_pixel_count() {
        let mut store = ModeStore::new();
        let bus = StatusBus::new();
        store.set_aliases(
            vec![alias(1, 1, 1920, 1080), alias(2, 2, 640, 480)],
            &bus,
        );
        assert_eq!(store.aliases()[0].to.w, 640);
    }
}
