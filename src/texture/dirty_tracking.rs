// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Fine-grained dirty tracking of GPU copies.

Each GPU variant of a sub-resource carries a [`DirtyRegions`] list. An absent list means the
whole resource is dirty; a present list names the only regions that differ from host memory,
so a sync can upload just those.

The list only grows while the GPU copy holds otherwise-valid data. Anything that makes the
native storage undefined (allocation, forced reload, whole invalidation) resets it to absent.
*/
use crate::coordinates::TexelBox;

/// Past this many regions the list collapses to their union.
const MAX_TRACKED_REGIONS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DirtyRegions(Option<Vec<TexelBox>>);

impl DirtyRegions {
    /// Everything is dirty.
    pub(crate) fn whole() -> Self {
        DirtyRegions(None)
    }

    pub(crate) fn is_whole(&self) -> bool {
        self.0.is_none()
    }

    pub(crate) fn mark_whole(&mut self) {
        self.0 = None;
    }

    /// Nothing is dirty.
    pub(crate) fn mark_clean(&mut self) {
        match &mut self.0 {
            Some(regions) => regions.clear(),
            None => self.0 = Some(Vec::new()),
        }
    }

    /// Records a write to `region`. A whole-dirty list stays whole.
    pub(crate) fn add(&mut self, region: TexelBox) {
        let Some(regions) = &mut self.0 else {
            return;
        };
        if regions.iter().any(|r| r.contains(&region)) {
            return;
        }
        regions.retain(|r| !region.contains(r));
        if regions.len() == MAX_TRACKED_REGIONS {
            let union = regions.iter().fold(region, |acc, r| acc.union(r));
            regions.clear();
            regions.push(union);
        } else {
            regions.push(region);
        }
    }

    /// The dirty regions, or `None` when the whole resource is dirty.
    pub(crate) fn regions(&self) -> Option<&[TexelBox]> {
        self.0.as_deref()
    }
}

impl Default for DirtyRegions {
    fn default() -> Self {
        DirtyRegions::whole()
    }
}
