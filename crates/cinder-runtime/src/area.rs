//! Visibility areas and per-frame visible sets

use cinder_core::{Bounds3, Frustum};

/// Groups let one spatial index serve several client systems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AreaGroup {
    ParticleEffect,
}

pub type AreaId = u32;

/// Spatial index owned by the visibility collaborator
pub trait AreaIndex {
    fn add_box_area(&mut self, group: AreaGroup, user_id: u32, bounds: Bounds3) -> AreaId;
    fn update_box_area(&mut self, area: AreaId, bounds: Bounds3);
    fn remove_box_area(&mut self, area: AreaId);
}

/// Ids eligible for simulation (`active`) and rendering (`visible`) this frame
#[derive(Debug, Clone, Default)]
pub struct VisibleSets {
    pub active: Vec<u32>,
    pub visible: Vec<u32>,
}

impl VisibleSets {
    pub fn clear(&mut self) {
        self.active.clear();
        self.visible.clear();
    }
}

#[derive(Debug, Clone, Copy)]
struct FlatArea {
    group: AreaGroup,
    user_id: u32,
    bounds: Bounds3,
}

/// Brute-force area index: every registered area is active, and visible when
/// it intersects the camera frustum.
#[derive(Debug, Default)]
pub struct FlatAreaIndex {
    areas: Vec<Option<FlatArea>>,
    free_ids: Vec<AreaId>,
}

impl FlatAreaIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.areas.iter().filter(|a| a.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bounds(&self, area: AreaId) -> Option<Bounds3> {
        self.areas.get(area as usize).and_then(|a| a.map(|a| a.bounds))
    }

    /// Fill `out` for `group`. Without a frustum everything active is visible.
    pub fn collect(&self, group: AreaGroup, frustum: Option<&Frustum>, out: &mut VisibleSets) {
        out.clear();
        for area in self.areas.iter().flatten() {
            if area.group != group {
                continue;
            }
            out.active.push(area.user_id);
            if frustum.map_or(true, |f| f.intersects(&area.bounds)) {
                out.visible.push(area.user_id);
            }
        }
    }
}

impl AreaIndex for FlatAreaIndex {
    fn add_box_area(&mut self, group: AreaGroup, user_id: u32, bounds: Bounds3) -> AreaId {
        let area = Some(FlatArea { group, user_id, bounds });
        if let Some(id) = self.free_ids.pop() {
            self.areas[id as usize] = area;
            id
        } else {
            self.areas.push(area);
            (self.areas.len() - 1) as AreaId
        }
    }

    fn update_box_area(&mut self, area: AreaId, bounds: Bounds3) {
        if let Some(Some(a)) = self.areas.get_mut(area as usize) {
            a.bounds = bounds;
        }
    }

    fn remove_box_area(&mut self, area: AreaId) {
        if let Some(slot) = self.areas.get_mut(area as usize) {
            if slot.take().is_some() {
                self.free_ids.push(area);
            }
        }
    }
}
