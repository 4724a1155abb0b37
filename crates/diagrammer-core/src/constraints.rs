//! Movement constraints: page bounds, grid snapping and collision rejection.

use crate::config::{EngineConfig, DEFAULT_GRID_SPACING};
use crate::error::{DiagramError, DiagramResult};
use crate::graph::GraphModel;
use crate::shapes::ElementId;
use kurbo::{Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Round a point to the nearest grid intersection, per axis.
pub fn snap_to_grid(point: Point, grid_size: f64) -> Point {
    if grid_size <= 0.0 || !grid_size.is_finite() {
        return point;
    }
    Point::new(
        (point.x / grid_size).round() * grid_size,
        (point.y / grid_size).round() * grid_size,
    )
}

/// Grid snapping switch and spacing.
///
/// Changing grid settings never touches the document, the viewport or the
/// selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSettings {
    enabled: bool,
    spacing: f64,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            spacing: DEFAULT_GRID_SPACING,
        }
    }
}

impl GridSettings {
    pub fn new(enabled: bool, spacing: f64) -> Self {
        let spacing = if spacing.is_finite() && spacing > 0.0 {
            spacing
        } else {
            DEFAULT_GRID_SPACING
        };
        Self { enabled, spacing }
    }

    pub fn enable(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Set the spacing; must be finite and positive.
    pub fn set_spacing(&mut self, spacing: f64) -> DiagramResult<()> {
        if !spacing.is_finite() || spacing <= 0.0 {
            return Err(DiagramError::Validation(format!(
                "grid spacing must be positive, got {spacing}"
            )));
        }
        self.spacing = spacing;
        Ok(())
    }

    /// Flip the switch, returning the new state.
    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        self.enabled
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Grid spacing in document units.
    pub fn size(&self) -> f64 {
        self.spacing
    }

    /// Snap `point` if the grid is enabled.
    pub fn apply(&self, point: Point) -> Point {
        if self.enabled {
            snap_to_grid(point, self.spacing)
        } else {
            point
        }
    }
}

/// Two boxes intersect unless one lies entirely to one side of the other.
/// Shared edges do not count as overlap.
pub fn boxes_overlap(a: Rect, b: Rect) -> bool {
    !(a.x1 <= b.x0 || b.x1 <= a.x0 || a.y1 <= b.y0 || b.y1 <= a.y0)
}

/// Page geometry and collision switch for element moves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementConstraints {
    pub page: Size,
    pub padding: f64,
    pub collision_detection: bool,
}

impl Default for MovementConstraints {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for MovementConstraints {
    fn from(config: &EngineConfig) -> Self {
        Self {
            page: Size::new(config.page_width, config.page_height),
            padding: config.page_padding,
            collision_detection: config.collision_detection,
        }
    }
}

impl MovementConstraints {
    /// Clamp a top-left position so the whole box stays within the padded
    /// page. When the box is wider than the page the left/top bound wins.
    pub fn clamp_to_page(&self, position: Point, size: Size) -> Point {
        let min = -self.padding;
        let max_x = self.page.width + self.padding - size.width;
        let max_y = self.page.height + self.padding - size.height;
        Point::new(position.x.min(max_x).max(min), position.y.min(max_y).max(min))
    }

    /// A clamped and snapped move of `id`, before collision.
    fn propose(
        &self,
        graph: &GraphModel,
        grid: &GridSettings,
        id: &str,
        delta: Vec2,
    ) -> DiagramResult<Proposal> {
        let element = graph
            .element(id)
            .ok_or_else(|| DiagramError::NotFound(id.to_string()))?;
        if !delta.x.is_finite() || !delta.y.is_finite() {
            return Err(DiagramError::Validation("move delta must be finite".into()));
        }

        let candidate = element.position + delta;
        let clamped = self.clamp_to_page(candidate, element.size);
        let snapped = grid.apply(clamped);

        let mut group = vec![element.id.clone()];
        group.extend(graph.embedded_children(id, true));
        let mut ignored: HashSet<ElementId> = group.iter().cloned().collect();
        ignored.extend(graph.ancestors(id));

        Ok(Proposal {
            id: element.id.clone(),
            delta: snapped - element.position,
            group,
            ignored,
        })
    }

    /// Whether any box of `proposal`'s group, moved, lands on an element
    /// that stays put. Elements carried by an accepted move are skipped.
    fn collides(&self, graph: &GraphModel, proposal: &Proposal, carried: &HashSet<&str>) -> bool {
        proposal
            .group
            .iter()
            .filter_map(|id| graph.element(id))
            .any(|element| {
                let moved = element.bounds() + proposal.delta;
                graph
                    .elements()
                    .filter(|other| !proposal.ignored.contains(&other.id))
                    .filter(|other| !carried.contains(other.id.as_str()))
                    .any(|other| boxes_overlap(moved, other.bounds()))
            })
    }

    /// Zero out every proposal that collides. A rejected move leaves its
    /// group where it is, so the remaining moves are checked again until
    /// nothing changes.
    fn resolve_collisions(&self, graph: &GraphModel, proposals: &mut [Proposal]) {
        if !self.collision_detection {
            return;
        }
        let mut accepted: Vec<bool> = proposals.iter().map(|p| p.delta != Vec2::ZERO).collect();
        loop {
            let carried: HashSet<&str> = proposals
                .iter()
                .zip(&accepted)
                .filter(|(_, accepted)| **accepted)
                .flat_map(|(p, _)| p.group.iter().map(String::as_str))
                .collect();
            let rejected: Vec<usize> = proposals
                .iter()
                .enumerate()
                .filter(|(i, p)| accepted[*i] && self.collides(graph, p, &carried))
                .map(|(i, _)| i)
                .collect();
            if rejected.is_empty() {
                break;
            }
            for i in rejected {
                log::debug!("Move of {} rejected: collision", proposals[i].id);
                accepted[i] = false;
            }
        }
        for (proposal, accepted) in proposals.iter_mut().zip(accepted) {
            if !accepted {
                proposal.delta = Vec2::ZERO;
            }
        }
    }

    /// Accepted displacement for moving `id` by `delta`.
    ///
    /// Returns `Vec2::ZERO` when the move is rejected by collision. Elements
    /// embedded in `id` travel with it and are checked too.
    pub fn constrain(
        &self,
        graph: &GraphModel,
        grid: &GridSettings,
        id: &str,
        delta: Vec2,
    ) -> DiagramResult<Vec2> {
        let mut proposals = [self.propose(graph, grid, id, delta)?];
        self.resolve_collisions(graph, &mut proposals);
        Ok(proposals[0].delta)
    }

    /// Accepted displacements for moving each of `ids` by the same `delta`.
    ///
    /// Movers do not block each other while they all move. A mover that is
    /// rejected stays behind as an obstacle for the rest. Unknown ids are
    /// skipped.
    pub fn constrain_batch(
        &self,
        graph: &GraphModel,
        grid: &GridSettings,
        ids: &[ElementId],
        delta: Vec2,
    ) -> Vec<(ElementId, Vec2)> {
        let moves: Vec<(ElementId, Vec2)> = ids.iter().map(|id| (id.clone(), delta)).collect();
        self.constrain_moves(graph, grid, &moves)
    }

    /// Like [`MovementConstraints::constrain_batch`] with a separate
    /// proposed delta per element.
    pub fn constrain_moves(
        &self,
        graph: &GraphModel,
        grid: &GridSettings,
        moves: &[(ElementId, Vec2)],
    ) -> Vec<(ElementId, Vec2)> {
        let mut proposals: Vec<Proposal> = moves
            .iter()
            .filter_map(|(id, delta)| self.propose(graph, grid, id, *delta).ok())
            .collect();
        self.resolve_collisions(graph, &mut proposals);
        proposals.into_iter().map(|p| (p.id, p.delta)).collect()
    }
}

/// One element's pending move.
#[derive(Debug)]
struct Proposal {
    id: ElementId,
    delta: Vec2,
    /// The element and everything embedded in it.
    group: Vec<ElementId>,
    /// `group` plus the element's ancestors, which it may always overlap.
    ignored: HashSet<ElementId>,
}
