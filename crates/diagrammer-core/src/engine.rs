//! Diagram engine: the public facade composing the document, viewport,
//! gestures, constraints, history, selection, persistence and events.
//!
//! Every document mutation captures a history snapshot first, so the
//! pre-mutation state is always recoverable with [`DiagramEngine::undo`].
//! Time-driven work (smooth transitions, the press-and-hold timer and the
//! trailing `viewport:changed` notification) runs from
//! [`DiagramEngine::tick`], which the host calls whenever the scheduler
//! asked for a frame or a wakeup.

use crate::config::EngineConfig;
use crate::constraints::{GridSettings, MovementConstraints};
use crate::error::{DiagramError, DiagramResult};
use crate::events::{DiagramEvent, ElementMove, EventBus, EventType, Listener};
use crate::gesture::{GestureConfig, GestureIntent, GestureRecognizer};
use crate::graph::{DocumentData, GraphModel, PatchOutcome};
use crate::history::{History, Snapshotable};
use crate::input::PointerEvent;
use crate::scheduler::{FrameScheduler, SystemScheduler};
use crate::selection::Selection;
use crate::shapes::{
    Element, ElementConfig, ElementId, ElementPatch, Endpoint, Link, LinkConfig, LinkEnd, LinkId,
    ShapeRegistry,
};
use crate::storage::{DocumentRecord, MemoryStorage, Storage};
use crate::viewport::{ChangeThrottle, ViewState, ViewportController};
use kurbo::{Point, Size, Vec2};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

/// Elements being dragged and where they started.
#[derive(Debug, Clone)]
struct DragSession {
    origins: Vec<(ElementId, Point)>,
    /// Document before the drag; recorded on the first accepted move.
    before: Option<DocumentData>,
}

impl DragSession {
    fn ids(&self) -> Vec<ElementId> {
        self.origins.iter().map(|(id, _)| id.clone()).collect()
    }
}

/// The diagram engine.
pub struct DiagramEngine {
    config: EngineConfig,
    graph: GraphModel,
    history: History<DocumentData>,
    viewport: ViewportController,
    throttle: ChangeThrottle,
    gestures: GestureRecognizer,
    constraints: MovementConstraints,
    grid: GridSettings,
    selection: Selection,
    events: EventBus,
    scheduler: Rc<dyn FrameScheduler>,
    storage: Box<dyn Storage>,
    drag: Option<DragSession>,
    destroyed: bool,
}

impl Default for DiagramEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default(), Arc::new(ShapeRegistry::with_defaults()))
    }
}

impl DiagramEngine {
    /// Engine with in-memory storage and the system clock.
    pub fn new(config: EngineConfig, registry: Arc<ShapeRegistry>) -> Self {
        Self {
            graph: GraphModel::new(registry),
            history: History::new(config.history_depth),
            viewport: ViewportController::new(&config),
            throttle: ChangeThrottle::new(config.viewport_throttle_ms),
            gestures: GestureRecognizer::new(GestureConfig::from(&config)),
            constraints: MovementConstraints::from(&config),
            grid: GridSettings::new(config.grid_enabled, config.grid_spacing),
            selection: Selection::new(),
            events: EventBus::new(),
            scheduler: Rc::new(SystemScheduler::new()),
            storage: Box::new(MemoryStorage::new()),
            drag: None,
            destroyed: false,
            config,
        }
    }

    /// Replace the persistence backend.
    pub fn with_storage(mut self, storage: impl Storage + 'static) -> Self {
        self.storage = Box::new(storage);
        self
    }

    /// Replace the clock and frame scheduler.
    pub fn with_scheduler(mut self, scheduler: Rc<dyn FrameScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // --- lifecycle ---

    /// Bind the engine to a capture surface of the given client size.
    pub fn attach(&mut self, surface: Size) {
        self.destroyed = false;
        self.viewport.attach(surface);
    }

    /// The capture surface changed size.
    pub fn resize(&mut self, surface: Size) {
        self.viewport.resize(surface);
    }

    pub fn is_attached(&self) -> bool {
        self.viewport.is_attached()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Tear down: drop subscribers, then timers and animations, then the
    /// document.
    pub fn destroy(&mut self) {
        self.events.clear();

        self.scheduler.cancel_all();
        self.viewport.cancel_animation();
        self.throttle.reset();
        self.gestures.reset();
        self.drag = None;

        self.graph.clear();
        self.history.clear();
        self.selection.clear();
        self.viewport.detach();
        self.destroyed = true;
        log::debug!("Engine destroyed");
    }

    // --- events ---

    pub fn add_event_listener(&mut self, event_type: EventType, listener: Listener) {
        self.events.add_event_listener(event_type, listener);
    }

    /// Returns true if `listener` was registered for `event_type`.
    pub fn remove_event_listener(&mut self, event_type: EventType, listener: &Listener) -> bool {
        self.events.remove_event_listener(event_type, listener)
    }

    /// Subscribe a closure, returning the handle needed to unsubscribe.
    pub fn on(&mut self, event_type: EventType, callback: impl Fn(&DiagramEvent) + 'static) -> Listener {
        let listener: Listener = Rc::new(callback);
        self.events.add_event_listener(event_type, listener.clone());
        listener
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn emit(&self, event: DiagramEvent) {
        self.events.emit(event);
    }

    // --- document access ---

    pub fn graph(&self) -> &GraphModel {
        &self.graph
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.graph.element(id)
    }

    pub fn link(&self, id: &str) -> Option<&Link> {
        self.graph.link(id)
    }

    pub fn element_count(&self) -> usize {
        self.graph.element_count()
    }

    pub fn link_count(&self) -> usize {
        self.graph.link_count()
    }

    /// Run `mutate` on the document and, if it succeeds and the document
    /// actually changed, record the pre-mutation snapshot.
    fn record<T>(&mut self, mutate: impl FnOnce(&mut GraphModel) -> DiagramResult<T>) -> DiagramResult<T> {
        let before = self.graph.snapshot();
        let result = mutate(&mut self.graph)?;
        if self.graph.snapshot() != before {
            self.history.push_snapshot(before);
        }
        Ok(result)
    }

    // --- CRUD ---

    pub fn add_element(&mut self, config: ElementConfig) -> DiagramResult<ElementId> {
        let id = self.record(|graph| graph.add_element(config))?;
        if let Some(element) = self.graph.element(&id) {
            self.emit(DiagramEvent::ElementAdded {
                element: element.clone(),
            });
        }
        Ok(id)
    }

    /// Add a link; emits `link:added` then `link:connected` for each end.
    pub fn add_link(&mut self, config: LinkConfig) -> DiagramResult<LinkId> {
        let id = self.record(|graph| graph.add_link(config))?;
        self.emit(DiagramEvent::LinkAdded { id: id.clone() });
        if let Some(link) = self.graph.link(&id) {
            for end in [LinkEnd::Source, LinkEnd::Target] {
                self.emit(DiagramEvent::LinkConnected {
                    id: id.clone(),
                    end,
                    element: link.endpoint(end).id.clone(),
                });
            }
        }
        Ok(id)
    }

    /// Remove an element and every link attached to it.
    pub fn remove_element(&mut self, id: &str) -> DiagramResult<()> {
        let removed = self.record(|graph| graph.remove_element(id))?;
        for link in &removed.links {
            self.emit(DiagramEvent::LinkRemoved { id: link.id.clone() });
        }
        self.emit(DiagramEvent::ElementRemoved { id: id.to_string() });
        for child in removed.detached_children {
            self.emit(DiagramEvent::ElementChanged { id: child });
        }
        self.prune_selection();
        Ok(())
    }

    pub fn remove_link(&mut self, id: &str) -> DiagramResult<()> {
        self.record(|graph| graph.remove_link(id))?;
        self.emit(DiagramEvent::LinkRemoved { id: id.to_string() });
        Ok(())
    }

    /// Empty the document.
    pub fn clear(&mut self) {
        if self.graph.is_empty() {
            return;
        }
        let before = self.graph.snapshot();
        self.graph.clear();
        self.emit_diff(&before, &DocumentData::default());
        self.history.push_snapshot(before);
        self.prune_selection();
    }

    // --- movement ---

    /// Drop ids whose ancestor is also listed: they ride along with it.
    fn top_level(&self, ids: &[ElementId]) -> Vec<ElementId> {
        ids.iter()
            .filter(|id| self.graph.contains_element(id))
            .filter(|id| !self.graph.ancestors(id).iter().any(|a| ids.contains(a)))
            .cloned()
            .collect()
    }

    /// Translate each element and its embedded descendants.
    fn apply_moves(&mut self, accepted: &[(ElementId, Vec2)]) -> Vec<ElementMove> {
        let mut moves = Vec::new();
        for (id, delta) in accepted {
            if *delta == Vec2::ZERO {
                continue;
            }
            let mut affected = vec![id.clone()];
            affected.extend(self.graph.embedded_children(id, true));
            for element_id in affected {
                let Some(from) = self.graph.element(&element_id).map(|e| e.position) else {
                    continue;
                };
                if self.graph.translate_element(&element_id, *delta).is_ok() {
                    moves.push(ElementMove {
                        id: element_id,
                        from,
                        to: from + *delta,
                    });
                }
            }
        }
        moves
    }

    /// Move an element by `(dx, dy)` in document units, subject to page
    /// bounds, grid snapping and collision. Returns the accepted
    /// displacement, which may be zero.
    pub fn move_element(&mut self, id: &str, dx: f64, dy: f64) -> DiagramResult<Vec2> {
        if !self.graph.contains_element(id) {
            return Err(DiagramError::NotFound(id.to_string()));
        }
        let delta = Vec2::new(dx, dy);
        if delta == Vec2::ZERO {
            return Ok(Vec2::ZERO);
        }
        let accepted = self.constraints.constrain(&self.graph, &self.grid, id, delta)?;
        if accepted == Vec2::ZERO {
            return Ok(Vec2::ZERO);
        }

        self.history.push(&self.graph);
        let moves = self.apply_moves(&[(id.to_string(), accepted)]);
        self.emit(DiagramEvent::ElementMoved { moves });
        Ok(accepted)
    }

    /// Move every selected element by the same delta. Each element is
    /// clamped and snapped on its own; a mover rejected by collision stays
    /// in place and blocks the others. All accepted moves commit together
    /// under one history entry and one `element:moved` notification.
    pub fn move_selected_elements(&mut self, dx: f64, dy: f64) -> DiagramResult<Vec<ElementMove>> {
        let delta = Vec2::new(dx, dy);
        if !delta.x.is_finite() || !delta.y.is_finite() {
            return Err(DiagramError::Validation("move delta must be finite".into()));
        }
        if delta == Vec2::ZERO || self.selection.is_empty() {
            return Ok(Vec::new());
        }
        let ids = self.top_level(self.selection.ids());
        let accepted: Vec<(ElementId, Vec2)> = self
            .constraints
            .constrain_batch(&self.graph, &self.grid, &ids, delta)
            .into_iter()
            .filter(|(_, d)| *d != Vec2::ZERO)
            .collect();
        if accepted.is_empty() {
            return Ok(Vec::new());
        }

        self.history.push(&self.graph);
        let moves = self.apply_moves(&accepted);
        self.emit(DiagramEvent::ElementMoved { moves: moves.clone() });
        Ok(moves)
    }

    /// Patch geometry and/or properties of an element.
    ///
    /// Direct geometry patches bypass movement constraints. Embedded
    /// descendants follow a position change.
    pub fn update_shape(&mut self, id: &str, patch: ElementPatch) -> DiagramResult<PatchOutcome> {
        let Some(from) = self.graph.element(id).map(|e| e.position) else {
            return Err(DiagramError::NotFound(id.to_string()));
        };
        if patch.is_empty() {
            return Ok(PatchOutcome::default());
        }

        let before = self.graph.snapshot();
        let outcome = self.graph.apply_patch(id, &patch)?;
        if !outcome.any() {
            return Ok(outcome);
        }
        self.history.push_snapshot(before);

        if outcome.moved {
            let to = self.graph.element(id).map_or(from, |e| e.position);
            let delta = to - from;
            let mut moves = vec![ElementMove {
                id: id.to_string(),
                from,
                to,
            }];
            for child in self.graph.embedded_children(id, true) {
                let Some(child_from) = self.graph.element(&child).map(|e| e.position) else {
                    continue;
                };
                if self.graph.translate_element(&child, delta).is_ok() {
                    moves.push(ElementMove {
                        id: child,
                        from: child_from,
                        to: child_from + delta,
                    });
                }
            }
            self.emit(DiagramEvent::ElementMoved { moves });
        }
        if outcome.resized {
            if let Some(element) = self.graph.element(id) {
                self.emit(DiagramEvent::ElementResized {
                    id: id.to_string(),
                    size: element.size,
                });
            }
        }
        self.emit(DiagramEvent::ElementChanged { id: id.to_string() });
        Ok(outcome)
    }

    pub fn bring_to_front(&mut self, id: &str) -> DiagramResult<()> {
        self.record(|graph| graph.bring_to_front(id))?;
        self.emit(DiagramEvent::ElementChanged { id: id.to_string() });
        Ok(())
    }

    pub fn send_to_back(&mut self, id: &str) -> DiagramResult<()> {
        self.record(|graph| graph.send_to_back(id))?;
        self.emit(DiagramEvent::ElementChanged { id: id.to_string() });
        Ok(())
    }

    // --- embedding ---

    pub fn embed(&mut self, parent: &str, child: &str) -> DiagramResult<()> {
        self.record(|graph| graph.embed(parent, child))?;
        self.emit(DiagramEvent::ElementChanged { id: child.to_string() });
        Ok(())
    }

    /// Detach `child` from its parent, returning the former parent.
    pub fn unembed(&mut self, child: &str) -> DiagramResult<Option<ElementId>> {
        if self.graph.element(child).is_some_and(|e| e.parent.is_none()) {
            return Ok(None);
        }
        let parent = self.record(|graph| graph.unembed(child))?;
        self.emit(DiagramEvent::ElementChanged { id: child.to_string() });
        Ok(parent)
    }

    // --- links ---

    pub fn insert_link_vertex(&mut self, link: &str, index: usize, point: Point) -> DiagramResult<()> {
        self.record(|graph| graph.insert_vertex(link, index, point))?;
        self.emit(DiagramEvent::LinkChanged { id: link.to_string() });
        Ok(())
    }

    pub fn update_link_vertex(&mut self, link: &str, index: usize, point: Point) -> DiagramResult<()> {
        self.record(|graph| graph.update_vertex(link, index, point))?;
        self.emit(DiagramEvent::LinkChanged { id: link.to_string() });
        Ok(())
    }

    pub fn remove_link_vertex(&mut self, link: &str, index: usize) -> DiagramResult<Point> {
        let point = self.record(|graph| graph.remove_vertex(link, index))?;
        self.emit(DiagramEvent::LinkChanged { id: link.to_string() });
        Ok(point)
    }

    /// Point one end of a link at another element (or port).
    pub fn reconnect_link(&mut self, link: &str, end: LinkEnd, endpoint: Endpoint) -> DiagramResult<()> {
        let element = endpoint.id.clone();
        let old = self.record(|graph| graph.reconnect(link, end, endpoint))?;
        self.emit(DiagramEvent::LinkDisconnected {
            id: link.to_string(),
            end,
            element: old.id,
        });
        self.emit(DiagramEvent::LinkConnected {
            id: link.to_string(),
            end,
            element,
        });
        self.emit(DiagramEvent::LinkChanged { id: link.to_string() });
        Ok(())
    }

    // --- selection ---

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selected_ids(&self) -> Vec<ElementId> {
        self.selection.ids().to_vec()
    }

    fn emit_selection(&self) {
        if self.selection.is_empty() {
            self.emit(DiagramEvent::SelectionCleared);
        } else {
            self.emit(DiagramEvent::SelectionChanged {
                ids: self.selected_ids(),
            });
        }
    }

    /// Select a single element, replacing the selection.
    pub fn select(&mut self, id: &str) -> DiagramResult<()> {
        if !self.graph.contains_element(id) {
            return Err(DiagramError::NotFound(id.to_string()));
        }
        let changed = self.selection.select(id);
        self.emit(DiagramEvent::ElementSelected { id: id.to_string() });
        if changed {
            self.emit_selection();
        }
        Ok(())
    }

    /// Replace the selection; unknown ids are ignored.
    pub fn set_selection(&mut self, ids: impl IntoIterator<Item = ElementId>) {
        let ids: Vec<ElementId> = ids
            .into_iter()
            .filter(|id| self.graph.contains_element(id))
            .collect();
        if self.selection.set(ids) {
            self.emit_selection();
        }
    }

    /// Add an element to the selection.
    pub fn add_to_selection(&mut self, id: &str) -> DiagramResult<()> {
        if !self.graph.contains_element(id) {
            return Err(DiagramError::NotFound(id.to_string()));
        }
        if self.selection.add(id) {
            self.emit(DiagramEvent::ElementSelected { id: id.to_string() });
            self.emit_selection();
        }
        Ok(())
    }

    pub fn deselect(&mut self, id: &str) {
        if self.selection.deselect(id) {
            self.emit_selection();
        }
    }

    pub fn clear_selection(&mut self) {
        if self.selection.clear() {
            self.emit(DiagramEvent::SelectionCleared);
        }
    }

    fn prune_selection(&mut self) {
        let graph = &self.graph;
        if self.selection.retain_existing(|id| graph.contains_element(id)) {
            self.emit_selection();
        }
    }

    // --- grid & constraints ---

    pub fn grid(&self) -> &GridSettings {
        &self.grid
    }

    /// Grid controls. Never touches the document, viewport or selection.
    pub fn grid_mut(&mut self) -> &mut GridSettings {
        &mut self.grid
    }

    pub fn constraints(&self) -> &MovementConstraints {
        &self.constraints
    }

    pub fn set_collision_detection(&mut self, enabled: bool) {
        self.constraints.collision_detection = enabled;
    }

    // --- viewport ---

    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    pub fn view_state(&self) -> ViewState {
        self.viewport.state()
    }

    pub fn get_zoom(&self) -> f64 {
        self.viewport.zoom()
    }

    pub fn get_pan(&self) -> Vec2 {
        self.viewport.translate()
    }

    /// Client point to document coordinates.
    pub fn to_local(&self, client: Point) -> Point {
        self.viewport.to_local(client)
    }

    /// Document point to client coordinates.
    pub fn to_client(&self, local: Point) -> Point {
        self.viewport.to_client(local)
    }

    fn after_view_change(&mut self, changed: bool) {
        if !changed {
            return;
        }
        if self.viewport.is_animating() {
            self.scheduler.request_frame();
        } else {
            self.notify_viewport();
        }
    }

    fn notify_viewport(&mut self) {
        let now = self.scheduler.now();
        if self.throttle.record(now) {
            self.emit_viewport();
        } else if let Some(at) = self.throttle.next_flush() {
            self.scheduler.request_wakeup(at);
        }
    }

    fn emit_viewport(&self) {
        self.emit(DiagramEvent::ViewportChanged {
            zoom: self.viewport.zoom(),
            pan: self.viewport.translate(),
        });
    }

    /// Zoom in by `step` (defaults to the configured zoom step).
    pub fn zoom_in(&mut self, step: Option<f64>, smooth: bool) {
        let step = step.unwrap_or(self.config.zoom_step);
        let now = self.scheduler.now();
        let changed = self.viewport.zoom_in(step, smooth, now);
        self.after_view_change(changed);
    }

    /// Zoom out by the factor `step` (the zoom is multiplied by it).
    /// Defaults to the inverse of the configured zoom step.
    pub fn zoom_out(&mut self, step: Option<f64>, smooth: bool) {
        let step = step.unwrap_or(1.0 / self.config.zoom_step);
        let now = self.scheduler.now();
        let changed = self.viewport.zoom_out(step, smooth, now);
        self.after_view_change(changed);
    }

    pub fn set_zoom(&mut self, zoom: f64, smooth: bool) {
        let now = self.scheduler.now();
        let changed = self.viewport.set_zoom(zoom, smooth, now);
        self.after_view_change(changed);
    }

    /// Translate the view by a client-space delta.
    pub fn pan(&mut self, dx: f64, dy: f64) {
        let changed = self.viewport.pan(Vec2::new(dx, dy));
        self.after_view_change(changed);
    }

    /// Move the view translation to `(x, y)`.
    pub fn pan_to(&mut self, x: f64, y: f64, smooth: bool) {
        let now = self.scheduler.now();
        let changed = self.viewport.pan_to(x, y, smooth, now);
        self.after_view_change(changed);
    }

    /// Fit every element into the surface. No-op for an empty document.
    pub fn zoom_to_fit(&mut self, padding: f64, smooth: bool) {
        let now = self.scheduler.now();
        let changed = self.viewport.zoom_to_fit(self.graph.bounds(), padding, smooth, now);
        self.after_view_change(changed);
    }

    /// Fit the selected elements; falls back to [`DiagramEngine::zoom_to_fit`]
    /// when nothing is selected.
    pub fn zoom_to_selection(&mut self, padding: f64, smooth: bool) {
        let Some(bounds) = self.graph.bounds_of(self.selection.ids()) else {
            self.zoom_to_fit(padding, smooth);
            return;
        };
        let now = self.scheduler.now();
        let changed = self.viewport.zoom_to_fit(Some(bounds), padding, smooth, now);
        self.after_view_change(changed);
    }

    // --- history ---

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Returns true if a change was undone.
    pub fn undo(&mut self) -> bool {
        let before = self.graph.snapshot();
        if !self.history.undo(&mut self.graph) {
            return false;
        }
        let after = self.graph.snapshot();
        self.emit_diff(&before, &after);
        self.prune_selection();
        true
    }

    /// Returns true if a change was redone.
    pub fn redo(&mut self) -> bool {
        let before = self.graph.snapshot();
        if !self.history.redo(&mut self.graph) {
            return false;
        }
        let after = self.graph.snapshot();
        self.emit_diff(&before, &after);
        self.prune_selection();
        true
    }

    fn emit_diff(&self, before: &DocumentData, after: &DocumentData) {
        for event in diff_events(before, after) {
            self.emit(event);
        }
    }

    // --- data exchange ---

    pub fn get_diagram_data(&self) -> DocumentData {
        self.graph.serialize()
    }

    /// Replace the document. Links with a missing endpoint are skipped and
    /// their ids returned; any other failure leaves the document empty.
    pub fn load_diagram_data(&mut self, data: DocumentData) -> DiagramResult<Vec<LinkId>> {
        let before = self.graph.snapshot();
        let result = self.graph.deserialize(data);
        let after = self.graph.snapshot();
        if before != after {
            self.history.push_snapshot(before.clone());
            self.emit_diff(&before, &after);
        }
        self.prune_selection();
        result
    }

    pub fn export_to_json(&self, pretty: bool) -> DiagramResult<String> {
        self.graph
            .serialize()
            .to_json(pretty)
            .map_err(|e| DiagramError::Serialization(e.to_string()))
    }

    /// Parse and load a document. Malformed JSON leaves the current
    /// document untouched.
    pub fn import_from_json(&mut self, json: &str) -> DiagramResult<Vec<LinkId>> {
        let data = DocumentData::from_json(json)?;
        self.load_diagram_data(data)
    }

    // --- persistence ---

    /// Persist the current document under `id`.
    pub async fn save(&self, id: &str) -> DiagramResult<()> {
        let record = DocumentRecord::new(id, self.graph.serialize());
        self.storage.save(&record).await?;
        log::info!("Saved document {}", id);
        self.emit(DiagramEvent::DocumentSaved { id: id.to_string() });
        Ok(())
    }

    /// Replace the document with the one stored under `id`.
    pub async fn load(&mut self, id: &str) -> DiagramResult<()> {
        let record = self
            .storage
            .load(id)
            .await?
            .ok_or_else(|| DiagramError::NotFound(id.to_string()))?;
        let skipped = self.load_diagram_data(record.payload)?;
        if !skipped.is_empty() {
            log::warn!("Document {} loaded without {} dangling link(s)", id, skipped.len());
        }
        log::info!("Loaded document {}", id);
        self.emit(DiagramEvent::DocumentLoaded { id: id.to_string() });
        Ok(())
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    // --- input ---

    /// Feed a raw pointer event from the capture surface.
    pub fn handle_pointer_event(&mut self, event: PointerEvent) {
        if self.destroyed || !self.viewport.is_attached() {
            log::warn!("Ignoring pointer input: no attached surface");
            return;
        }
        let now = self.scheduler.now();
        let hit = match event {
            PointerEvent::Down { position, .. } => self.graph.element_at(self.viewport.to_local(position)),
            _ => None,
        };
        let intents = self
            .gestures
            .handle(&event, hit.as_deref(), self.viewport.state(), now);
        self.apply_intents(intents);
        self.schedule_timers();
    }

    /// Advance animations and timers. Call when the scheduler asked for a
    /// frame or a wakeup.
    pub fn tick(&mut self) {
        if self.destroyed {
            return;
        }
        let now = self.scheduler.now();

        let intents = self.gestures.poll(now);
        self.apply_intents(intents);

        if self.viewport.tick(now) {
            self.notify_viewport();
        }
        if self.viewport.is_animating() {
            self.scheduler.request_frame();
        }
        if self.throttle.flush(now) {
            self.emit_viewport();
        }
        self.schedule_timers();
    }

    fn schedule_timers(&self) {
        if let Some(at) = self.gestures.next_deadline() {
            self.scheduler.request_wakeup(at);
        }
        if let Some(at) = self.throttle.next_flush() {
            self.scheduler.request_wakeup(at);
        }
    }

    /// Current gesture state name, for diagnostics.
    pub fn gesture_state(&self) -> &'static str {
        self.gestures.state_name()
    }

    fn apply_intents(&mut self, intents: Vec<GestureIntent>) {
        for intent in intents {
            self.apply_intent(intent);
        }
    }

    fn apply_intent(&mut self, intent: GestureIntent) {
        match intent {
            GestureIntent::Select { id, additive } => self.pointer_select(id, additive),
            GestureIntent::DoubleClick { id } => {
                self.emit(DiagramEvent::ElementDoubleClick { id });
            }
            GestureIntent::CanvasClick { position } => {
                let position = self.viewport.to_local(position);
                self.emit(DiagramEvent::CanvasClicked { position });
                self.clear_selection();
            }
            GestureIntent::DragStart { id } => self.begin_drag(&id),
            GestureIntent::DragMove { offset, .. } => {
                if let Some(local) = self.drag_to(offset) {
                    if let Some(session) = &self.drag {
                        self.emit(DiagramEvent::ElementDragging {
                            ids: session.ids(),
                            offset: local,
                        });
                    }
                }
            }
            GestureIntent::DragEnd { offset, .. } => {
                let local = self.drag_to(offset);
                if let (Some(session), Some(local)) = (self.drag.take(), local) {
                    self.emit(DiagramEvent::ElementDragEnd {
                        ids: session.ids(),
                        offset: local,
                    });
                }
            }
            GestureIntent::Pan { delta } => {
                let changed = self.viewport.pan(delta);
                self.after_view_change(changed);
            }
            GestureIntent::ZoomAt { anchor, factor } => {
                let changed = self.viewport.zoom_at(anchor, factor);
                self.after_view_change(changed);
            }
            GestureIntent::SetView(view) => {
                let changed = self.viewport.set_view(view);
                self.after_view_change(changed);
            }
        }
    }

    fn pointer_select(&mut self, id: ElementId, additive: bool) {
        if additive {
            if self.selection.toggle(id.clone()) {
                self.emit(DiagramEvent::ElementSelected { id });
            }
            self.emit_selection();
            return;
        }
        // Pressing an already-selected element keeps the group for dragging.
        let changed = !self.selection.contains(&id) && self.selection.select(id.clone());
        self.emit(DiagramEvent::ElementSelected { id });
        if changed {
            self.emit_selection();
        }
    }

    fn begin_drag(&mut self, id: &str) {
        let candidates = if self.selection.contains(id) {
            self.selection.ids().to_vec()
        } else {
            vec![id.to_string()]
        };
        let origins: Vec<(ElementId, Point)> = self
            .top_level(&candidates)
            .into_iter()
            .filter_map(|id| self.graph.element(&id).map(|e| (id, e.position)))
            .collect();
        if origins.is_empty() {
            return;
        }
        log::debug!("Drag started with {} element(s)", origins.len());
        self.drag = Some(DragSession {
            origins,
            before: Some(self.graph.snapshot()),
        });
    }

    /// Move the dragged elements to their origins plus `offset` (client
    /// units). Returns the offset in document units.
    fn drag_to(&mut self, offset: Vec2) -> Option<Vec2> {
        let session = self.drag.as_ref()?;
        let local = offset / self.viewport.zoom();
        let proposals: Vec<(ElementId, Vec2)> = session
            .origins
            .iter()
            .filter_map(|(id, origin)| {
                self.graph
                    .element(id)
                    .map(|e| (id.clone(), (*origin + local) - e.position))
            })
            .collect();
        let accepted: Vec<(ElementId, Vec2)> = self
            .constraints
            .constrain_moves(&self.graph, &self.grid, &proposals)
            .into_iter()
            .filter(|(_, d)| *d != Vec2::ZERO)
            .collect();
        if !accepted.is_empty() {
            if let Some(before) = self.drag.as_mut().and_then(|s| s.before.take()) {
                self.history.push_snapshot(before);
            }
        }
        let moves = self.apply_moves(&accepted);
        if !moves.is_empty() {
            self.emit(DiagramEvent::ElementMoved { moves });
        }
        Some(local)
    }
}

/// Notifications describing how `after` differs from `before`.
///
/// Order: link removals, element removals, element additions, link
/// additions, then element moves/resizes/changes and link changes.
pub fn diff_events(before: &DocumentData, after: &DocumentData) -> Vec<DiagramEvent> {
    let old_elements: HashMap<&str, &Element> = before.elements.iter().map(|e| (e.id.as_str(), e)).collect();
    let new_elements: HashMap<&str, &Element> = after.elements.iter().map(|e| (e.id.as_str(), e)).collect();
    let old_links: HashMap<&str, &Link> = before.links.iter().map(|l| (l.id.as_str(), l)).collect();
    let new_links: HashMap<&str, &Link> = after.links.iter().map(|l| (l.id.as_str(), l)).collect();

    let mut events = Vec::new();

    for link in &before.links {
        if !new_links.contains_key(link.id.as_str()) {
            events.push(DiagramEvent::LinkRemoved { id: link.id.clone() });
        }
    }
    for element in &before.elements {
        if !new_elements.contains_key(element.id.as_str()) {
            events.push(DiagramEvent::ElementRemoved { id: element.id.clone() });
        }
    }
    for element in &after.elements {
        if !old_elements.contains_key(element.id.as_str()) {
            events.push(DiagramEvent::ElementAdded {
                element: element.clone(),
            });
        }
    }
    for link in &after.links {
        if !old_links.contains_key(link.id.as_str()) {
            events.push(DiagramEvent::LinkAdded { id: link.id.clone() });
        }
    }

    let mut moves = Vec::new();
    let mut changes = Vec::new();
    for element in &after.elements {
        let Some(old) = old_elements.get(element.id.as_str()) else {
            continue;
        };
        if *old == element {
            continue;
        }
        if old.position != element.position {
            moves.push(ElementMove {
                id: element.id.clone(),
                from: old.position,
                to: element.position,
            });
        }
        if old.size != element.size {
            changes.push(DiagramEvent::ElementResized {
                id: element.id.clone(),
                size: element.size,
            });
        }
        changes.push(DiagramEvent::ElementChanged { id: element.id.clone() });
    }
    if !moves.is_empty() {
        events.push(DiagramEvent::ElementMoved { moves });
    }
    events.extend(changes);

    for link in &after.links {
        if old_links.get(link.id.as_str()).is_some_and(|old| *old != link) {
            events.push(DiagramEvent::LinkChanged { id: link.id.clone() });
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{Modifiers, MouseButton};
    use crate::scheduler::ManualScheduler;
    use crate::storage::{block_on, StorageError, StorageResult};
    use std::cell::RefCell;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    struct Harness {
        engine: DiagramEngine,
        clock: ManualScheduler,
        log: Rc<RefCell<Vec<DiagramEvent>>>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_config(EngineConfig::default())
        }

        fn with_config(config: EngineConfig) -> Self {
            init_logger();
            let clock = ManualScheduler::new();
            let mut engine = DiagramEngine::new(config, Arc::new(ShapeRegistry::with_defaults()))
                .with_scheduler(Rc::new(clock.clone()));
            engine.attach(Size::new(800.0, 600.0));

            let log = Rc::new(RefCell::new(Vec::new()));
            for event_type in EventType::ALL {
                let sink = log.clone();
                engine.on(event_type, move |event| sink.borrow_mut().push(event.clone()));
            }
            Self { engine, clock, log }
        }

        fn rect(&mut self, id: &str, x: f64, y: f64, w: f64, h: f64) {
            self.engine
                .add_element(ElementConfig::new("rectangle").with_id(id).at(x, y).sized(w, h))
                .unwrap();
        }

        fn types(&self) -> Vec<EventType> {
            self.log.borrow().iter().map(DiagramEvent::event_type).collect()
        }

        fn count(&self, event_type: EventType) -> usize {
            self.log.borrow().iter().filter(|e| e.event_type() == event_type).count()
        }

        fn clear_log(&self) {
            self.log.borrow_mut().clear();
        }

        fn position(&self, id: &str) -> Point {
            self.engine.element(id).unwrap().position
        }

        fn pointer(&mut self, event: PointerEvent, after_ms: f64) {
            self.clock.advance(after_ms);
            self.engine.handle_pointer_event(event);
        }
    }

    #[test]
    fn test_no_op_move_is_identity() {
        let mut h = Harness::new();
        h.rect("a", 10.0, 10.0, 20.0, 20.0);
        let undo_depth = h.engine.history.undo_len();
        let before = h.engine.get_diagram_data();

        assert_eq!(h.engine.move_element("a", 0.0, 0.0).unwrap(), Vec2::ZERO);
        assert_eq!(h.engine.get_diagram_data(), before);
        assert_eq!(h.engine.history.undo_len(), undo_depth);
        assert!(matches!(h.engine.move_element("nope", 0.0, 0.0), Err(DiagramError::NotFound(_))));
    }

    #[test]
    fn test_zoom_clamp() {
        let mut h = Harness::new();
        h.engine.set_zoom(999.0, false);
        assert!((h.engine.get_zoom() - 5.0).abs() < f64::EPSILON);
        h.engine.set_zoom(0.0001, false);
        assert!((h.engine.get_zoom() - 0.1).abs() < f64::EPSILON);
        for _ in 0..40 {
            h.engine.zoom_in(None, false);
            assert!(h.engine.get_zoom() <= 5.0);
        }
        for _ in 0..80 {
            h.engine.zoom_out(None, false);
            assert!(h.engine.get_zoom() >= 0.1);
        }
    }

    #[test]
    fn test_zoom_out_multiplies() {
        let mut h = Harness::new();
        h.engine.zoom_out(Some(0.5), false);
        assert!((h.engine.get_zoom() - 0.5).abs() < 1e-9);

        h.engine.set_zoom(1.0, false);
        h.engine.zoom_out(None, false);
        assert!((h.engine.get_zoom() - 1.0 / 1.2).abs() < 1e-9);

        for bad in [0.0, -2.0, f64::NAN, f64::INFINITY] {
            h.engine.zoom_out(Some(bad), false);
            assert!((h.engine.get_zoom() - 1.0 / 1.2).abs() < 1e-9);
        }
    }

    #[test]
    fn test_non_finite_pan_is_ignored() {
        let mut h = Harness::new();
        h.engine.pan(30.0, -10.0);
        h.clock.advance(100.0);
        h.engine.tick();
        h.clear_log();

        h.engine.pan(f64::NAN, 5.0);
        h.engine.pan(1.0, f64::INFINITY);
        h.engine.pan_to(f64::NAN, 0.0, false);
        h.engine.pan_to(0.0, f64::NEG_INFINITY, true);
        h.clock.advance(500.0);
        h.engine.tick();

        assert_eq!(h.engine.get_pan(), Vec2::new(30.0, -10.0));
        assert_eq!(h.count(EventType::ViewportChanged), 0);
    }

    #[test]
    fn test_cascade_deletion() {
        let mut h = Harness::new();
        h.rect("a", 0.0, 0.0, 10.0, 10.0);
        h.rect("b", 100.0, 0.0, 10.0, 10.0);
        h.engine.add_link(LinkConfig::between("a", "b").with_id("l")).unwrap();
        h.clear_log();

        h.engine.remove_element("a").unwrap();
        assert!(h.engine.element("a").is_none());
        assert!(h.engine.link("l").is_none());
        assert_eq!(h.types(), vec![EventType::LinkRemoved, EventType::ElementRemoved]);
    }

    #[test]
    fn test_undo_redo_sequence() {
        let mut h = Harness::new();
        let mut counts = vec![];

        h.rect("x", 50.0, 50.0, 10.0, 10.0);
        counts.push(h.engine.element_count());
        h.engine.remove_element("x").unwrap();
        counts.push(h.engine.element_count());
        assert!(h.engine.undo());
        counts.push(h.engine.element_count());
        assert!(h.engine.redo());
        counts.push(h.engine.element_count());

        assert_eq!(counts, vec![1, 0, 1, 0]);
        assert!(h.engine.can_undo());
        assert!(!h.engine.can_redo());

        assert!(h.engine.undo());
        assert!(h.engine.undo());
        assert!(!h.engine.undo());
        assert_eq!(h.engine.element_count(), 0);

        // A deleted id stays taken; only history brings it back.
        let again = ElementConfig::new("rectangle").with_id("x").at(0.0, 0.0).sized(5.0, 5.0);
        assert!(matches!(h.engine.add_element(again), Err(DiagramError::Validation(_))));
        assert!(h.engine.redo());
        assert!(h.engine.element("x").is_some());
    }

    #[test]
    fn test_undo_emits_diff_and_prunes_selection() {
        let mut h = Harness::new();
        h.rect("a", 0.0, 0.0, 10.0, 10.0);
        h.engine.select("a").unwrap();
        h.clear_log();

        assert!(h.engine.undo());
        assert_eq!(h.types(), vec![EventType::ElementRemoved, EventType::SelectionCleared]);
        assert!(h.engine.selection().is_empty());

        h.clear_log();
        assert!(h.engine.redo());
        assert_eq!(h.types(), vec![EventType::ElementAdded]);
    }

    #[test]
    fn test_grid_toggle_is_non_destructive() {
        let mut h = Harness::new();
        h.rect("a", 0.0, 0.0, 10.0, 10.0);
        h.rect("b", 40.0, 0.0, 10.0, 10.0);
        h.engine.set_zoom(2.3, false);
        h.engine.pan(17.0, -4.0);
        h.engine.select("a").unwrap();
        let data = h.engine.get_diagram_data();
        let view = h.engine.view_state();
        h.clear_log();

        h.engine.grid_mut().toggle();
        h.engine.grid_mut().toggle();

        assert_eq!(h.engine.get_diagram_data(), data);
        assert_eq!(h.engine.view_state(), view);
        assert_eq!(h.engine.selected_ids(), vec!["a".to_string()]);
        assert_eq!(h.count(EventType::SelectionCleared), 0);
        assert!(h.log.borrow().is_empty());
    }

    #[test]
    fn test_collision_rejection() {
        let mut h = Harness::new();
        h.rect("a", 100.0, 100.0, 50.0, 30.0);
        h.rect("b", 200.0, 200.0, 40.0, 25.0);

        h.engine.set_collision_detection(true);
        assert_eq!(h.engine.move_element("a", 100.0, 100.0).unwrap(), Vec2::ZERO);
        assert_eq!(h.position("a"), Point::new(100.0, 100.0));

        h.engine.set_collision_detection(false);
        assert_eq!(h.engine.move_element("a", 100.0, 100.0).unwrap(), Vec2::new(100.0, 100.0));
        assert_eq!(h.position("a"), Point::new(200.0, 200.0));
    }

    #[test]
    fn test_rejected_selection_member_blocks_followers() {
        let mut h = Harness::new();
        h.rect("a", 100.0, 100.0, 50.0, 30.0);
        h.rect("b", 40.0, 100.0, 50.0, 30.0);
        h.rect("c", 200.0, 100.0, 40.0, 30.0);
        h.engine.set_collision_detection(true);
        h.engine.set_selection(vec!["a".to_string(), "b".to_string()]);
        let undo_depth = h.engine.history.undo_len();
        h.clear_log();

        assert!(h.engine.move_selected_elements(60.0, 0.0).unwrap().is_empty());
        assert_eq!(h.position("a"), Point::new(100.0, 100.0));
        assert_eq!(h.position("b"), Point::new(40.0, 100.0));
        assert_eq!(h.engine.history.undo_len(), undo_depth);
        assert_eq!(h.count(EventType::ElementMoved), 0);
    }

    #[test]
    fn test_collision_checks_embedded_children() {
        let mut h = Harness::new();
        h.rect("p", 0.0, 0.0, 20.0, 20.0);
        h.rect("k", 100.0, 0.0, 20.0, 20.0);
        h.rect("x", 100.0, 100.0, 20.0, 20.0);
        h.engine.embed("p", "k").unwrap();
        h.engine.set_collision_detection(true);

        assert_eq!(h.engine.move_element("p", 0.0, 100.0).unwrap(), Vec2::ZERO);
        assert_eq!(h.position("p"), Point::ZERO);
        assert_eq!(h.position("k"), Point::new(100.0, 0.0));
    }

    #[test]
    fn test_move_clamps_and_snaps() {
        let config = EngineConfig {
            grid_enabled: true,
            ..Default::default()
        };
        let mut h = Harness::with_config(config);
        h.rect("a", 100.0, 100.0, 50.0, 30.0);

        let accepted = h.engine.move_element("a", -1000.0, 7.0).unwrap();
        // x clamps to -20 (already on the grid), y 107 snaps to 100.
        assert_eq!(accepted, Vec2::new(-120.0, 0.0));
        assert_eq!(h.position("a"), Point::new(-20.0, 100.0));
    }

    #[test]
    fn test_move_carries_embedded_children() {
        let mut h = Harness::new();
        h.rect("group", 0.0, 0.0, 100.0, 100.0);
        h.rect("child", 10.0, 10.0, 20.0, 20.0);
        h.engine.embed("group", "child").unwrap();
        h.clear_log();

        h.engine.move_element("group", 5.0, 5.0).unwrap();
        assert_eq!(h.position("child"), Point::new(15.0, 15.0));
        let log = h.log.borrow();
        let [DiagramEvent::ElementMoved { moves }] = log.as_slice() else {
            panic!("unexpected events {log:?}");
        };
        assert_eq!(moves.len(), 2);
    }

    #[test]
    fn test_batch_move_single_notification() {
        let mut h = Harness::new();
        h.rect("a", 0.0, 0.0, 10.0, 10.0);
        h.rect("b", 50.0, 0.0, 10.0, 10.0);
        h.engine.set_selection(vec!["a".to_string(), "b".to_string()]);
        let undo_depth = h.engine.history.undo_len();
        h.clear_log();

        let moves = h.engine.move_selected_elements(10.0, 20.0).unwrap();
        assert_eq!(moves.len(), 2);
        assert_eq!(h.types(), vec![EventType::ElementMoved]);
        assert_eq!(h.engine.history.undo_len(), undo_depth + 1);

        h.engine.undo();
        assert_eq!(h.position("a"), Point::ZERO);
        assert_eq!(h.position("b"), Point::new(50.0, 0.0));
    }

    #[test]
    fn test_update_shape_events() {
        let mut h = Harness::new();
        h.rect("a", 0.0, 0.0, 10.0, 10.0);
        h.clear_log();

        let outcome = h
            .engine
            .update_shape(
                "a",
                ElementPatch {
                    position: Some(Point::new(5.0, 5.0)),
                    size: Some(Size::new(20.0, 10.0)),
                    properties: None,
                },
            )
            .unwrap();
        assert!(outcome.moved && outcome.resized && !outcome.restyled);
        assert_eq!(
            h.types(),
            vec![EventType::ElementMoved, EventType::ElementResized, EventType::ElementChanged]
        );

        h.clear_log();
        let unchanged = h.engine.update_shape("a", ElementPatch::size(20.0, 10.0)).unwrap();
        assert!(!unchanged.any());
        assert!(h.log.borrow().is_empty());
        assert!(h.engine.update_shape("a", ElementPatch::size(-1.0, 1.0)).is_err());
    }

    #[test]
    fn test_link_editing() {
        let mut h = Harness::new();
        h.rect("a", 0.0, 0.0, 10.0, 10.0);
        h.rect("b", 100.0, 0.0, 10.0, 10.0);
        h.rect("c", 200.0, 0.0, 10.0, 10.0);
        h.clear_log();

        h.engine.add_link(LinkConfig::between("a", "b").with_id("l")).unwrap();
        assert_eq!(
            h.types(),
            vec![EventType::LinkAdded, EventType::LinkConnected, EventType::LinkConnected]
        );

        h.engine.insert_link_vertex("l", 0, Point::new(50.0, 50.0)).unwrap();
        h.engine.update_link_vertex("l", 0, Point::new(60.0, 50.0)).unwrap();
        assert_eq!(h.engine.link("l").unwrap().vertices, vec![Point::new(60.0, 50.0)]);
        assert_eq!(h.engine.remove_link_vertex("l", 0).unwrap(), Point::new(60.0, 50.0));

        h.clear_log();
        h.engine.reconnect_link("l", LinkEnd::Target, Endpoint::element("c")).unwrap();
        let log = h.log.borrow();
        assert!(matches!(
            &log[0],
            DiagramEvent::LinkDisconnected { element, end: LinkEnd::Target, .. } if element == "b"
        ));
        assert!(matches!(
            &log[1],
            DiagramEvent::LinkConnected { element, end: LinkEnd::Target, .. } if element == "c"
        ));
        drop(log);

        assert!(matches!(
            h.engine.reconnect_link("l", LinkEnd::Source, Endpoint::element("ghost")),
            Err(DiagramError::DanglingReference { .. })
        ));
        assert!(matches!(
            h.engine.add_link(LinkConfig::between("a", "ghost")),
            Err(DiagramError::DanglingReference { .. })
        ));
    }

    #[test]
    fn test_failed_mutation_records_nothing() {
        let mut h = Harness::new();
        assert!(h
            .engine
            .add_element(ElementConfig::new("rectangle").at(0.0, 0.0))
            .is_err());
        assert!(h.engine.remove_link("missing").is_err());
        assert!(!h.engine.can_undo());
        assert!(h.log.borrow().is_empty());
    }

    #[test]
    fn test_unchanged_document_records_nothing() {
        let mut h = Harness::new();
        h.rect("a", 0.0, 0.0, 10.0, 10.0);
        h.rect("b", 50.0, 0.0, 10.0, 10.0);
        h.engine.embed("a", "b").unwrap();
        let undo_depth = h.engine.history.undo_len();

        h.engine.bring_to_front("b").unwrap();
        h.engine.send_to_back("a").unwrap();
        h.engine.embed("a", "b").unwrap();
        assert_eq!(h.engine.history.undo_len(), undo_depth);

        // The first undo still reverts the last real change.
        assert!(h.engine.undo());
        assert_eq!(h.engine.element("b").unwrap().parent, None);
    }

    #[test]
    fn test_drag_threshold_click() {
        let mut h = Harness::new();
        h.rect("a", 100.0, 100.0, 50.0, 50.0);
        h.clear_log();

        h.pointer(PointerEvent::mouse_down(110.0, 110.0), 0.0);
        h.pointer(PointerEvent::mouse_move(112.0, 111.0), 20.0);
        h.pointer(PointerEvent::mouse_up(112.0, 111.0), 20.0);

        assert_eq!(h.count(EventType::ElementSelected), 1);
        assert_eq!(h.count(EventType::ElementDragging), 0);
        assert_eq!(h.position("a"), Point::new(100.0, 100.0));
    }

    #[test]
    fn test_drag_past_threshold() {
        let mut h = Harness::new();
        h.rect("a", 100.0, 100.0, 50.0, 50.0);
        h.engine.set_zoom(2.0, false);
        h.engine.pan_to(0.0, 0.0, false);
        let undo_depth = h.engine.history.undo_len();
        h.clear_log();

        h.pointer(PointerEvent::mouse_down(220.0, 220.0), 0.0);
        h.pointer(PointerEvent::mouse_move(240.0, 220.0), 16.0);
        assert_eq!(h.count(EventType::ElementDragging), 1);
        h.pointer(PointerEvent::mouse_move(260.0, 230.0), 16.0);
        h.pointer(PointerEvent::mouse_up(260.0, 230.0), 16.0);

        // 40x10 client pixels at zoom 2.
        assert_eq!(h.position("a"), Point::new(120.0, 105.0));
        assert_eq!(h.count(EventType::ElementDragEnd), 1);
        let types = h.types();
        let dragging = types.iter().position(|t| *t == EventType::ElementDragging).unwrap();
        let end = types.iter().position(|t| *t == EventType::ElementDragEnd).unwrap();
        assert!(dragging < end);

        // The whole drag is one undo step.
        assert_eq!(h.engine.history.undo_len(), undo_depth + 1);
        h.engine.undo();
        assert_eq!(h.position("a"), Point::new(100.0, 100.0));
    }

    #[test]
    fn test_hold_starts_drag_via_tick() {
        let mut h = Harness::new();
        h.rect("a", 0.0, 0.0, 50.0, 50.0);
        h.pointer(PointerEvent::mouse_down(10.0, 10.0), 0.0);
        assert_eq!(h.clock.next_wakeup(), Some(200.0));

        h.clock.advance(200.0);
        h.engine.tick();
        assert_eq!(h.engine.gesture_state(), "dragging");

        h.pointer(PointerEvent::mouse_move(12.0, 10.0), 10.0);
        assert_eq!(h.position("a"), Point::new(2.0, 0.0));
    }

    #[test]
    fn test_stationary_hold_records_no_history() {
        let mut h = Harness::new();
        h.rect("a", 0.0, 0.0, 50.0, 50.0);
        let undo_depth = h.engine.history.undo_len();

        h.pointer(PointerEvent::mouse_down(10.0, 10.0), 0.0);
        h.clock.advance(250.0);
        h.engine.tick();
        h.pointer(PointerEvent::mouse_up(10.0, 10.0), 10.0);

        assert_eq!(h.count(EventType::ElementDragEnd), 1);
        assert_eq!(h.count(EventType::ElementMoved), 0);
        assert_eq!(h.engine.history.undo_len(), undo_depth);
    }

    #[test]
    fn test_drag_moves_selection_group() {
        let mut h = Harness::new();
        h.rect("a", 0.0, 0.0, 20.0, 20.0);
        h.rect("b", 100.0, 0.0, 20.0, 20.0);

        h.pointer(PointerEvent::mouse_down(5.0, 5.0), 0.0);
        h.pointer(PointerEvent::mouse_up(5.0, 5.0), 10.0);
        let shift_down = PointerEvent::mouse_down(105.0, 5.0).with_modifiers(Modifiers::SHIFT);
        h.pointer(shift_down, 1000.0);
        h.pointer(PointerEvent::mouse_up(105.0, 5.0), 10.0);
        assert_eq!(h.engine.selected_ids(), vec!["a".to_string(), "b".to_string()]);

        h.pointer(PointerEvent::mouse_down(5.0, 5.0), 1000.0);
        h.pointer(PointerEvent::mouse_move(15.0, 25.0), 10.0);
        h.pointer(PointerEvent::mouse_up(15.0, 25.0), 10.0);
        assert_eq!(h.position("a"), Point::new(10.0, 20.0));
        assert_eq!(h.position("b"), Point::new(110.0, 20.0));
    }

    #[test]
    fn test_canvas_click_clears_selection() {
        let mut h = Harness::new();
        h.rect("a", 0.0, 0.0, 20.0, 20.0);
        h.engine.select("a").unwrap();
        h.clear_log();

        h.pointer(PointerEvent::mouse_down(400.0, 400.0), 0.0);
        h.pointer(PointerEvent::mouse_up(400.0, 400.0), 10.0);
        assert_eq!(h.types(), vec![EventType::CanvasClicked, EventType::SelectionCleared]);
    }

    #[test]
    fn test_double_click_event() {
        let mut h = Harness::new();
        h.rect("a", 0.0, 0.0, 20.0, 20.0);
        h.pointer(PointerEvent::mouse_down(5.0, 5.0), 0.0);
        h.pointer(PointerEvent::mouse_up(5.0, 5.0), 10.0);
        h.pointer(PointerEvent::mouse_down(5.0, 5.0), 100.0);
        h.pointer(PointerEvent::mouse_up(5.0, 5.0), 10.0);
        assert_eq!(h.count(EventType::ElementDoubleClick), 1);
    }

    #[test]
    fn test_canvas_drag_pans_and_middle_button() {
        let mut h = Harness::new();
        h.rect("a", 0.0, 0.0, 50.0, 50.0);

        h.pointer(PointerEvent::mouse_down(300.0, 300.0), 0.0);
        h.pointer(PointerEvent::mouse_move(330.0, 310.0), 20.0);
        h.pointer(PointerEvent::mouse_up(330.0, 310.0), 20.0);
        assert_eq!(h.engine.get_pan(), Vec2::new(30.0, 10.0));

        let middle = PointerEvent::mouse_down(40.0, 20.0).with_button(MouseButton::Middle);
        h.pointer(middle, 100.0);
        h.pointer(PointerEvent::mouse_move(50.0, 20.0), 20.0);
        h.pointer(PointerEvent::mouse_up(50.0, 20.0), 20.0);
        assert_eq!(h.engine.get_pan(), Vec2::new(40.0, 10.0));
        assert_eq!(h.position("a"), Point::ZERO);
    }

    #[test]
    fn test_wheel_zoom_keeps_cursor_point() {
        let mut h = Harness::new();
        let cursor = Point::new(200.0, 150.0);
        let before = h.engine.to_local(cursor);
        h.pointer(PointerEvent::wheel(cursor.x, cursor.y, -100.0), 0.0);
        assert!(h.engine.get_zoom() > 1.0);
        let after = h.engine.to_local(cursor);
        assert!((before.x - after.x).abs() < 1e-9);
        assert!((before.y - after.y).abs() < 1e-9);
    }

    #[test]
    fn test_viewport_notifications_are_throttled() {
        let mut h = Harness::new();
        h.engine.pan(1.0, 0.0);
        h.clock.advance(4.0);
        h.engine.pan(1.0, 0.0);
        h.clock.advance(4.0);
        h.engine.pan(1.0, 0.0);
        assert_eq!(h.count(EventType::ViewportChanged), 1);
        assert_eq!(h.clock.next_wakeup(), Some(16.0));

        h.clock.set_time(16.0);
        h.engine.tick();
        assert_eq!(h.count(EventType::ViewportChanged), 2);
        let log = h.log.borrow();
        let last = log
            .iter()
            .rev()
            .find(|e| e.event_type() == EventType::ViewportChanged)
            .unwrap();
        assert!(matches!(last, DiagramEvent::ViewportChanged { pan, .. } if *pan == Vec2::new(3.0, 0.0)));
    }

    #[test]
    fn test_smooth_zoom_runs_on_ticks() {
        let mut h = Harness::new();
        h.engine.set_zoom(2.0, true);
        assert!(h.clock.take_frame());
        assert!((h.engine.get_zoom() - 1.0).abs() < f64::EPSILON);

        for _ in 0..30 {
            h.clock.advance(16.0);
            h.engine.tick();
        }
        assert!((h.engine.get_zoom() - 2.0).abs() < 1e-12);
        assert!(!h.engine.viewport().is_animating());
        assert!(h.count(EventType::ViewportChanged) >= 2);
    }

    #[test]
    fn test_zoom_to_fit_and_selection() {
        let mut h = Harness::new();
        h.engine.zoom_to_fit(10.0, false);
        assert_eq!(h.engine.view_state(), ViewState::default());

        h.rect("a", 0.0, 0.0, 100.0, 100.0);
        h.rect("b", 1500.0, 1100.0, 100.0, 100.0);
        h.engine.zoom_to_fit(0.0, false);
        assert!((h.engine.get_zoom() - 0.5).abs() < 1e-12);

        h.engine.select("a").unwrap();
        h.engine.zoom_to_selection(0.0, false);
        assert!((h.engine.get_zoom() - 5.0).abs() < f64::EPSILON);

        h.engine.clear_selection();
        h.engine.zoom_to_selection(0.0, false);
        assert!((h.engine.get_zoom() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_persistence_roundtrip() {
        let mut h = Harness::new();
        h.rect("a", 0.0, 0.0, 10.0, 10.0);
        h.rect("b", 50.0, 0.0, 10.0, 10.0);
        h.engine.add_link(LinkConfig::between("a", "b")).unwrap();

        block_on(h.engine.save("doc1")).unwrap();
        h.engine.clear();
        assert_eq!(h.engine.element_count(), 0);
        block_on(h.engine.load("doc1")).unwrap();

        assert_eq!(h.engine.element_count(), 2);
        assert_eq!(h.engine.link_count(), 1);
        assert_eq!(h.count(EventType::DocumentSaved), 1);
        assert_eq!(h.count(EventType::DocumentLoaded), 1);

        let missing = block_on(h.engine.load("nope"));
        assert!(matches!(missing, Err(DiagramError::NotFound(_))));
    }

    #[test]
    fn test_storage_failure_propagates() {
        struct Failing;
        impl Storage for Failing {
            fn save(&self, _: &DocumentRecord) -> crate::storage::BoxFuture<'_, StorageResult<()>> {
                Box::pin(async { Err(StorageError::Io("disk full".into())) })
            }
            fn load(&self, _: &str) -> crate::storage::BoxFuture<'_, StorageResult<Option<DocumentRecord>>> {
                Box::pin(async { Err(StorageError::Other("offline".into())) })
            }
            fn delete(&self, _: &str) -> crate::storage::BoxFuture<'_, StorageResult<()>> {
                Box::pin(async { Ok(()) })
            }
            fn list(&self) -> crate::storage::BoxFuture<'_, StorageResult<Vec<String>>> {
                Box::pin(async { Ok(vec![]) })
            }
            fn exists(&self, _: &str) -> crate::storage::BoxFuture<'_, StorageResult<bool>> {
                Box::pin(async { Ok(false) })
            }
        }

        let engine = DiagramEngine::default().with_storage(Failing);
        let result = block_on(engine.save("doc"));
        assert!(matches!(result, Err(DiagramError::Storage(StorageError::Io(_)))));
    }

    #[test]
    fn test_dangling_link_skipped_on_import() {
        let mut h = Harness::new();
        let json = r#"{
            "elements": [
                { "id": "a", "type": "rectangle", "position": { "x": 0, "y": 0 }, "size": { "width": 10, "height": 10 } },
                { "id": "b", "type": "circle", "position": { "x": 40, "y": 0 }, "size": { "width": 10, "height": 10 } }
            ],
            "links": [
                { "id": "ok", "type": "link", "source": { "id": "a" }, "target": { "id": "b" } },
                { "id": "bad", "type": "link", "source": { "id": "a" }, "target": { "id": "zzz" } }
            ]
        }"#;
        let skipped = h.engine.import_from_json(json).unwrap();
        assert_eq!(skipped, vec!["bad".to_string()]);
        assert_eq!(h.engine.element_count(), 2);
        assert_eq!(h.engine.link_count(), 1);
    }

    #[test]
    fn test_import_errors() {
        let mut h = Harness::new();
        h.rect("keep", 0.0, 0.0, 10.0, 10.0);

        assert!(matches!(h.engine.import_from_json("{ bad"), Err(DiagramError::Deserialization(_))));
        assert_eq!(h.engine.element_count(), 1);

        let unknown = r#"{ "elements": [ { "id": "x", "type": "hexagon", "position": { "x": 0, "y": 0 }, "size": { "width": 1, "height": 1 } } ] }"#;
        assert!(matches!(h.engine.import_from_json(unknown), Err(DiagramError::Deserialization(_))));
        assert_eq!(h.engine.element_count(), 0);

        // The pre-import document is one undo away.
        assert!(h.engine.undo());
        assert!(h.engine.element("keep").is_some());
    }

    #[test]
    fn test_export_import_roundtrip() {
        let mut h = Harness::new();
        h.rect("a", 1.0, 2.0, 3.0, 4.0);
        let json = h.engine.export_to_json(true).unwrap();

        let mut other = Harness::new();
        other.engine.import_from_json(&json).unwrap();
        assert_eq!(other.engine.get_diagram_data(), h.engine.get_diagram_data());
    }

    #[test]
    fn test_destroy_releases_everything() {
        let mut h = Harness::new();
        h.rect("a", 0.0, 0.0, 10.0, 10.0);
        h.engine.set_zoom(3.0, true);
        h.clear_log();

        h.engine.destroy();
        assert!(h.clock.is_idle());
        assert_eq!(h.engine.events().total_listeners(), 0);
        assert_eq!(h.engine.element_count(), 0);
        assert!(!h.engine.can_undo());

        h.engine.tick();
        h.engine.handle_pointer_event(PointerEvent::mouse_down(1.0, 1.0));
        h.engine.add_element(ElementConfig::new("circle").at(0.0, 0.0).sized(1.0, 1.0)).unwrap();
        assert!(h.log.borrow().is_empty());
    }

    #[test]
    fn test_subscriber_panic_is_contained() {
        let mut h = Harness::new();
        h.engine.on(EventType::ElementAdded, |_| panic!("listener bug"));
        h.rect("a", 0.0, 0.0, 10.0, 10.0);
        assert_eq!(h.engine.element_count(), 1);
        assert_eq!(h.count(EventType::ElementAdded), 1);
    }

    #[test]
    fn test_remove_event_listener() {
        let mut h = Harness::new();
        let hits = Rc::new(RefCell::new(0));
        let counter = hits.clone();
        let listener = h.engine.on(EventType::ElementAdded, move |_| *counter.borrow_mut() += 1);
        h.rect("a", 0.0, 0.0, 10.0, 10.0);
        assert!(h.engine.remove_event_listener(EventType::ElementAdded, &listener));
        h.rect("b", 0.0, 0.0, 10.0, 10.0);
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn test_removing_parent_detaches_child() {
        let mut h = Harness::new();
        h.rect("group", 0.0, 0.0, 100.0, 100.0);
        h.rect("child", 10.0, 10.0, 10.0, 10.0);
        h.engine.embed("group", "child").unwrap();
        assert!(matches!(h.engine.embed("child", "group"), Err(DiagramError::CyclicEmbedding { .. })));

        h.engine.remove_element("group").unwrap();
        assert_eq!(h.engine.element("child").unwrap().parent, None);
        assert_eq!(h.engine.unembed("child").unwrap(), None);
    }

    #[test]
    fn test_diff_events() {
        let before = DocumentData::from_json(
            r#"{ "elements": [
                { "id": "a", "type": "rectangle", "position": { "x": 0, "y": 0 }, "size": { "width": 1, "height": 1 } },
                { "id": "b", "type": "rectangle", "position": { "x": 5, "y": 0 }, "size": { "width": 1, "height": 1 } }
            ] }"#,
        )
        .unwrap();
        let mut after = before.clone();
        after.elements.remove(0);
        after.elements[0].position = Point::new(9.0, 9.0);

        let types: Vec<EventType> = diff_events(&before, &after).iter().map(DiagramEvent::event_type).collect();
        assert_eq!(
            types,
            vec![EventType::ElementRemoved, EventType::ElementMoved, EventType::ElementChanged]
        );
        assert!(diff_events(&after, &after).is_empty());
    }
}
