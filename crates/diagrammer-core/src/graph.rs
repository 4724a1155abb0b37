//! Graph model: the authoritative in-memory diagram document.

use crate::error::{DiagramError, DiagramResult};
use crate::history::Snapshotable;
use crate::shapes::{
    generate_id, is_finite_point, is_valid_size, merge_properties, Element, ElementConfig,
    ElementId, ElementPatch, Endpoint, Link, LinkConfig, LinkEnd, LinkId, ShapeRegistry,
};
use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Serialized form of a whole document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentData {
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl DocumentData {
    /// Serialize to JSON.
    pub fn to_json(&self, pretty: bool) -> Result<String, serde_json::Error> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }

    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// What `remove_element` took out of the document.
#[derive(Debug, Clone)]
pub struct RemovedElement {
    pub element: Element,
    /// Links removed because they referenced the element.
    pub links: Vec<Link>,
    /// Children that were detached and are now top-level.
    pub detached_children: Vec<ElementId>,
}

/// Which aspects of an element a patch changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchOutcome {
    pub moved: bool,
    pub resized: bool,
    pub restyled: bool,
}

impl PatchOutcome {
    pub fn any(&self) -> bool {
        self.moved || self.resized || self.restyled
    }
}

/// In-memory store of elements and links with referential integrity.
#[derive(Debug, Clone)]
pub struct GraphModel {
    registry: Arc<ShapeRegistry>,
    elements: HashMap<ElementId, Element>,
    /// Z-order of elements (back to front).
    z_order: Vec<ElementId>,
    links: HashMap<LinkId, Link>,
    link_order: Vec<LinkId>,
    /// Ids deleted during this session; new elements and links may not
    /// take them. Undo and document loads bring them back directly.
    retired: HashSet<String>,
}

impl GraphModel {
    /// Create an empty model backed by `registry`.
    pub fn new(registry: Arc<ShapeRegistry>) -> Self {
        Self {
            registry,
            elements: HashMap::new(),
            z_order: Vec::new(),
            links: HashMap::new(),
            link_order: Vec::new(),
            retired: HashSet::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ShapeRegistry> {
        &self.registry
    }

    fn id_in_use(&self, id: &str) -> bool {
        self.elements.contains_key(id) || self.links.contains_key(id)
    }

    fn claim_id(&self, requested: Option<&String>) -> DiagramResult<String> {
        match requested {
            Some(id) if id.is_empty() => Err(DiagramError::Validation("id must not be empty".into())),
            Some(id) if self.id_in_use(id) => Err(DiagramError::Validation(format!("duplicate id: {id}"))),
            Some(id) if self.retired.contains(id) => Err(DiagramError::Validation(format!(
                "id {id} belonged to a deleted item and cannot be reused"
            ))),
            Some(id) => Ok(id.clone()),
            None => Ok(generate_id()),
        }
    }

    /// Add an element, returning its id.
    pub fn add_element(&mut self, config: ElementConfig) -> DiagramResult<ElementId> {
        let position = config
            .position
            .ok_or_else(|| DiagramError::Validation("element position is required".into()))?;
        let size = config
            .size
            .ok_or_else(|| DiagramError::Validation("element size is required".into()))?;
        if !is_finite_point(position) {
            return Err(DiagramError::Validation("element position must be finite".into()));
        }
        if !is_valid_size(size) {
            return Err(DiagramError::Validation(
                "element size must be finite and non-negative".into(),
            ));
        }
        if let Some(parent) = &config.parent {
            if !self.elements.contains_key(parent) {
                return Err(DiagramError::NotFound(parent.clone()));
            }
        }

        let id = self.claim_id(config.id.as_ref())?;
        let mut element = self.registry.build_element(id.clone(), &config)?;
        element.id = id.clone();
        element.parent = config.parent.clone();

        self.z_order.push(id.clone());
        self.elements.insert(id.clone(), element);
        Ok(id)
    }

    /// Add a link, returning its id. Both endpoints must already exist.
    pub fn add_link(&mut self, config: LinkConfig) -> DiagramResult<LinkId> {
        let source = config
            .source
            .as_ref()
            .ok_or_else(|| DiagramError::Validation("link source is required".into()))?;
        let target = config
            .target
            .as_ref()
            .ok_or_else(|| DiagramError::Validation("link target is required".into()))?;
        if source.id.is_empty() || target.id.is_empty() {
            return Err(DiagramError::Validation("link endpoint id must not be empty".into()));
        }
        if config.vertices.iter().any(|v| !is_finite_point(*v)) {
            return Err(DiagramError::Validation("link vertices must be finite".into()));
        }

        let id = self.claim_id(config.id.as_ref())?;
        for endpoint in [source, target] {
            if !self.elements.contains_key(&endpoint.id) {
                return Err(DiagramError::DanglingReference {
                    link: id,
                    element: endpoint.id.clone(),
                });
            }
        }

        let mut link = self.registry.build_link(id.clone(), &config)?;
        link.id = id.clone();
        link.source = source.clone();
        link.target = target.clone();

        self.link_order.push(id.clone());
        self.links.insert(id.clone(), link);
        Ok(id)
    }

    /// Remove an element together with every link that references it.
    ///
    /// Embedded children are detached, not removed.
    pub fn remove_element(&mut self, id: &str) -> DiagramResult<RemovedElement> {
        if !self.elements.contains_key(id) {
            return Err(DiagramError::NotFound(id.to_string()));
        }

        let link_ids = self.links_of(id);
        let mut links = Vec::with_capacity(link_ids.len());
        for link_id in link_ids {
            if let Ok(link) = self.remove_link(&link_id) {
                links.push(link);
            }
        }

        let mut detached_children = Vec::new();
        for element in self.elements.values_mut() {
            if element.parent.as_deref() == Some(id) {
                element.parent = None;
                detached_children.push(element.id.clone());
            }
        }
        detached_children.sort_by_key(|child| self.z_index(child));

        self.z_order.retain(|element_id| element_id != id);
        let element = self
            .elements
            .remove(id)
            .ok_or_else(|| DiagramError::NotFound(id.to_string()))?;
        self.retired.insert(id.to_string());

        Ok(RemovedElement {
            element,
            links,
            detached_children,
        })
    }

    /// Remove a single link.
    pub fn remove_link(&mut self, id: &str) -> DiagramResult<Link> {
        let link = self
            .links
            .remove(id)
            .ok_or_else(|| DiagramError::NotFound(id.to_string()))?;
        self.link_order.retain(|link_id| link_id != id);
        self.retired.insert(id.to_string());
        Ok(link)
    }

    /// Empty the whole document. The removed ids are retired.
    pub fn clear(&mut self) {
        self.retired.extend(self.z_order.drain(..));
        self.retired.extend(self.link_order.drain(..));
        self.elements.clear();
        self.links.clear();
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.get(id)
    }

    pub fn link(&self, id: &str) -> Option<&Link> {
        self.links.get(id)
    }

    pub fn contains_element(&self, id: &str) -> bool {
        self.elements.contains_key(id)
    }

    pub fn contains_link(&self, id: &str) -> bool {
        self.links.contains_key(id)
    }

    /// Elements in z-order (back to front).
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.z_order.iter().filter_map(|id| self.elements.get(id))
    }

    /// Links in insertion order.
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.link_order.iter().filter_map(|id| self.links.get(id))
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty() && self.links.is_empty()
    }

    /// Ids of links whose source or target is `element`.
    pub fn links_of(&self, element: &str) -> Vec<LinkId> {
        self.links()
            .filter(|link| link.touches(element))
            .map(|link| link.id.clone())
            .collect()
    }

    fn z_index(&self, id: &str) -> usize {
        self.z_order.iter().position(|z| z == id).unwrap_or(usize::MAX)
    }

    /// Bring an element to the front (topmost).
    pub fn bring_to_front(&mut self, id: &str) -> DiagramResult<()> {
        if !self.elements.contains_key(id) {
            return Err(DiagramError::NotFound(id.to_string()));
        }
        self.z_order.retain(|z| z != id);
        self.z_order.push(id.to_string());
        Ok(())
    }

    /// Send an element to the back (bottommost).
    pub fn send_to_back(&mut self, id: &str) -> DiagramResult<()> {
        if !self.elements.contains_key(id) {
            return Err(DiagramError::NotFound(id.to_string()));
        }
        self.z_order.retain(|z| z != id);
        self.z_order.insert(0, id.to_string());
        Ok(())
    }

    /// Topmost element whose bounding box contains a document point.
    pub fn element_at(&self, point: Point) -> Option<ElementId> {
        self.z_order
            .iter()
            .rev()
            .find(|id| self.elements.get(*id).is_some_and(|e| e.hit_test(point)))
            .cloned()
    }

    /// Bounding box of every element.
    pub fn bounds(&self) -> Option<Rect> {
        self.bounds_of(self.z_order.iter())
    }

    /// Bounding box of the given elements; unknown ids are ignored.
    pub fn bounds_of<'a>(&self, ids: impl IntoIterator<Item = &'a ElementId>) -> Option<Rect> {
        ids.into_iter()
            .filter_map(|id| self.elements.get(id))
            .map(Element::bounds)
            .reduce(|acc, b| acc.union(b))
    }

    // --- embedding ---

    /// Make `child` an embedded child of `parent`, re-parenting if needed.
    pub fn embed(&mut self, parent: &str, child: &str) -> DiagramResult<()> {
        if !self.elements.contains_key(parent) {
            return Err(DiagramError::NotFound(parent.to_string()));
        }
        if !self.elements.contains_key(child) {
            return Err(DiagramError::NotFound(child.to_string()));
        }
        if parent == child || self.ancestors(parent).iter().any(|a| a == child) {
            return Err(DiagramError::CyclicEmbedding {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }
        if let Some(element) = self.elements.get_mut(child) {
            element.parent = Some(parent.to_string());
        }
        Ok(())
    }

    /// Detach `child` from its parent, returning the former parent.
    pub fn unembed(&mut self, child: &str) -> DiagramResult<Option<ElementId>> {
        let element = self
            .elements
            .get_mut(child)
            .ok_or_else(|| DiagramError::NotFound(child.to_string()))?;
        Ok(element.parent.take())
    }

    /// Children of `parent` in z-order; with `deep`, all descendants
    /// breadth-first.
    pub fn embedded_children(&self, parent: &str, deep: bool) -> Vec<ElementId> {
        let direct = |p: &str| -> Vec<ElementId> {
            self.elements()
                .filter(|e| e.parent.as_deref() == Some(p))
                .map(|e| e.id.clone())
                .collect()
        };

        if !deep {
            return direct(parent);
        }

        let mut result = Vec::new();
        let mut queue: VecDeque<ElementId> = direct(parent).into();
        while let Some(id) = queue.pop_front() {
            queue.extend(direct(&id));
            result.push(id);
        }
        result
    }

    /// Ancestors of `child`, nearest first.
    pub fn ancestors(&self, child: &str) -> Vec<ElementId> {
        let mut result = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.elements.get(child).and_then(|e| e.parent.clone());
        while let Some(id) = current {
            if !seen.insert(id.clone()) {
                break;
            }
            current = self.elements.get(&id).and_then(|e| e.parent.clone());
            result.push(id);
        }
        result
    }

    // --- mutation helpers used by the engine ---

    /// Translate an element by `delta`.
    pub fn translate_element(&mut self, id: &str, delta: Vec2) -> DiagramResult<()> {
        let element = self
            .elements
            .get_mut(id)
            .ok_or_else(|| DiagramError::NotFound(id.to_string()))?;
        element.translate(delta);
        Ok(())
    }

    /// Apply a geometry/style patch.
    pub fn apply_patch(&mut self, id: &str, patch: &ElementPatch) -> DiagramResult<PatchOutcome> {
        if let Some(position) = patch.position {
            if !is_finite_point(position) {
                return Err(DiagramError::Validation("element position must be finite".into()));
            }
        }
        if let Some(size) = patch.size {
            if !is_valid_size(size) {
                return Err(DiagramError::Validation(
                    "element size must be finite and non-negative".into(),
                ));
            }
        }
        let element = self
            .elements
            .get_mut(id)
            .ok_or_else(|| DiagramError::NotFound(id.to_string()))?;

        let mut outcome = PatchOutcome::default();
        if let Some(position) = patch.position {
            outcome.moved = position != element.position;
            element.position = position;
        }
        if let Some(size) = patch.size {
            outcome.resized = size != element.size;
            element.size = size;
        }
        if let Some(properties) = &patch.properties {
            let before = element.properties.clone();
            merge_properties(&mut element.properties, properties);
            outcome.restyled = before != element.properties;
        }
        Ok(outcome)
    }

    fn link_mut(&mut self, id: &str) -> DiagramResult<&mut Link> {
        self.links
            .get_mut(id)
            .ok_or_else(|| DiagramError::NotFound(id.to_string()))
    }

    /// Insert a routing vertex at `index` (may equal the vertex count).
    pub fn insert_vertex(&mut self, link: &str, index: usize, point: Point) -> DiagramResult<()> {
        if !is_finite_point(point) {
            return Err(DiagramError::Validation("vertex must be finite".into()));
        }
        let link = self.link_mut(link)?;
        if index > link.vertices.len() {
            return Err(DiagramError::Validation(format!(
                "vertex index {index} out of range (len {})",
                link.vertices.len()
            )));
        }
        link.vertices.insert(index, point);
        Ok(())
    }

    /// Replace the routing vertex at `index`.
    pub fn update_vertex(&mut self, link: &str, index: usize, point: Point) -> DiagramResult<()> {
        if !is_finite_point(point) {
            return Err(DiagramError::Validation("vertex must be finite".into()));
        }
        let link = self.link_mut(link)?;
        let len = link.vertices.len();
        let vertex = link
            .vertices
            .get_mut(index)
            .ok_or_else(|| DiagramError::Validation(format!("vertex index {index} out of range (len {len})")))?;
        *vertex = point;
        Ok(())
    }

    /// Remove the routing vertex at `index`, returning it.
    pub fn remove_vertex(&mut self, link: &str, index: usize) -> DiagramResult<Point> {
        let link = self.link_mut(link)?;
        if index >= link.vertices.len() {
            return Err(DiagramError::Validation(format!(
                "vertex index {index} out of range (len {})",
                link.vertices.len()
            )));
        }
        Ok(link.vertices.remove(index))
    }

    /// Point one end of a link at a different element, returning the old
    /// endpoint.
    pub fn reconnect(&mut self, link: &str, end: LinkEnd, endpoint: Endpoint) -> DiagramResult<Endpoint> {
        if !self.elements.contains_key(&endpoint.id) {
            return Err(DiagramError::DanglingReference {
                link: link.to_string(),
                element: endpoint.id,
            });
        }
        let link = self.link_mut(link)?;
        let slot = match end {
            LinkEnd::Source => &mut link.source,
            LinkEnd::Target => &mut link.target,
        };
        Ok(std::mem::replace(slot, endpoint))
    }

    // --- serialization ---

    /// Serialize the document. Elements come out in z-order.
    pub fn serialize(&self) -> DocumentData {
        DocumentData {
            elements: self.elements().cloned().collect(),
            links: self.links().cloned().collect(),
        }
    }

    /// Replace the whole document with `data`.
    ///
    /// Links with a missing endpoint are skipped with a warning; any other
    /// failure leaves the model empty. Returns the ids of skipped links.
    pub fn deserialize(&mut self, data: DocumentData) -> DiagramResult<Vec<LinkId>> {
        let mut fresh = GraphModel::new(self.registry.clone());
        match fresh.load_into(data) {
            Ok(skipped) => {
                self.clear();
                fresh.retired = std::mem::take(&mut self.retired);
                *self = fresh;
                Ok(skipped)
            }
            Err(err) => {
                self.clear();
                Err(DiagramError::Deserialization(format!("failed to load document: {err}")))
            }
        }
    }

    fn load_into(&mut self, data: DocumentData) -> DiagramResult<Vec<LinkId>> {
        let mut parents = Vec::new();
        for element in &data.elements {
            let mut config = ElementConfig::from(element);
            if let Some(parent) = config.parent.take() {
                parents.push((parent, element.id.clone()));
            }
            self.add_element(config)?;
        }
        for (parent, child) in parents {
            self.embed(&parent, &child)?;
        }

        let mut skipped = Vec::new();
        for link in &data.links {
            match self.add_link(LinkConfig::from(link)) {
                Ok(_) => {}
                Err(DiagramError::DanglingReference { link, element }) => {
                    log::warn!("Skipping link {link}: endpoint {element} does not exist");
                    skipped.push(link);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(skipped)
    }
}

impl Snapshotable for GraphModel {
    type Snapshot = DocumentData;

    fn snapshot(&self) -> DocumentData {
        self.serialize()
    }

    fn restore(&mut self, snapshot: DocumentData) {
        self.clear();
        for element in snapshot.elements {
            self.z_order.push(element.id.clone());
            self.elements.insert(element.id.clone(), element);
        }
        for link in snapshot.links {
            self.link_order.push(link.id.clone());
            self.links.insert(link.id.clone(), link);
        }
    }
}
