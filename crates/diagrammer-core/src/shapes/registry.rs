//! Type registry mapping element/link tags to their constructors.

use super::{
    merge_properties, Element, ElementConfig, ElementId, Link, LinkConfig, LinkId, Properties,
};
use crate::error::{DiagramError, DiagramResult};
use kurbo::{Point, Size};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;

/// Builds an [`Element`] from a validated config.
///
/// The graph guarantees `position` and `size` are present and valid
/// before calling.
pub trait ElementBuilder: Send + Sync {
    fn build(&self, id: ElementId, config: &ElementConfig) -> Element;
}

/// Builds a [`Link`] from a config whose endpoints already resolve.
pub trait LinkBuilder: Send + Sync {
    fn build(&self, id: LinkId, config: &LinkConfig) -> Link;
}

/// Element constructor that layers config properties over defaults.
#[derive(Debug, Clone, Default)]
pub struct ShapeTemplate {
    pub default_properties: Properties,
}

impl ShapeTemplate {
    pub fn new(default_properties: Properties) -> Self {
        Self { default_properties }
    }

    fn primitive(name: &str) -> Self {
        let mut props = Properties::new();
        props.insert("primitive".into(), Value::String(name.to_string()));
        props.insert("label".into(), json!(""));
        Self::new(props)
    }
}

impl ElementBuilder for ShapeTemplate {
    fn build(&self, id: ElementId, config: &ElementConfig) -> Element {
        let mut properties = self.default_properties.clone();
        merge_properties(&mut properties, &config.properties);
        Element {
            id,
            kind: config.kind.clone(),
            position: config.position.unwrap_or(Point::ZERO),
            size: config.size.unwrap_or(Size::ZERO),
            properties,
            parent: None,
        }
    }
}

/// Link constructor that layers config properties over defaults.
#[derive(Debug, Clone, Default)]
pub struct LinkTemplate {
    pub default_properties: Properties,
}

impl LinkTemplate {
    pub fn new(default_properties: Properties) -> Self {
        Self { default_properties }
    }

    fn router(name: &str) -> Self {
        let mut props = Properties::new();
        props.insert("router".into(), Value::String(name.to_string()));
        Self::new(props)
    }
}

impl LinkBuilder for LinkTemplate {
    fn build(&self, id: LinkId, config: &LinkConfig) -> Link {
        let mut properties = self.default_properties.clone();
        merge_properties(&mut properties, &config.properties);
        Link {
            id,
            kind: config.kind.clone(),
            source: config.source.clone().unwrap_or_else(|| super::Endpoint::element("")),
            target: config.target.clone().unwrap_or_else(|| super::Endpoint::element("")),
            vertices: config.vertices.clone(),
            properties,
        }
    }
}

/// Registry of element and link constructors.
///
/// Passed to each [`GraphModel`](crate::GraphModel) explicitly so that
/// independent engines can run with different type sets.
#[derive(Default)]
pub struct ShapeRegistry {
    elements: HashMap<String, Box<dyn ElementBuilder>>,
    links: HashMap<String, Box<dyn LinkBuilder>>,
}

impl fmt::Debug for ShapeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut elements: Vec<_> = self.elements.keys().collect();
        let mut links: Vec<_> = self.links.keys().collect();
        elements.sort();
        links.sort();
        f.debug_struct("ShapeRegistry")
            .field("elements", &elements)
            .field("links", &links)
            .finish()
    }
}

impl ShapeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in basic shapes and link types.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_element("rectangle", ShapeTemplate::primitive("rect"));
        registry.register_element("circle", ShapeTemplate::primitive("ellipse"));
        registry.register_element("ellipse", ShapeTemplate::primitive("ellipse"));
        registry.register_element("diamond", ShapeTemplate::primitive("polygon"));
        registry.register_element("text", ShapeTemplate::primitive("text"));
        registry.register_link("link", LinkTemplate::router("normal"));
        registry.register_link("orthogonal", LinkTemplate::router("orthogonal"));
        registry
    }

    /// Register (or replace) an element constructor.
    pub fn register_element(&mut self, kind: impl Into<String>, builder: impl ElementBuilder + 'static) {
        self.elements.insert(kind.into(), Box::new(builder));
    }

    /// Register (or replace) a link constructor.
    pub fn register_link(&mut self, kind: impl Into<String>, builder: impl LinkBuilder + 'static) {
        self.links.insert(kind.into(), Box::new(builder));
    }

    pub fn has_element_type(&self, kind: &str) -> bool {
        self.elements.contains_key(kind)
    }

    pub fn has_link_type(&self, kind: &str) -> bool {
        self.links.contains_key(kind)
    }

    /// Construct an element, failing if the type is unregistered.
    pub fn build_element(&self, id: ElementId, config: &ElementConfig) -> DiagramResult<Element> {
        let builder = self
            .elements
            .get(&config.kind)
            .ok_or_else(|| DiagramError::UnknownType(config.kind.clone()))?;
        Ok(builder.build(id, config))
    }

    /// Construct a link, failing if the type is unregistered.
    pub fn build_link(&self, id: LinkId, config: &LinkConfig) -> DiagramResult<Link> {
        let builder = self
            .links
            .get(&config.kind)
            .ok_or_else(|| DiagramError::UnknownType(config.kind.clone()))?;
        Ok(builder.build(id, config))
    }
}
