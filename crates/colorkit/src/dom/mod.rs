//! Host document seam.
//!
//! The engines never touch a browser directly; they talk to a [`Dom`]. The
//! trait covers what the calendar engines need: tree navigation, attributes,
//! inline and computed style, rendered geometry, element creation, mutation
//! observation and the two window events we react to.
//!
//! [`MemoryDom`] is the in-process implementation used by the tests and the
//! CLI.

mod memory;
mod selector;

use std::rc::Rc;

pub use memory::MemoryDom;
pub use selector::Selector;

/// Handle to an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// Rendered box in page pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn center_x(&self) -> f64 {
        self.left + self.width / 2.0
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// What changed in a mutation record.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationKind {
    ChildList { added: usize, removed: usize },
    Attribute { name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub kind: MutationKind,
}

impl MutationRecord {
    pub fn added_nodes(&self) -> usize {
        match self.kind {
            MutationKind::ChildList { added, .. } => added,
            MutationKind::Attribute { .. } => 0,
        }
    }

    pub fn attribute_name(&self) -> Option<&str> {
        match &self.kind {
            MutationKind::Attribute { name } => Some(name),
            MutationKind::ChildList { .. } => None,
        }
    }
}

/// Which mutations an observer wants.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObserveOptions {
    pub child_list: bool,
    pub subtree: bool,
    pub attributes: bool,
    /// Restrict attribute records to these names.
    pub attribute_filter: Option<Vec<String>>,
}

impl ObserveOptions {
    pub fn child_list_subtree() -> Self {
        Self {
            child_list: true,
            subtree: true,
            ..Default::default()
        }
    }

    pub fn with_attributes(mut self, names: &[&str]) -> Self {
        self.attributes = true;
        self.attribute_filter = Some(names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn all_attributes(mut self) -> Self {
        self.attributes = true;
        self.attribute_filter = None;
        self
    }

    pub fn wants_attribute(&self, name: &str) -> bool {
        self.attributes
            && self
                .attribute_filter
                .as_ref()
                .is_none_or(|names| names.iter().any(|n| n == name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// Window and document events the engines listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Click,
    Resize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DomEvent {
    Click { target: NodeId },
    Resize,
}

impl DomEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Click { .. } => EventKind::Click,
            Self::Resize => EventKind::Resize,
        }
    }
}

pub type MutationCallback = Rc<dyn Fn(&[MutationRecord])>;
pub type EventCallback = Rc<dyn Fn(&DomEvent)>;

/// The page as seen by the engines.
///
/// Methods take `&self`; implementations use interior mutability the way a
/// browser document is shared. Operations on removed nodes are no-ops.
pub trait Dom {
    /// The root element (`<html>`).
    fn document_element(&self) -> NodeId;
    fn head(&self) -> NodeId;
    fn body(&self) -> NodeId;

    fn parent(&self, node: NodeId) -> Option<NodeId>;
    fn children(&self, node: NodeId) -> Vec<NodeId>;
    fn tag_name(&self, node: NodeId) -> String;
    fn is_connected(&self, node: NodeId) -> bool;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;
    fn set_attribute(&self, node: NodeId, name: &str, value: &str);
    fn remove_attribute(&self, node: NodeId, name: &str);

    /// Concatenated text of the node and its descendants.
    fn text_content(&self, node: NodeId) -> String;
    fn set_text_content(&self, node: NodeId, text: &str);

    fn bounding_rect(&self, node: NodeId) -> Rect;
    /// The value the page actually renders for `property`.
    fn computed_style(&self, node: NodeId, property: &str) -> Option<String>;

    fn create_element(&self, tag: &str) -> NodeId;
    fn append_child(&self, parent: NodeId, child: NodeId);
    fn remove(&self, node: NodeId);

    fn element_by_id(&self, id: &str) -> Option<NodeId>;
    /// Descendants of `root` (not `root` itself) matching `selector`, in
    /// document order.
    fn query_all(&self, root: NodeId, selector: &str) -> Vec<NodeId>;
    fn matches(&self, node: NodeId, selector: &str) -> bool;

    fn location_href(&self) -> String;

    fn observe(
        &self,
        target: NodeId,
        options: ObserveOptions,
        callback: MutationCallback,
    ) -> ObserverId;
    /// Stop an observer. Unknown ids are ignored.
    fn disconnect(&self, id: ObserverId);

    fn add_event_listener(&self, kind: EventKind, callback: EventCallback) -> ListenerId;
    fn remove_event_listener(&self, id: ListenerId);

    fn query(&self, root: NodeId, selector: &str) -> Option<NodeId> {
        self.query_all(root, selector).into_iter().next()
    }

    /// Nearest inclusive ancestor matching `selector`.
    fn closest(&self, node: NodeId, selector: &str) -> Option<NodeId> {
        let mut current = Some(node);
        while let Some(candidate) = current {
            if self.matches(candidate, selector) {
                return Some(candidate);
            }
            current = self.parent(candidate);
        }
        None
    }

    fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attribute(node, "class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }

    /// Inline style value for `property`, without any `!important` suffix.
    fn inline_style(&self, node: NodeId, property: &str) -> Option<String> {
        let style = self.attribute(node, "style")?;
        parse_style(&style)
            .into_iter()
            .find(|d| d.property == property)
            .map(|d| d.value)
    }

    fn set_inline_style(&self, node: NodeId, property: &str, value: &str, important: bool) {
        let current = self.attribute(node, "style").unwrap_or_default();
        let mut declarations = parse_style(&current);
        declarations.retain(|d| d.property != property);
        declarations.push(StyleDeclaration {
            property: property.to_string(),
            value: value.to_string(),
            important,
        });
        let next = format_style(&declarations);
        if next != current {
            self.set_attribute(node, "style", &next);
        }
    }

    fn remove_inline_style(&self, node: NodeId, property: &str) {
        let Some(current) = self.attribute(node, "style") else {
            return;
        };
        let mut declarations = parse_style(&current);
        let before = declarations.len();
        declarations.retain(|d| d.property != property);
        if declarations.len() == before {
            return;
        }
        if declarations.is_empty() {
            self.remove_attribute(node, "style");
        } else {
            self.set_attribute(node, "style", &format_style(&declarations));
        }
    }
}

/// One `property: value [!important]` entry of a style attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleDeclaration {
    pub property: String,
    pub value: String,
    pub important: bool,
}

/// Parse a `style` attribute into declarations.
pub fn parse_style(style: &str) -> Vec<StyleDeclaration> {
    style
        .split(';')
        .filter_map(|decl| {
            let (property, value) = decl.split_once(':')?;
            let property = property.trim().to_ascii_lowercase();
            let value = value.trim();
            if property.is_empty() || value.is_empty() {
                return None;
            }
            let (value, important) = match value.strip_suffix("!important") {
                Some(v) => (v.trim(), true),
                None => (value, false),
            };
            Some(StyleDeclaration {
                property,
                value: value.to_string(),
                important,
            })
        })
        .collect()
}

pub fn format_style(declarations: &[StyleDeclaration]) -> String {
    declarations
        .iter()
        .map(|d| {
            if d.important {
                format!("{}: {} !important;", d.property, d.value)
            } else {
                format!("{}: {};", d.property, d.value)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_style() {
        let decls = parse_style("color: red; background-color: rgba(0, 0, 0, 0.5) !important;");
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[1].property, "background-color");
        assert_eq!(decls[1].value, "rgba(0, 0, 0, 0.5)");
        assert!(decls[1].important);
        assert!(!decls[0].important);
    }

    #[test]
    fn test_format_style_roundtrips_shape() {
        let decls = parse_style("top: 360px; height: 60px");
        assert_eq!(format_style(&decls), "top: 360px; height: 60px;");
    }

    #[test]
    fn test_observe_options_filter() {
        let options = ObserveOptions::child_list_subtree().with_attributes(&["data-viewkey"]);
        assert!(options.wants_attribute("data-viewkey"));
        assert!(!options.wants_attribute("style"));
        let all = ObserveOptions::default().all_attributes();
        assert!(all.wants_attribute("style"));
        assert!(!ObserveOptions::child_list_subtree().wants_attribute("style"));
    }
}
