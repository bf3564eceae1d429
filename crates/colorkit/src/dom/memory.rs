//! In-memory document.
//!
//! Behaves like a browser document for the parts the engines use: mutations
//! are queued per observer and handed over on [`MemoryDom::deliver_mutations`],
//! the analog of the microtask checkpoint. Geometry and page-owned computed
//! styles are set explicitly by whoever builds the fixture.

use std::cell::RefCell;
use std::collections::HashMap;

use super::selector::{ElementTree, Selector};
use super::{
    Dom, DomEvent, EventCallback, EventKind, ListenerId, MutationCallback, MutationKind,
    MutationRecord, NodeId, ObserveOptions, ObserverId, Rect, parse_style,
};

/// Delivery rounds per checkpoint before giving up on a callback feedback loop.
const MAX_DELIVERY_ROUNDS: usize = 8;

#[derive(Debug, Default)]
struct Node {
    tag: String,
    attributes: Vec<(String, String)>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    text: String,
    rect: Rect,
    page_styles: HashMap<String, String>,
}

struct ObserverEntry {
    id: ObserverId,
    target: NodeId,
    options: ObserveOptions,
    callback: MutationCallback,
    pending: Vec<MutationRecord>,
}

struct State {
    nodes: Vec<Node>,
    root: NodeId,
    head: NodeId,
    body: NodeId,
    href: String,
    observers: Vec<ObserverEntry>,
    listeners: Vec<(ListenerId, EventKind, EventCallback)>,
    next_id: u64,
}

impl ElementTree for State {
    fn tag_of(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node.0).map(|n| n.tag.as_str())
    }

    fn attribute_of(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes
            .get(node.0)?
            .attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn parent_of(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0)?.parent
    }
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn new_node(&mut self, tag: &str) -> NodeId {
        self.nodes.push(Node {
            tag: tag.to_ascii_lowercase(),
            ..Default::default()
        });
        NodeId(self.nodes.len() - 1)
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.parent_of(n);
        }
        false
    }

    fn record(&mut self, target: NodeId, kind: MutationKind) {
        let observed: Vec<usize> = self
            .observers
            .iter()
            .enumerate()
            .filter(|(_, o)| {
                let in_scope = o.target == target
                    || (o.options.subtree && self.is_inclusive_ancestor(o.target, target));
                let wanted = match &kind {
                    MutationKind::ChildList { .. } => o.options.child_list,
                    MutationKind::Attribute { name } => o.options.wants_attribute(name),
                };
                in_scope && wanted
            })
            .map(|(i, _)| i)
            .collect();
        for i in observed {
            self.observers[i].pending.push(MutationRecord {
                target,
                kind: kind.clone(),
            });
        }
    }

    fn detach(&mut self, node: NodeId) -> Option<NodeId> {
        let parent = self.nodes.get_mut(node.0)?.parent.take()?;
        if let Some(p) = self.nodes.get_mut(parent.0) {
            p.children.retain(|c| *c != node);
        }
        Some(parent)
    }

    fn descendants(&self, root: NodeId, out: &mut Vec<NodeId>) {
        let Some(node) = self.nodes.get(root.0) else {
            return;
        };
        for &child in &node.children {
            out.push(child);
            self.descendants(child, out);
        }
    }

    fn text_of(&self, node: NodeId, out: &mut String) {
        let Some(n) = self.nodes.get(node.0) else {
            return;
        };
        out.push_str(&n.text);
        for &child in &n.children {
            self.text_of(child, out);
        }
    }
}

/// Document held entirely in memory.
pub struct MemoryDom {
    state: RefCell<State>,
}

impl Default for MemoryDom {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDom {
    /// An empty `<html><head/><body/></html>` document.
    pub fn new() -> Self {
        let mut state = State {
            nodes: Vec::new(),
            root: NodeId(0),
            head: NodeId(0),
            body: NodeId(0),
            href: "about:blank".to_string(),
            observers: Vec::new(),
            listeners: Vec::new(),
            next_id: 0,
        };
        let root = state.new_node("html");
        let head = state.new_node("head");
        let body = state.new_node("body");
        for child in [head, body] {
            state.nodes[child.0].parent = Some(root);
            state.nodes[root.0].children.push(child);
        }
        state.root = root;
        state.head = head;
        state.body = body;
        Self {
            state: RefCell::new(state),
        }
    }

    /// Create `tag` with `attributes` under `parent`.
    pub fn element(&self, parent: NodeId, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
        let node = self.create_element(tag);
        {
            let mut state = self.state.borrow_mut();
            state.nodes[node.0].attributes = attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
        }
        self.append_child(parent, node);
        node
    }

    /// Append several detached nodes as one mutation, the way a framework
    /// swaps in a rendered fragment.
    pub fn append_children(&self, parent: NodeId, children: &[NodeId]) {
        let mut state = self.state.borrow_mut();
        for &child in children {
            state.detach(child);
            state.nodes[child.0].parent = Some(parent);
            state.nodes[parent.0].children.push(child);
        }
        state.record(
            parent,
            MutationKind::ChildList {
                added: children.len(),
                removed: 0,
            },
        );
    }

    pub fn set_rect(&self, node: NodeId, rect: Rect) {
        if let Some(n) = self.state.borrow_mut().nodes.get_mut(node.0) {
            n.rect = rect;
        }
    }

    /// Style the page itself resolves for `node`, losing only to inline
    /// `!important` declarations.
    pub fn set_page_style(&self, node: NodeId, property: &str, value: &str) {
        if let Some(n) = self.state.borrow_mut().nodes.get_mut(node.0) {
            n.page_styles.insert(property.to_string(), value.to_string());
        }
    }

    /// Client-side navigation: the URL changes without any mutation record.
    pub fn set_location(&self, href: &str) {
        self.state.borrow_mut().href = href.to_string();
    }

    /// Dispatch an event to the registered listeners.
    pub fn dispatch(&self, event: DomEvent) {
        let listeners: Vec<EventCallback> = self
            .state
            .borrow()
            .listeners
            .iter()
            .filter(|(_, kind, _)| *kind == event.kind())
            .map(|(_, _, cb)| cb.clone())
            .collect();
        for listener in listeners {
            listener(&event);
        }
    }

    pub fn click(&self, node: NodeId) {
        self.dispatch(DomEvent::Click { target: node });
    }

    /// Hand queued mutation records to their observers. Returns the number of
    /// batches delivered.
    pub fn deliver_mutations(&self) -> usize {
        let mut delivered = 0;
        for _ in 0..MAX_DELIVERY_ROUNDS {
            let batches: Vec<(MutationCallback, Vec<MutationRecord>)> = self
                .state
                .borrow_mut()
                .observers
                .iter_mut()
                .filter(|o| !o.pending.is_empty())
                .map(|o| (o.callback.clone(), std::mem::take(&mut o.pending)))
                .collect();
            if batches.is_empty() {
                break;
            }
            for (callback, records) in batches {
                callback(&records);
                delivered += 1;
            }
        }
        delivered
    }

    pub fn observer_count(&self) -> usize {
        self.state.borrow().observers.len()
    }

    pub fn listener_count(&self) -> usize {
        self.state.borrow().listeners.len()
    }
}

impl Dom for MemoryDom {
    fn document_element(&self) -> NodeId {
        self.state.borrow().root
    }

    fn head(&self) -> NodeId {
        self.state.borrow().head
    }

    fn body(&self) -> NodeId {
        self.state.borrow().body
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.state.borrow().parent_of(node)
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.state
            .borrow()
            .nodes
            .get(node.0)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn tag_name(&self, node: NodeId) -> String {
        self.state
            .borrow()
            .tag_of(node)
            .unwrap_or_default()
            .to_string()
    }

    fn is_connected(&self, node: NodeId) -> bool {
        let state = self.state.borrow();
        state.is_inclusive_ancestor(state.root, node)
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.state
            .borrow()
            .attribute_of(node, name)
            .map(str::to_string)
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        let mut state = self.state.borrow_mut();
        let Some(n) = state.nodes.get_mut(node.0) else {
            return;
        };
        match n.attributes.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => n.attributes.push((name.to_string(), value.to_string())),
        }
        state.record(
            node,
            MutationKind::Attribute {
                name: name.to_string(),
            },
        );
    }

    fn remove_attribute(&self, node: NodeId, name: &str) {
        let mut state = self.state.borrow_mut();
        let Some(n) = state.nodes.get_mut(node.0) else {
            return;
        };
        let before = n.attributes.len();
        n.attributes.retain(|(k, _)| k != name);
        if n.attributes.len() != before {
            state.record(
                node,
                MutationKind::Attribute {
                    name: name.to_string(),
                },
            );
        }
    }

    fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.state.borrow().text_of(node, &mut out);
        out
    }

    fn set_text_content(&self, node: NodeId, text: &str) {
        let mut state = self.state.borrow_mut();
        let removed = match state.nodes.get_mut(node.0) {
            Some(n) => {
                n.text = text.to_string();
                std::mem::take(&mut n.children)
            }
            None => return,
        };
        for child in &removed {
            state.nodes[child.0].parent = None;
        }
        state.record(
            node,
            MutationKind::ChildList {
                added: 1,
                removed: removed.len(),
            },
        );
    }

    fn bounding_rect(&self, node: NodeId) -> Rect {
        self.state
            .borrow()
            .nodes
            .get(node.0)
            .map(|n| n.rect)
            .unwrap_or_default()
    }

    fn computed_style(&self, node: NodeId, property: &str) -> Option<String> {
        let state = self.state.borrow();
        let n = state.nodes.get(node.0)?;
        let inline = state
            .attribute_of(node, "style")
            .map(parse_style)
            .unwrap_or_default()
            .into_iter()
            .find(|d| d.property == property);
        match (inline, n.page_styles.get(property)) {
            (Some(decl), _) if decl.important => Some(decl.value),
            (_, Some(page)) => Some(page.clone()),
            (Some(decl), None) => Some(decl.value),
            (None, None) => None,
        }
    }

    fn create_element(&self, tag: &str) -> NodeId {
        self.state.borrow_mut().new_node(tag)
    }

    fn append_child(&self, parent: NodeId, child: NodeId) {
        self.append_children(parent, &[child]);
    }

    fn remove(&self, node: NodeId) {
        let mut state = self.state.borrow_mut();
        if let Some(parent) = state.detach(node) {
            state.record(
                parent,
                MutationKind::ChildList {
                    added: 0,
                    removed: 1,
                },
            );
        }
    }

    fn element_by_id(&self, id: &str) -> Option<NodeId> {
        let state = self.state.borrow();
        let mut all = Vec::new();
        state.descendants(state.root, &mut all);
        all.into_iter()
            .find(|&n| state.attribute_of(n, "id") == Some(id))
    }

    fn query_all(&self, root: NodeId, selector: &str) -> Vec<NodeId> {
        let Some(parsed) = Selector::parse(selector) else {
            tracing::debug!("MemoryDom: unsupported selector {selector:?}");
            return Vec::new();
        };
        let state = self.state.borrow();
        let mut all = Vec::new();
        state.descendants(root, &mut all);
        all.retain(|&n| parsed.matches(&*state, n));
        all
    }

    fn matches(&self, node: NodeId, selector: &str) -> bool {
        Selector::parse(selector).is_some_and(|s| s.matches(&*self.state.borrow(), node))
    }

    fn location_href(&self) -> String {
        self.state.borrow().href.clone()
    }

    fn observe(
        &self,
        target: NodeId,
        options: ObserveOptions,
        callback: MutationCallback,
    ) -> ObserverId {
        let mut state = self.state.borrow_mut();
        let id = ObserverId(state.next_id());
        state.observers.push(ObserverEntry {
            id,
            target,
            options,
            callback,
            pending: Vec::new(),
        });
        id
    }

    fn disconnect(&self, id: ObserverId) {
        self.state.borrow_mut().observers.retain(|o| o.id != id);
    }

    fn add_event_listener(&self, kind: EventKind, callback: EventCallback) -> ListenerId {
        let mut state = self.state.borrow_mut();
        let id = ListenerId(state.next_id());
        state.listeners.push((id, kind, callback));
        id
    }

    fn remove_event_listener(&self, id: ListenerId) {
        self.state
            .borrow_mut()
            .listeners
            .retain(|(listener, _, _)| *listener != id);
    }
}
