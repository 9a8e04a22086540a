//! Arena-backed document tree.

use tl_core::TallyError;
use tl_core::TallyResult;

/// ID used to address nodes in the DOM arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Single `name="value"` pair on an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// Payload stored for each node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Document,
    Element {
        tag: String,
        attributes: Vec<Attribute>,
    },
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Mutable document model. Detached nodes stay in the arena so that callers
/// holding their ids can reattach them later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::empty()
    }
}

impl Document {
    pub fn empty() -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Document,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push_node(NodeData::Element {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push_node(NodeData::Text(text.to_owned()))
    }

    fn push_node(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.node(id).map(|node| &node.data)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|node| node.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.node(id) {
            Some(node) => node.children.as_slice(),
            None => &[],
        }
    }

    /// Returns true when the node exists and is reachable from the root.
    pub fn contains(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root() {
                return true;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> TallyResult<()> {
        match self.data(parent) {
            Some(NodeData::Document | NodeData::Element { .. }) => {}
            Some(NodeData::Text(_)) => {
                return Err(TallyError::new(
                    "dom.hierarchy_invalid",
                    "text nodes cannot have children",
                ));
            }
            None => {
                return Err(TallyError::new(
                    "dom.node_missing",
                    format!("parent node {} does not exist", parent.0),
                ));
            }
        }

        if self.node(child).is_none() {
            return Err(TallyError::new(
                "dom.node_missing",
                format!("child node {} does not exist", child.0),
            ));
        }

        if child == self.root() || self.is_inclusive_ancestor(child, parent) {
            return Err(TallyError::new(
                "dom.hierarchy_invalid",
                "a node cannot be appended inside itself",
            ));
        }

        self.detach(child);
        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.node_mut(parent) {
            node.children.push(child);
        }

        Ok(())
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Unlinks the node from its parent. The subtree stays intact.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };

        if let Some(node) = self.node_mut(parent) {
            node.children.retain(|child| *child != id);
        }
        if let Some(node) = self.node_mut(id) {
            node.parent = None;
        }
    }

    /// Detaches and returns every child of `id`, in order.
    pub fn take_children(&mut self, id: NodeId) -> Vec<NodeId> {
        let children = match self.node_mut(id) {
            Some(node) => std::mem::take(&mut node.children),
            None => return Vec::new(),
        };

        for child in &children {
            if let Some(node) = self.node_mut(*child) {
                node.parent = None;
            }
        }

        children
    }

    /// Replaces the children of `id` with `children`, reattaching them in
    /// order. Returns the children that were removed.
    pub fn replace_children(
        &mut self,
        id: NodeId,
        children: Vec<NodeId>,
    ) -> TallyResult<Vec<NodeId>> {
        let previous = self.take_children(id);
        for child in children {
            self.append_child(id, child)?;
        }
        Ok(previous)
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        match self.data(id) {
            Some(NodeData::Element { tag, .. }) => Some(tag.as_str()),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId, tag: &str) -> bool {
        self.tag_name(id)
            .is_some_and(|name| name.eq_ignore_ascii_case(tag))
    }

    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        match self.data(id) {
            Some(NodeData::Element { attributes, .. }) => attributes.as_slice(),
            _ => &[],
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|attribute| attribute.name.eq_ignore_ascii_case(name))
            .map(|attribute| attribute.value.as_str())
    }

    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.attribute(id, name).is_some()
    }

    /// Sets an attribute; returns false when `id` is not an element.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> bool {
        let Some(NodeData::Element { attributes, .. }) = self.node_mut(id).map(|node| &mut node.data)
        else {
            return false;
        };

        match attributes
            .iter_mut()
            .find(|attribute| attribute.name.eq_ignore_ascii_case(name))
        {
            Some(existing) => existing.value = value.to_owned(),
            None => attributes.push(Attribute {
                name: name.to_ascii_lowercase(),
                value: value.to_owned(),
            }),
        }
        true
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) {
        if let Some(NodeData::Element { attributes, .. }) =
            self.node_mut(id).map(|node| &mut node.data)
        {
            attributes.retain(|attribute| !attribute.name.eq_ignore_ascii_case(name));
        }
    }

    pub fn classes(&self, id: NodeId) -> Vec<&str> {
        self.attribute(id, "class")
            .map(|value| value.split_ascii_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.classes(id).contains(&class)
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if self.tag_name(id).is_none() || self.has_class(id, class) {
            return;
        }

        let mut classes: Vec<String> = self.classes(id).into_iter().map(str::to_owned).collect();
        classes.push(class.to_owned());
        self.set_attribute(id, "class", &classes.join(" "));
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        if !self.has_class(id, class) {
            return;
        }

        let classes: Vec<String> = self
            .classes(id)
            .into_iter()
            .filter(|candidate| *candidate != class)
            .map(str::to_owned)
            .collect();
        self.set_attribute(id, "class", &classes.join(" "));
    }

    pub fn is_disabled(&self, id: NodeId) -> bool {
        self.has_attribute(id, "disabled")
    }

    pub fn set_disabled(&mut self, id: NodeId, disabled: bool) {
        if disabled {
            self.set_attribute(id, "disabled", "");
        } else {
            self.remove_attribute(id, "disabled");
        }
    }

    /// Concatenated text of every descendant text node.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Some(NodeData::Text(text)) = self.data(id) {
            out.push_str(text);
            return out;
        }

        for node in self.descendants(id) {
            if let Some(NodeData::Text(text)) = self.data(node) {
                out.push_str(text);
            }
        }
        out
    }

    /// Replaces every child of `id` with a single text node.
    pub fn set_text_content(&mut self, id: NodeId, text: &str) -> TallyResult<()> {
        if let Some(NodeData::Text(existing)) = self.node_mut(id).map(|node| &mut node.data) {
            *existing = text.to_owned();
            return Ok(());
        }

        let text_node = self.create_text(text);
        self.replace_children(id, vec![text_node])?;
        Ok(())
    }

    /// Pre-order descendants of `id`, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    pub fn find_descendant<F>(&self, id: NodeId, mut predicate: F) -> Option<NodeId>
    where
        F: FnMut(&Self, NodeId) -> bool,
    {
        self.descendants(id)
            .into_iter()
            .find(|candidate| predicate(self, *candidate))
    }

    pub fn first_descendant_by_tag(&self, id: NodeId, tag: &str) -> Option<NodeId> {
        self.find_descendant(id, |doc, node| doc.is_element(node, tag))
    }

    /// Nearest inclusive ancestor matching `predicate`.
    pub fn closest<F>(&self, id: NodeId, mut predicate: F) -> Option<NodeId>
    where
        F: FnMut(&Self, NodeId) -> bool,
    {
        let mut current = Some(id);
        while let Some(node) = current {
            if predicate(self, node) {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    pub fn element_by_id(&self, element_id: &str) -> Option<NodeId> {
        self.find_descendant(self.root(), |doc, node| {
            doc.attribute(node, "id") == Some(element_id)
        })
    }

    pub fn body(&self) -> Option<NodeId> {
        self.first_descendant_by_tag(self.root(), "body")
    }
}
