//! Owned XML tree for Atom responses.

use serde::Serialize;

/// An XML element with its attributes and normalized children.
///
/// Normalized means adjacent text is merged and whitespace-only text between
/// elements is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XmlElement {
    /// Local name, without prefix.
    pub name: String,
    /// Namespace URI, if the element is namespaced.
    pub namespace: Option<String>,
    pub attributes: Vec<XmlAttribute>,
    pub children: Vec<XmlNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XmlAttribute {
    pub name: String,
    pub namespace: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

impl XmlElement {
    /// Parses a document and returns its normalized root element.
    ///
    /// # Errors
    ///
    /// Returns the parser error for malformed input.
    pub fn parse(text: &str) -> Result<Self, roxmltree::Error> {
        let document = roxmltree::Document::parse(text)?;
        Ok(Self::from_node(document.root_element()))
    }

    fn from_node(node: roxmltree::Node<'_, '_>) -> Self {
        let attributes = node
            .attributes()
            .map(|attr| XmlAttribute {
                name: attr.name().to_string(),
                namespace: attr.namespace().map(str::to_string),
                value: attr.value().to_string(),
            })
            .collect();

        let mut children: Vec<XmlNode> = Vec::new();
        for child in node.children() {
            if child.is_element() {
                children.push(XmlNode::Element(Self::from_node(child)));
            } else if child.is_text() {
                let Some(text) = child.text() else { continue };
                if let Some(XmlNode::Text(previous)) = children.last_mut() {
                    previous.push_str(text);
                } else {
                    children.push(XmlNode::Text(text.to_string()));
                }
            }
        }
        children.retain(|c| !matches!(c, XmlNode::Text(t) if t.trim().is_empty()));

        Self {
            name: node.tag_name().name().to_string(),
            namespace: node.tag_name().namespace().map(str::to_string),
            attributes,
            children,
        }
    }

    /// Child elements, in document order.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// Child elements with the given local name.
    pub fn elements_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |e| e.name == name)
    }

    /// First child element with the given local name.
    #[must_use]
    pub fn element(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.name == name)
    }

    /// Concatenated direct text content.
    #[must_use]
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|c| match c {
                XmlNode::Text(t) => Some(t.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }
}
