//! Parsed response documents
//!
//! `responseXML` needs a host capability to turn markup into a tree. The
//! capability is pluggable through `DocumentParser`; with the `html`
//! feature an html5ever-backed parser handles `text/html`.

/// Lightweight document tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentNode {
    Element {
        name: String,
        children: Vec<DocumentNode>,
    },
    Text(String),
}

impl DocumentNode {
    /// Concatenated text of this node and its descendants
    pub fn text_content(&self) -> String {
        match self {
            DocumentNode::Text(text) => text.clone(),
            DocumentNode::Element { children, .. } => {
                children.iter().map(|c| c.text_content()).collect()
            }
        }
    }

    /// First element with the given local name, depth-first
    pub fn find(&self, name: &str) -> Option<&DocumentNode> {
        match self {
            DocumentNode::Element { name: n, children } => {
                if n.eq_ignore_ascii_case(name) {
                    return Some(self);
                }
                children.iter().find_map(|c| c.find(name))
            }
            DocumentNode::Text(_) => None,
        }
    }
}

/// Parsed response document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub content_type: String,
    pub root: DocumentNode,
}

impl Document {
    pub fn text_content(&self) -> String {
        self.root.text_content()
    }

    pub fn find(&self, name: &str) -> Option<&DocumentNode> {
        self.root.find(name)
    }
}

/// Host capability for parsing markup into a `Document`
pub trait DocumentParser {
    /// Can this parser handle the MIME type?
    fn supports(&self, mime: &str) -> bool;

    /// Parse markup. `None` when the source cannot be parsed.
    fn parse(&self, mime: &str, source: &str) -> Option<Document>;
}

/// Is the MIME type one `responseXML` may be produced for?
pub fn is_document_mime(mime: &str) -> bool {
    matches!(mime, "text/html" | "text/xml" | "application/xml") || mime.ends_with("+xml")
}

/// `text/html` parser built on html5ever
#[cfg(feature = "html")]
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlDocumentParser;

#[cfg(feature = "html")]
impl HtmlDocumentParser {
    pub fn new() -> Self {
        Self
    }

    fn convert(handle: &markup5ever_rcdom::Handle) -> Option<DocumentNode> {
        use markup5ever_rcdom::NodeData;

        let children = || {
            handle
                .children
                .borrow()
                .iter()
                .filter_map(Self::convert)
                .collect::<Vec<_>>()
        };

        match &handle.data {
            NodeData::Document => Some(DocumentNode::Element {
                name: "#document".to_string(),
                children: children(),
            }),
            NodeData::Element { name, .. } => Some(DocumentNode::Element {
                name: name.local.to_string(),
                children: children(),
            }),
            NodeData::Text { contents } => {
                let text = contents.borrow().to_string();
                if text.trim().is_empty() {
                    None
                } else {
                    Some(DocumentNode::Text(text))
                }
            }
            _ => None,
        }
    }
}

#[cfg(feature = "html")]
impl DocumentParser for HtmlDocumentParser {
    fn supports(&self, mime: &str) -> bool {
        mime == "text/html"
    }

    fn parse(&self, mime: &str, source: &str) -> Option<Document> {
        use html5ever::parse_document;
        use html5ever::tendril::TendrilSink;
        use markup5ever_rcdom::RcDom;

        tracing::debug!("Parsing {} response document ({} bytes)", mime, source.len());

        let dom = parse_document(RcDom::default(), Default::default())
            .from_utf8()
            .read_from(&mut source.as_bytes())
            .ok()?;

        Some(Document {
            content_type: mime.to_string(),
            root: Self::convert(&dom.document)?,
        })
    }
}
