//! Namespace-agnostic element lookup over [`roxmltree`] nodes.
//!
//! Schedule documents are matched on local element names only; publishers
//! disagree on namespace prefixes but never on element names.

use roxmltree::Node;

/// First element child with the given local name.
#[must_use]
pub fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

/// All element children with the given local name, in document order.
pub fn children<'a, 'input>(
    node: Node<'a, 'input>,
    name: &str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

/// All element children, in document order.
pub fn elements<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(Node::is_element)
}

/// All element descendants with the given local name, in document order.
pub fn descendants<'a, 'input>(
    node: Node<'a, 'input>,
    name: &str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.descendants()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

/// Follows a path of local names from `node`.
#[must_use]
pub fn path<'a, 'input>(node: Node<'a, 'input>, names: &[&str]) -> Option<Node<'a, 'input>> {
    names.iter().try_fold(node, |current, name| child(current, name))
}

/// Trimmed, non-empty text of the element at `names` below `node`.
#[must_use]
pub fn path_text<'a, 'input>(node: Node<'a, 'input>, names: &[&str]) -> Option<&'a str> {
    path(node, names).and_then(text)
}

/// Trimmed, non-empty text of the first child named `name`.
#[must_use]
pub fn child_text<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<&'a str> {
    child(node, name).and_then(text)
}

/// Trimmed, non-empty text content of `node`.
#[must_use]
pub fn text<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    node.text().map(str::trim).filter(|s| !s.is_empty())
}

/// Trimmed, non-empty attribute value.
#[must_use]
pub fn attr<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attribute(name).map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<Root xmlns="http://example.com/ns">
        <A id=" a1 "><B>  hello </B><B>second</B></A>
        <Empty>   </Empty>
    </Root>"#;

    #[test]
    fn finds_children_ignoring_namespace() {
        let doc = roxmltree::Document::parse(DOC).unwrap();
        let root = doc.root_element();
        let a = child(root, "A").unwrap();
        assert_eq!(attr(a, "id"), Some("a1"));
        assert_eq!(child_text(a, "B"), Some("hello"));
        assert_eq!(children(a, "B").count(), 2);
        assert_eq!(path_text(root, &["A", "B"]), Some("hello"));
    }

    #[test]
    fn blank_text_is_none() {
        let doc = roxmltree::Document::parse(DOC).unwrap();
        assert_eq!(child_text(doc.root_element(), "Empty"), None);
        assert!(path(doc.root_element(), &["A", "C"]).is_none());
    }

    #[test]
    fn descendants_search_whole_tree() {
        let doc = roxmltree::Document::parse(DOC).unwrap();
        assert_eq!(descendants(doc.root_element(), "B").count(), 2);
        assert_eq!(elements(doc.root_element()).count(), 2);
    }
}
