//! Namespace normalization.
//!
//! Every element and attribute is addressed as `prefix:localname`. Namespaces of
//! the WPS vocabularies map to fixed prefixes regardless of how the document binds
//! them; any other namespace keeps the prefix declared in the document, and
//! unqualified names stay bare.

use roxmltree::Node;

pub(crate) const XLINK_NAMESPACE: &str = "http://www.w3.org/1999/xlink";
const WPS_NAMESPACE_PREFIX: &str = "http://www.opengis.net/wps/";
const OWS_NAMESPACE_PREFIX: &str = "http://www.opengis.net/ows/";
const OWS_NAMESPACE_BARE: &str = "http://www.opengis.net/ows";

fn canonical_prefix(uri: &str) -> Option<&'static str> {
    if uri == XLINK_NAMESPACE {
        Some("xlink")
    } else if uri.starts_with(WPS_NAMESPACE_PREFIX) {
        Some("wps")
    } else if uri.starts_with(OWS_NAMESPACE_PREFIX) || uri == OWS_NAMESPACE_BARE {
        Some("ows")
    } else {
        None
    }
}

/// Normalized `prefix:localname` for a name found on `node`.
pub(crate) fn normalize(node: Node<'_, '_>, namespace: Option<&str>, local: &str) -> String {
    let Some(uri) = namespace else {
        return local.to_string();
    };
    if let Some(prefix) = canonical_prefix(uri) {
        return format!("{prefix}:{local}");
    }
    match node.namespaces().find(|ns| ns.uri() == uri).and_then(|ns| ns.name()) {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

pub(crate) fn element_name(node: Node<'_, '_>) -> String {
    let tag = node.tag_name();
    normalize(node, tag.namespace(), tag.name())
}

pub(crate) fn has_name(node: Node<'_, '_>, qualified: &str) -> bool {
    node.is_element() && node.tag_name().name() == local_part(qualified) && element_name(node) == qualified
}

fn local_part(qualified: &str) -> &str {
    qualified.rsplit_once(':').map_or(qualified, |(_, local)| local)
}

/// First element child called `qualified`.
pub(crate) fn child<'a, 'input>(node: Node<'a, 'input>, qualified: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|candidate| has_name(*candidate, qualified))
}

/// First element child matching any of `names`.
pub(crate) fn child_any<'a, 'input>(node: Node<'a, 'input>, names: &[&str]) -> Option<Node<'a, 'input>> {
    node.children().find(|candidate| names.iter().any(|name| has_name(*candidate, name)))
}

/// Every element child called `qualified`, in document order.
pub(crate) fn children<'a, 'input>(node: Node<'a, 'input>, qualified: &'static str) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(move |candidate| has_name(*candidate, qualified))
}

/// Element children matching any of `names`, in document order.
pub(crate) fn children_any<'a, 'input>(node: Node<'a, 'input>, names: &'static [&'static str]) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(move |candidate| names.iter().any(|name| has_name(*candidate, name)))
}

pub(crate) fn attribute<'a>(node: Node<'a, '_>, qualified: &str) -> Option<&'a str> {
    node.attributes()
        .find(|attr| attr.name() == local_part(qualified) && normalize(node, attr.namespace(), attr.name()) == qualified)
        .map(|attr| attr.value())
}

/// Concatenated, trimmed text of `node` and its descendants.
pub(crate) fn text_content(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(|descendant| descendant.is_text())
        .filter_map(|descendant| descendant.text())
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use roxmltree::Document;

    use super::*;

    #[test]
    fn default_and_unusual_prefixes_map_to_canonical_names() {
        let xml = r#"<ExecuteResponse xmlns="http://www.opengis.net/wps/1.0.0"
                xmlns:o="http://www.opengis.net/ows/1.1"
                xmlns:lnk="http://www.w3.org/1999/xlink"
                xmlns:ext="urn:example:ext">
              <Process><o:Identifier>x</o:Identifier></Process>
              <ext:Note lnk:href="http://a/b" plain="1"/>
            </ExecuteResponse>"#;
        let document = Document::parse(xml).unwrap();
        let root = document.root_element();
        assert_eq!(element_name(root), "wps:ExecuteResponse");

        let process = child(root, "wps:Process").expect("process");
        let identifier = child(process, "ows:Identifier").expect("identifier");
        assert_eq!(text_content(identifier), "x");

        let note = child(root, "ext:Note").expect("note keeps its own prefix");
        assert_eq!(attribute(note, "xlink:href"), Some("http://a/b"));
        assert_eq!(attribute(note, "plain"), Some("1"));
        assert_eq!(attribute(note, "href"), None);
    }

    #[test]
    fn unqualified_elements_stay_bare() {
        let document = Document::parse("<root><Input/><wps:Input xmlns:wps=\"http://www.opengis.net/wps/1.0.0\"/></root>").unwrap();
        let root = document.root_element();
        assert_eq!(children(root, "Input").count(), 1);
        assert_eq!(children_any(root, &["Input", "wps:Input"]).count(), 2);
    }
}
