use indexmap::IndexSet;
use roxmltree::Node;
use wpsprobe_types::{ProcessDescriptor, WpsError};

use super::names::{child_any, children_any, element_name, has_name};
use super::{decode_utf8, exception_report_error, identifier_of, parse_document};

// WPS 1.0.0 leaves these elements unqualified; some servers put them in the wps namespace.
const PROCESS_DESCRIPTION: &[&str] = &["ProcessDescription", "wps:ProcessDescription"];
const DATA_INPUTS: &[&str] = &["DataInputs", "wps:DataInputs"];
const INPUT: &[&str] = &["Input", "wps:Input"];
const PROCESS_OUTPUTS: &[&str] = &["ProcessOutputs", "wps:ProcessOutputs"];
const OUTPUT: &[&str] = &["Output", "wps:Output"];

/// Decode a `DescribeProcess` response and return the description of `identifier`.
pub fn parse_process_description(raw: &[u8], identifier: &str) -> Result<ProcessDescriptor, WpsError> {
    let text = decode_utf8(raw)?;
    let document = parse_document(text)?;
    let root = document.root_element();

    if has_name(root, "ows:ExceptionReport") {
        return Err(exception_report_error(root));
    }
    if !has_name(root, "wps:ProcessDescriptions") {
        return Err(WpsError::parse(format!(
            "expected wps:ProcessDescriptions, found '{}'",
            element_name(root)
        )));
    }

    let description = children_any(root, PROCESS_DESCRIPTION)
        .find(|description| identifier_of(*description).as_deref() == Some(identifier))
        .ok_or_else(|| WpsError::parse(format!("no ProcessDescription for '{identifier}'")))?;

    Ok(ProcessDescriptor {
        identifier: identifier.to_string(),
        inputs: declared_identifiers(description, DATA_INPUTS, INPUT)?,
        outputs: declared_identifiers(description, PROCESS_OUTPUTS, OUTPUT)?,
    })
}

fn declared_identifiers(
    description: Node<'_, '_>,
    container: &[&str],
    item: &'static [&'static str],
) -> Result<IndexSet<String>, WpsError> {
    let Some(container) = child_any(description, container) else {
        return Ok(IndexSet::new());
    };
    children_any(container, item)
        .map(|node| {
            identifier_of(node)
                .ok_or_else(|| WpsError::parse(format!("{} without ows:Identifier", element_name(node))))
        })
        .collect()
}
