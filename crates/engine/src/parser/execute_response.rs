use indexmap::IndexMap;
use roxmltree::Node;
use tracing::debug;
use wpsprobe_types::{ExecutionResult, ExecutionStatus, OutputValue, WpsError};
use wpsprobe_util::parse_creation_time;

use super::names::{attribute, child, children, element_name, has_name, text_content};
use super::{decode_utf8, exception_report_error, exception_texts, identifier_of, missing, parse_document};

/// Decode an execute-response or status document.
///
/// The status markers are inspected in the order Failed, Accepted, Started,
/// Succeeded; outputs are only read for a succeeded job.
///
/// # Errors
/// - [`WpsError::Parse`] for malformed XML, non UTF-8 input, exception reports and
///   missing mandatory elements or attributes
/// - [`WpsError::UnsupportedOutputShape`] for outputs that are neither literal data
///   nor a reference
pub fn parse_execute_response(raw: &[u8]) -> Result<ExecutionResult, WpsError> {
    let text = decode_utf8(raw)?;
    let document = parse_document(text)?;
    let root = document.root_element();

    if has_name(root, "ows:ExceptionReport") {
        return Err(exception_report_error(root));
    }
    if !has_name(root, "wps:ExecuteResponse") {
        return Err(WpsError::parse(format!(
            "expected wps:ExecuteResponse, found '{}'",
            element_name(root)
        )));
    }

    let status_location = attribute(root, "statusLocation")
        .map(str::trim)
        .filter(|location| !location.is_empty())
        .map(str::to_string);

    let process = child(root, "wps:Process").ok_or_else(|| missing("wps:Process"))?;
    let process_identifier = identifier_of(process).ok_or_else(|| missing("wps:Process/ows:Identifier"))?;

    let status_node = child(root, "wps:Status").ok_or_else(|| missing("wps:Status"))?;
    let raw_creation_time = attribute(status_node, "creationTime").ok_or_else(|| missing("wps:Status/@creationTime"))?;
    let creation_time = parse_creation_time(raw_creation_time);
    if creation_time.is_none() {
        debug!(process = %process_identifier, creation_time = raw_creation_time, "unrecognised creationTime layout");
    }

    let (status, status_message) = parse_status(status_node)?;

    let outputs = if status == ExecutionStatus::Succeeded {
        let process_outputs = child(root, "wps:ProcessOutputs").ok_or_else(|| missing("wps:ProcessOutputs"))?;
        parse_outputs(process_outputs)?
    } else {
        IndexMap::new()
    };

    Ok(ExecutionResult {
        process_identifier,
        raw_creation_time: raw_creation_time.to_string(),
        creation_time,
        status,
        status_message,
        status_location,
        outputs,
    })
}

fn parse_status(status_node: Node<'_, '_>) -> Result<(ExecutionStatus, Option<String>), WpsError> {
    if let Some(failed) = child(status_node, "wps:ProcessFailed") {
        let message = exception_texts(failed).or_else(|| non_empty(text_content(failed)));
        return Ok((ExecutionStatus::Failed, message));
    }
    if let Some(accepted) = child(status_node, "wps:ProcessAccepted") {
        return Ok((ExecutionStatus::Accepted, non_empty(text_content(accepted))));
    }
    if let Some(started) = child(status_node, "wps:ProcessStarted") {
        let percent_complete = match attribute(started, "percentCompleted").map(str::trim) {
            None | Some("") => 0.0,
            Some(raw) => raw
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .ok_or_else(|| WpsError::parse(format!("invalid percentCompleted '{raw}'")))?,
        };
        return Ok((
            ExecutionStatus::Started { percent_complete },
            non_empty(text_content(started)),
        ));
    }
    if let Some(succeeded) = child(status_node, "wps:ProcessSucceeded") {
        return Ok((ExecutionStatus::Succeeded, non_empty(text_content(succeeded))));
    }
    Err(WpsError::parse("wps:Status carries no recognised status marker"))
}

fn parse_outputs(process_outputs: Node<'_, '_>) -> Result<IndexMap<String, OutputValue>, WpsError> {
    let mut outputs = IndexMap::new();
    for output in children(process_outputs, "wps:Output") {
        let identifier = identifier_of(output).ok_or_else(|| missing("wps:Output/ows:Identifier"))?;
        let value = parse_output_value(output, &identifier)?;
        if outputs.insert(identifier.clone(), value).is_some() {
            return Err(WpsError::parse(format!("output '{identifier}' is listed twice")));
        }
    }
    if outputs.is_empty() {
        return Err(WpsError::parse("wps:ProcessOutputs lists no wps:Output"));
    }
    Ok(outputs)
}

fn parse_output_value(output: Node<'_, '_>, identifier: &str) -> Result<OutputValue, WpsError> {
    if let Some(data) = child(output, "wps:Data") {
        if let Some(literal) = child(data, "wps:LiteralData") {
            return Ok(OutputValue::literal(text_content(literal)));
        }
        let found = data
            .children()
            .find(|node| node.is_element())
            .map(element_name)
            .unwrap_or_else(|| "nothing".to_string());
        return Err(WpsError::UnsupportedOutputShape {
            output: identifier.to_string(),
            reason: format!("wps:Data contains {found}"),
        });
    }

    if let Some(reference) = child(output, "wps:Reference") {
        // WPS 1.0.0 outputs use a bare `href`; some servers send `xlink:href` instead.
        let href = attribute(reference, "xlink:href")
            .or_else(|| attribute(reference, "href"))
            .unwrap_or_default()
            .trim()
            .to_string();
        let mime_type = attribute(reference, "mimeType")
            .map(str::trim)
            .filter(|mime| !mime.is_empty())
            .map(str::to_string);
        return Ok(OutputValue::reference(href, mime_type));
    }

    Err(WpsError::UnsupportedOutputShape {
        output: identifier.to_string(),
        reason: "neither wps:Data nor wps:Reference is present".to_string(),
    })
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() { None } else { Some(text) }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn document(status: &str, outputs: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<wps:ExecuteResponse xmlns:wps="http://www.opengis.net/wps/1.0.0" xmlns:ows="http://www.opengis.net/ows/1.1"
    xmlns:xlink="http://www.w3.org/1999/xlink" service="WPS" version="1.0.0"
    statusLocation="http://wps.example/outputs/status-1.xml">
  <wps:Process wps:processVersion="0.1">
    <ows:Identifier>ncmerge</ows:Identifier>
    <ows:Title>Merge</ows:Title>
  </wps:Process>
  <wps:Status creationTime="2017-06-20T12:30:00Z">{status}</wps:Status>
  {outputs}
</wps:ExecuteResponse>"#
        )
    }

    const REFERENCE_OUTPUTS: &str = r#"<wps:ProcessOutputs>
    <wps:Output>
      <ows:Identifier>output</ows:Identifier>
      <wps:Reference href="http://wps.example/outputs/merged.nc" mimeType="application/x-netcdf"/>
    </wps:Output>
    <wps:Output>
      <ows:Identifier>count</ows:Identifier>
      <wps:Data><wps:LiteralData dataType="integer"> 42 </wps:LiteralData></wps:Data>
    </wps:Output>
  </wps:ProcessOutputs>"#;

    #[test]
    fn succeeded_document_yields_outputs() {
        let xml = document("<wps:ProcessSucceeded>done</wps:ProcessSucceeded>", REFERENCE_OUTPUTS);
        let result = parse_execute_response(xml.as_bytes()).expect("parse");

        assert_eq!(result.process_identifier, "ncmerge");
        assert_eq!(result.raw_creation_time, "2017-06-20T12:30:00Z");
        assert_eq!(result.creation_time, Some(Utc.with_ymd_and_hms(2017, 6, 20, 12, 30, 0).unwrap()));
        assert_eq!(result.status, ExecutionStatus::Succeeded);
        assert_eq!(result.status_message.as_deref(), Some("done"));
        assert_eq!(result.status_location.as_deref(), Some("http://wps.example/outputs/status-1.xml"));
        assert_eq!(
            result.output("output"),
            Some(&OutputValue::reference(
                "http://wps.example/outputs/merged.nc",
                Some("application/x-netcdf".into())
            ))
        );
        assert_eq!(result.output("count"), Some(&OutputValue::literal("42")));
    }

    #[test]
    fn non_terminal_statuses_do_not_read_outputs() {
        let accepted = document("<wps:ProcessAccepted>queued</wps:ProcessAccepted>", "<wps:ProcessOutputs><broken/></wps:ProcessOutputs>");
        let result = parse_execute_response(accepted.as_bytes()).expect("accepted");
        assert_eq!(result.status, ExecutionStatus::Accepted);
        assert!(result.outputs.is_empty());

        let started = document(r#"<wps:ProcessStarted percentCompleted="35">working</wps:ProcessStarted>"#, "");
        let result = parse_execute_response(started.as_bytes()).expect("started");
        assert_eq!(result.status, ExecutionStatus::Started { percent_complete: 35.0 });
        assert_eq!(result.status_message.as_deref(), Some("working"));

        let no_percent = document("<wps:ProcessStarted/>", "");
        let result = parse_execute_response(no_percent.as_bytes()).expect("started without percent");
        assert_eq!(result.status, ExecutionStatus::Started { percent_complete: 0.0 });
    }

    #[test]
    fn failed_status_carries_exception_texts() {
        let failed = document(
            r#"<wps:ProcessFailed><wps:ExceptionReport>
                 <ows:Exception exceptionCode="NoApplicableCode"><ows:ExceptionText>Process error: no such typename</ows:ExceptionText></ows:Exception>
               </wps:ExceptionReport></wps:ProcessFailed>"#,
            "",
        );
        let result = parse_execute_response(failed.as_bytes()).expect("failed");
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.status_message.as_deref(), Some("Process error: no such typename"));
        assert!(result.outputs.is_empty());
    }

    #[test]
    fn failed_marker_wins_over_others() {
        let xml = document(
            "<wps:ProcessSucceeded/><wps:ProcessFailed>boom</wps:ProcessFailed>",
            REFERENCE_OUTPUTS,
        );
        let result = parse_execute_response(xml.as_bytes()).expect("parse");
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.status_message.as_deref(), Some("boom"));
    }

    #[test]
    fn default_namespace_documents_parse() {
        let xml = r#"<ExecuteResponse xmlns="http://www.opengis.net/wps/1.0.0" xmlns:ns1="http://www.opengis.net/ows/1.1">
            <Process><ns1:Identifier>subset</ns1:Identifier></Process>
            <Status creationTime="2020-01-01T00:00:00"><ProcessSucceeded/></Status>
            <ProcessOutputs><Output><ns1:Identifier>output</ns1:Identifier>
              <Reference xmlns:x="http://www.w3.org/1999/xlink" x:href="http://h/out.nc"/></Output></ProcessOutputs>
          </ExecuteResponse>"#;
        let result = parse_execute_response(xml.as_bytes()).expect("parse");
        assert_eq!(result.process_identifier, "subset");
        assert_eq!(result.output("output"), Some(&OutputValue::reference("http://h/out.nc", None)));
        assert_eq!(result.status_location, None);
    }

    #[test]
    fn unrecognised_creation_time_keeps_the_raw_text() {
        let xml = document("<wps:ProcessSucceeded/>", REFERENCE_OUTPUTS)
            .replace("2017-06-20T12:30:00Z", "Tue Jun 20 12:30:00 2017");
        let result = parse_execute_response(xml.as_bytes()).expect("odd timestamps are not fatal");
        assert_eq!(result.creation_time, None);
        assert_eq!(result.raw_creation_time, "Tue Jun 20 12:30:00 2017");
        assert_eq!(result.status, ExecutionStatus::Succeeded);
        assert_eq!(result.output_names(), vec!["output".to_string(), "count".to_string()]);
    }

    #[test]
    fn succeeded_without_outputs_is_a_parse_error() {
        for outputs in ["<wps:ProcessOutputs/>", "<wps:ProcessOutputs>\n  </wps:ProcessOutputs>"] {
            let xml = document("<wps:ProcessSucceeded/>", outputs);
            let error = parse_execute_response(xml.as_bytes()).expect_err("no outputs");
            assert!(matches!(error, WpsError::Parse(_)), "{error}");
            assert!(error.to_string().contains("lists no wps:Output"), "{error}");
        }
    }

    #[test]
    fn parsing_is_deterministic() {
        let xml = document("<wps:ProcessSucceeded/>", REFERENCE_OUTPUTS);
        assert_eq!(
            parse_execute_response(xml.as_bytes()).unwrap(),
            parse_execute_response(xml.as_bytes()).unwrap()
        );
    }

    #[test]
    fn missing_elements_are_parse_errors() {
        let cases = [
            (
                r#"<wps:ExecuteResponse xmlns:wps="http://www.opengis.net/wps/1.0.0"><wps:Status creationTime="2020-01-01T00:00:00Z"><wps:ProcessAccepted/></wps:Status></wps:ExecuteResponse>"#,
                "wps:Process",
            ),
            (
                r#"<wps:ExecuteResponse xmlns:wps="http://www.opengis.net/wps/1.0.0" xmlns:ows="http://www.opengis.net/ows/1.1"><wps:Process><ows:Identifier>p</ows:Identifier></wps:Process></wps:ExecuteResponse>"#,
                "wps:Status",
            ),
            (
                r#"<wps:ExecuteResponse xmlns:wps="http://www.opengis.net/wps/1.0.0" xmlns:ows="http://www.opengis.net/ows/1.1"><wps:Process><ows:Identifier>p</ows:Identifier></wps:Process><wps:Status><wps:ProcessAccepted/></wps:Status></wps:ExecuteResponse>"#,
                "creationTime",
            ),
            (
                r#"<wps:ExecuteResponse xmlns:wps="http://www.opengis.net/wps/1.0.0" xmlns:ows="http://www.opengis.net/ows/1.1"><wps:Process><ows:Identifier>p</ows:Identifier></wps:Process><wps:Status creationTime="2020-01-01T00:00:00Z"><wps:ProcessSucceeded/></wps:Status></wps:ExecuteResponse>"#,
                "wps:ProcessOutputs",
            ),
        ];
        for (xml, expected) in cases {
            let error = parse_execute_response(xml.as_bytes()).expect_err(expected);
            assert!(matches!(error, WpsError::Parse(_)), "{error}");
            assert!(error.to_string().contains(expected), "{error} should mention {expected}");
        }
    }

    #[test]
    fn malformed_input_is_a_parse_error() {
        assert!(matches!(parse_execute_response(b"<wps:ExecuteResponse"), Err(WpsError::Parse(_))));
        assert!(matches!(parse_execute_response(&[0xff, 0xfe, 0x00]), Err(WpsError::Parse(_))));

        let bad_percent = document(r#"<wps:ProcessStarted percentCompleted="lots"/>"#, "");
        let error = parse_execute_response(bad_percent.as_bytes()).unwrap_err();
        assert!(error.to_string().contains("percentCompleted"), "{error}");
    }

    #[test]
    fn exception_report_root_is_a_parse_error() {
        let xml = r#"<ows:ExceptionReport xmlns:ows="http://www.opengis.net/ows/1.1" version="1.0.0">
            <ows:Exception exceptionCode="InvalidParameterValue" locator="identifier"><ows:ExceptionText>Unknown process</ows:ExceptionText></ows:Exception>
          </ows:ExceptionReport>"#;
        let error = parse_execute_response(xml.as_bytes()).unwrap_err();
        assert!(error.to_string().contains("Unknown process"), "{error}");
    }

    #[test]
    fn unsupported_output_shapes_are_reported() {
        let complex = r#"<wps:ProcessOutputs><wps:Output><ows:Identifier>output</ows:Identifier>
            <wps:Data><wps:ComplexData mimeType="text/xml"><a/></wps:ComplexData></wps:Data></wps:Output></wps:ProcessOutputs>"#;
        let xml = document("<wps:ProcessSucceeded/>", complex);
        let error = parse_execute_response(xml.as_bytes()).unwrap_err();
        assert!(
            matches!(&error, WpsError::UnsupportedOutputShape { output, reason } if output == "output" && reason.contains("wps:ComplexData")),
            "{error}"
        );

        let bare = r#"<wps:ProcessOutputs><wps:Output><ows:Identifier>output</ows:Identifier></wps:Output></wps:ProcessOutputs>"#;
        let xml = document("<wps:ProcessSucceeded/>", bare);
        assert!(matches!(
            parse_execute_response(xml.as_bytes()),
            Err(WpsError::UnsupportedOutputShape { .. })
        ));
    }

    #[test]
    fn empty_reference_href_is_kept_for_the_resolver() {
        let outputs = r#"<wps:ProcessOutputs><wps:Output><ows:Identifier>output</ows:Identifier>
            <wps:Reference href="" mimeType="application/json"/></wps:Output></wps:ProcessOutputs>"#;
        let xml = document("<wps:ProcessSucceeded/>", outputs);
        let result = parse_execute_response(xml.as_bytes()).expect("parse");
        assert_eq!(
            result.output("output"),
            Some(&OutputValue::reference("", Some("application/json".into())))
        );
    }
}
