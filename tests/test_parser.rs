use switchboard::http::parser::{ParseError, parse_request_head};
use switchboard::http::request::Method;

#[test]
fn test_parse_simple_get_head() {
    let req = b"GET / HTTP/1.1\r\nHost: printer.local\r\n\r\n";
    let (parsed, consumed) = parse_request_head(req).unwrap();

    assert_eq!(parsed.method, Method::GET);
    assert_eq!(parsed.path, "/");
    assert_eq!(parsed.version, "HTTP/1.1");
    assert_eq!(parsed.headers.get("Host").unwrap(), "printer.local");
    assert_eq!(consumed, req.len());
}

#[test]
fn test_parse_upload_leaves_body_unread() {
    let req = b"POST /upload?name=a.g HTTP/1.1\r\nContent-Length: 5\r\n\r\nG28\r\n";
    let (parsed, consumed) = parse_request_head(req).unwrap();

    assert_eq!(parsed.method, Method::POST);
    assert_eq!(parsed.content_length(), Some(5));
    assert_eq!(&req[consumed..], b"G28\r\n");
}

#[test]
fn test_parse_body_not_required_to_be_complete() {
    // Only the head has to be there; the body streams in later.
    let req = b"POST /upload?name=a.g HTTP/1.1\r\nContent-Length: 1000\r\n\r\nG1";
    let (_, consumed) = parse_request_head(req).unwrap();

    assert_eq!(req.len() - consumed, 2);
}

#[test]
fn test_parse_second_pipelined_request_untouched() {
    let req = b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n";
    let (first, consumed) = parse_request_head(req).unwrap();
    assert_eq!(first.path, "/a");

    let (second, _) = parse_request_head(&req[consumed..]).unwrap();
    assert_eq!(second.path, "/b");
}

#[test]
fn test_parse_incomplete_head() {
    let req = b"GET / HTTP/1.1\r\nHost: printer.local\r\n";

    assert!(matches!(parse_request_head(req), Err(ParseError::Incomplete)));
}

#[test]
fn test_parse_invalid_method() {
    let req = b"BREW /pot HTTP/1.1\r\n\r\n";

    assert!(matches!(parse_request_head(req), Err(ParseError::InvalidMethod)));
}

#[test]
fn test_parse_malformed_header() {
    let req = b"GET / HTTP/1.1\r\nBrokenHeader\r\n\r\n";

    assert!(matches!(parse_request_head(req), Err(ParseError::InvalidHeader)));
}

#[test]
fn test_parse_invalid_content_length() {
    let req = b"POST /upload HTTP/1.1\r\nContent-Length: lots\r\n\r\n";

    assert!(matches!(
        parse_request_head(req),
        Err(ParseError::InvalidContentLength)
    ));
}

#[test]
fn test_parse_missing_version() {
    let req = b"GET /\r\n\r\n";

    assert!(matches!(parse_request_head(req), Err(ParseError::InvalidRequest)));
}

#[test]
fn test_parse_every_method() {
    let methods = vec![
        ("GET", Method::GET),
        ("POST", Method::POST),
        ("PUT", Method::PUT),
        ("DELETE", Method::DELETE),
        ("HEAD", Method::HEAD),
        ("OPTIONS", Method::OPTIONS),
        ("PATCH", Method::PATCH),
    ];

    for (method_str, expected) in methods {
        let req = format!("{} /x HTTP/1.1\r\n\r\n", method_str);
        let (parsed, _) = parse_request_head(req.as_bytes()).unwrap();
        assert_eq!(parsed.method, expected);
    }
}
