// Verify the console wire format that packaged jobs already emit.
// These tests pin the envelope shape so existing packages keep working.

use jobhost_protocol::{decode, encode, ConsoleMessage, EmailAttachment, EmailRequest, SENTINEL};

#[test]
fn log_envelope_decodes() {
    let line = r#"##jobhost:{"type":"log","message":"imported 42 rows"}"#;
    match decode(line) {
        Some(ConsoleMessage::Log { message }) => assert_eq!(message, "imported 42 rows"),
        other => panic!("expected log message, got {other:?}"),
    }
}

#[test]
fn email_envelope_decodes_with_attachments() {
    // "aGVsbG8=" is base64 for "hello"
    let line = r#"##jobhost:{"type":"email","subject":"Daily report","body":"see attached","to":"ops@example.com","cc":"lead@example.com","attachments":[{"fileName":"report.txt","contentType":"text/plain","content":"aGVsbG8="}]}"#;

    let Some(ConsoleMessage::Email(email)) = decode(line) else {
        panic!("expected email message");
    };
    assert_eq!(email.subject, "Daily report");
    assert_eq!(email.to, "ops@example.com");
    assert_eq!(email.cc, "lead@example.com");
    assert_eq!(email.bcc, "", "missing bcc defaults to empty");
    assert_eq!(email.attachments.len(), 1);
    assert_eq!(email.attachments[0].file_name, "report.txt");
    assert_eq!(email.attachments[0].content, b"hello");
}

#[test]
fn unknown_type_is_dropped() {
    let line = r#"##jobhost:{"type":"progress","percent":50}"#;
    assert!(decode(line).is_none());
}

#[test]
fn truncated_json_is_dropped() {
    let line = r#"##jobhost:{"type":"log","message":"#;
    assert!(decode(line).is_none());
}

#[test]
fn missing_required_field_is_dropped() {
    let line = r#"##jobhost:{"type":"email","subject":"no recipient","body":""}"#;
    assert!(decode(line).is_none());
}

#[test]
fn encoder_output_is_accepted_by_decoder() {
    let message = ConsoleMessage::Email(EmailRequest {
        subject: "Invoice".into(),
        body: "Attached.".into(),
        to: "billing@example.com".into(),
        cc: String::new(),
        bcc: "audit@example.com".into(),
        attachments: vec![EmailAttachment {
            file_name: "invoice.pdf".into(),
            content_type: "application/pdf".into(),
            content: vec![0x25, 0x50, 0x44, 0x46, 0x00, 0xff],
        }],
    });

    let line = encode(&message);
    assert!(line.starts_with(SENTINEL));
    assert!(line.contains(r#""type":"email""#));
    assert!(line.contains(r#""fileName":"invoice.pdf""#));
    assert_eq!(decode(&line), Some(message));
}
