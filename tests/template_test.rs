mod common;

use common::{CONTENT_TYPES, PROPOSAL_BODY, read_part, write_docx, write_docx_parts};
use proposal_desk::config::Placeholders;
use proposal_desk::template::{Fields, TemplateError, fill_template};
use std::fs;
use tempfile::tempdir;

fn proposal_fields() -> Fields {
    let p = Placeholders::default();
    [
        (p.kind, "Comercial"),
        (p.code, "019.1.2025"),
        (p.client, "Fazenda Sol"),
        (p.service, "Topografia"),
        (p.area, "120"),
    ]
    .into_iter()
    .collect()
}

#[test]
fn every_placeholder_is_filled() {
    let dir = tempdir().unwrap();
    let template = dir.path().join("template.docx");
    let output = dir.path().join("filled.docx");
    write_docx(&template, PROPOSAL_BODY);

    fill_template(&template, &output, &proposal_fields()).unwrap();
    let body = read_part(&output, "word/document.xml");

    assert!(body.contains("Proposta Comercial 019.1.2025"));
    assert!(body.contains("Para: Fazenda Sol"));
    assert!(body.contains("Escopo: Topografia em 120 ha"));
    assert!(body.contains("Ref. 019.1.2025"));
    assert!(body.contains("<w:t>Sem campos</w:t>"));
    assert!(!body.contains("xxx.x.xxxx"));
    assert!(!body.contains("TIPO"));
}

#[test]
fn repeated_placeholder_is_replaced_everywhere() {
    let dir = tempdir().unwrap();
    let template = dir.path().join("template.docx");
    let output = dir.path().join("filled.docx");
    write_docx(
        &template,
        r#"<w:document><w:body><w:p><w:r><w:t>{{CODE}}</w:t></w:r></w:p><w:p><w:r><w:t>see {{CODE}}</w:t></w:r></w:p></w:body></w:document>"#,
    );

    let fields: Fields = [("{{CODE}}", "019.1.2025")].into_iter().collect();
    fill_template(&template, &output, &fields).unwrap();
    let body = read_part(&output, "word/document.xml");

    assert_eq!(body.matches("019.1.2025").count(), 2);
    assert!(!body.contains("{{CODE}}"));
}

#[test]
fn other_parts_are_copied_unchanged() {
    let dir = tempdir().unwrap();
    let template = dir.path().join("template.docx");
    let output = dir.path().join("filled.docx");
    write_docx(&template, PROPOSAL_BODY);

    fill_template(&template, &output, &proposal_fields()).unwrap();

    assert_eq!(read_part(&output, "[Content_Types].xml"), CONTENT_TYPES);
    // The template itself is never modified
    assert_eq!(read_part(&template, "word/document.xml"), PROPOSAL_BODY);
}

#[test]
fn missing_template_fails_to_open() {
    let dir = tempdir().unwrap();
    let result = fill_template(
        dir.path().join("absent.docx"),
        dir.path().join("out.docx"),
        &proposal_fields(),
    );
    assert!(matches!(result, Err(TemplateError::Open { .. })));
}

#[test]
fn non_archive_template_is_rejected() {
    let dir = tempdir().unwrap();
    let template = dir.path().join("plain.docx");
    fs::write(&template, "not a zip archive").unwrap();

    let result = fill_template(&template, dir.path().join("out.docx"), &proposal_fields());
    assert!(matches!(result, Err(TemplateError::Archive { .. })));
}

#[test]
fn archive_without_body_is_rejected() {
    let dir = tempdir().unwrap();
    let template = dir.path().join("empty.docx");
    {
        use std::io::Write;
        let mut zip = zip::ZipWriter::new(fs::File::create(&template).unwrap());
        zip.start_file("[Content_Types].xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(CONTENT_TYPES.as_bytes()).unwrap();
        zip.finish().unwrap();
    }

    let result = fill_template(&template, dir.path().join("out.docx"), &proposal_fields());
    assert!(matches!(result, Err(TemplateError::MissingBody { .. })));
}

#[test]
fn headers_and_footers_are_filled() {
    let dir = tempdir().unwrap();
    let template = dir.path().join("template.docx");
    let output = dir.path().join("filled.docx");
    let header = r#"<w:hdr><w:p><w:r><w:t>Proposta xxx.x.xxxx</w:t></w:r></w:p></w:hdr>"#;
    let footer = r#"<w:ftr><w:p><w:r><w:t>Cliente - TIPO</w:t></w:r></w:p></w:ftr>"#;
    let styles = r#"<w:styles><w:p><w:r><w:t>Cliente</w:t></w:r></w:p></w:styles>"#;
    write_docx_parts(
        &template,
        &[
            ("word/document.xml", PROPOSAL_BODY.as_bytes()),
            ("word/header1.xml", header.as_bytes()),
            ("word/footer2.xml", footer.as_bytes()),
            ("word/styles.xml", styles.as_bytes()),
        ],
    );

    fill_template(&template, &output, &proposal_fields()).unwrap();

    assert!(read_part(&output, "word/header1.xml").contains("Proposta 019.1.2025"));
    assert!(read_part(&output, "word/footer2.xml").contains("Fazenda Sol - Comercial"));
    // Parts outside the body, headers and footers are never rewritten
    assert_eq!(read_part(&output, "word/styles.xml"), styles);
}

#[test]
fn unreadable_body_is_reported_against_the_template() {
    let dir = tempdir().unwrap();
    let template = dir.path().join("latin1.docx");
    write_docx_parts(
        &template,
        &[("word/document.xml", &b"<w:document>\xff\xfe Cliente</w:document>"[..])],
    );

    let result = fill_template(&template, dir.path().join("out.docx"), &proposal_fields());
    match result {
        Err(TemplateError::Archive { path, .. }) => assert_eq!(path, template),
        other => panic!("expected an archive error, got {:?}", other),
    }
}
