//! Fixtures shared by the integration tests
#![allow(dead_code)]

use proposal_desk::config::Config;
use proposal_desk::converter::{ConvertError, Converter};
use proposal_desk::proposal::{ProposalForm, ProposalType};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

pub const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#;

/// Body using the default placeholders, with one of them split across runs
/// and one inside a table cell.
pub const PROPOSAL_BODY: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8"?>"#,
    r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#,
    r#"<w:p><w:r><w:t>Proposta TIPO xxx.x.xxxx</w:t></w:r></w:p>"#,
    r#"<w:p><w:r><w:t xml:space="preserve">Para: Cli</w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>ente</w:t></w:r></w:p>"#,
    r#"<w:tbl><w:tr><w:tc><w:p><w:r><w:t>Escopo: Serviço em Área ha</w:t></w:r></w:p></w:tc>"#,
    r#"<w:tc><w:p><w:r><w:t>Ref. xxx.x.xxxx</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"#,
    r#"<w:p><w:r><w:t>Sem campos</w:t></w:r></w:p>"#,
    r#"</w:body></w:document>"#,
);

/// Write a minimal `.docx` archive holding `document_xml` as its body.
pub fn write_docx(path: &Path, document_xml: &str) {
    write_docx_parts(path, &[("word/document.xml", document_xml.as_bytes())]);
}

/// Write a `.docx` archive with a content-types entry followed by `parts`.
pub fn write_docx_parts(path: &Path, parts: &[(&str, &[u8])]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    let options = SimpleFileOptions::default();

    zip.start_file("[Content_Types].xml", options).unwrap();
    zip.write_all(CONTENT_TYPES.as_bytes()).unwrap();
    for (name, contents) in parts {
        zip.start_file(*name, options).unwrap();
        zip.write_all(contents).unwrap();
    }
    zip.finish().unwrap();
}

/// Read one part of a zip archive as text.
pub fn read_part(path: &Path, name: &str) -> String {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut part = archive.by_name(name).unwrap();
    let mut text = String::new();
    part.read_to_string(&mut text).unwrap();
    text
}

/// Config rooted at `dir` with both templates in place.
pub fn config_with_templates(dir: &Path) -> Config {
    let config = Config::rooted_at(dir);
    for kind in ProposalType::ALL {
        write_docx(&config.template_for(kind), PROPOSAL_BODY);
    }
    config
}

pub fn sample_form() -> ProposalForm {
    ProposalForm {
        kind: ProposalType::Commercial,
        code: "019.1.2025".to_string(),
        client: "Fazenda Sol".to_string(),
        service: "Topografia".to_string(),
        area: "120".to_string(),
    }
}

/// Writes a small fake PDF and remembers nothing.
pub struct FakePdfConverter;

impl Converter for FakePdfConverter {
    fn convert(&self, input: &Path, output: &Path) -> Result<(), ConvertError> {
        assert!(input.is_file(), "converter input {:?} missing", input);
        fs::write(output, b"%PDF-1.4 fake").map_err(|source| ConvertError::Spawn {
            program: "fake".to_string(),
            source,
        })
    }
}

/// Always fails without producing output.
pub struct FailingConverter;

impl Converter for FailingConverter {
    fn convert(&self, _input: &Path, output: &Path) -> Result<(), ConvertError> {
        Err(ConvertError::MissingOutput {
            program: "broken".to_string(),
            output: PathBuf::from(output),
        })
    }
}
