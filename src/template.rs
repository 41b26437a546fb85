//! Literal placeholder substitution over `.docx` templates.
//!
//! A `.docx` file is a zip archive; paragraph text lives in `<w:t>` runs of the
//! `word/document.xml` part (table cells hold ordinary paragraphs) and of the
//! header/footer parts. Each paragraph is matched on its concatenated run text,
//! so a placeholder split across runs by the word processor is still found.

use html_escape::{decode_html_entities, encode_text};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

lazy_static! {
    static ref PARAGRAPH_REGEX: Regex =
        Regex::new(r"(?s)<w:p(?:\s(?:[^>]*[^/>])?)?>.*?</w:p>").unwrap();
    static ref TEXT_RUN_REGEX: Regex =
        Regex::new(r"(?s)(<w:t(?:\s(?:[^>]*[^/>])?)?>)(.*?)(</w:t>)").unwrap();
    static ref FILLABLE_PART_REGEX: Regex =
        Regex::new(r"^word/(document|header[0-9]*|footer[0-9]*)\.xml$").unwrap();
}

const DOCUMENT_PART: &str = "word/document.xml";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to open template {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template {path:?} is not a readable document archive: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: ZipError,
    },

    #[error("template {path:?} has no word/document.xml part")]
    MissingBody { path: PathBuf },

    #[error("failed to write document {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: ZipError,
    },

    #[error("invalid placeholder pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Ordered placeholder → replacement mapping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    pairs: Vec<(String, String)>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, replacing any previous value for the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}

/// Compiled form of a [`Fields`] mapping.
///
/// All placeholders are matched in a single left-to-right pass over the
/// original text, longest placeholder first at any given position. Inserted
/// values are never rescanned, so a value that happens to contain another
/// placeholder is left as written.
#[derive(Debug)]
pub struct Substitution {
    pattern: Option<Regex>,
    values: HashMap<String, String>,
}

impl Substitution {
    pub fn new(fields: &Fields) -> Result<Self, TemplateError> {
        let mut keys: Vec<&str> = fields
            .iter()
            .map(|(k, _)| k)
            .filter(|k| !k.is_empty())
            .collect();
        keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let pattern = if keys.is_empty() {
            None
        } else {
            let alternation = keys
                .iter()
                .map(|k| regex::escape(k))
                .collect::<Vec<_>>()
                .join("|");
            Some(Regex::new(&alternation)?)
        };

        let values = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Ok(Self { pattern, values })
    }

    /// Replace every placeholder occurrence in plain `text`.
    pub fn apply<'t>(&self, text: &'t str) -> Cow<'t, str> {
        match &self.pattern {
            Some(pattern) => pattern.replace_all(text, |caps: &Captures| {
                self.values.get(&caps[0]).cloned().unwrap_or_default()
            }),
            None => Cow::Borrowed(text),
        }
    }

    /// Replace placeholders in every paragraph of a WordprocessingML part.
    pub fn fill_xml<'x>(&self, xml: &'x str) -> Cow<'x, str> {
        if self.pattern.is_none() {
            return Cow::Borrowed(xml);
        }
        PARAGRAPH_REGEX.replace_all(xml, |caps: &Captures| {
            let paragraph = &caps[0];
            self.fill_paragraph(paragraph)
                .unwrap_or_else(|| paragraph.to_string())
        })
    }

    /// Returns `None` when the paragraph contains no placeholder.
    ///
    /// A changed paragraph carries its whole new text in the first run; later
    /// runs are emptied but kept so their properties stay in place.
    fn fill_paragraph(&self, paragraph: &str) -> Option<String> {
        let text: String = TEXT_RUN_REGEX
            .captures_iter(paragraph)
            .map(|caps| decode_html_entities(&caps[2]).into_owned())
            .collect();

        let replaced = match self.apply(&text) {
            Cow::Borrowed(_) => return None,
            Cow::Owned(replaced) => replaced,
        };

        let mut first = true;
        let filled = TEXT_RUN_REGEX.replace_all(paragraph, |caps: &Captures| {
            if first {
                first = false;
                format!(
                    "<w:t xml:space=\"preserve\">{}</w:t>",
                    encode_text(&replaced)
                )
            } else {
                format!("{}{}", &caps[1], &caps[3])
            }
        });

        Some(filled.into_owned())
    }
}

/// Fill the template at `template` with `fields` and write the result to `output`.
///
/// Every entry other than the document, header and footer parts is copied
/// byte-for-byte.
pub fn fill_template(
    template: impl AsRef<Path>,
    output: impl AsRef<Path>,
    fields: &Fields,
) -> Result<(), TemplateError> {
    let template = template.as_ref();
    let output = output.as_ref();
    let substitution = Substitution::new(fields)?;

    let file = File::open(template).map_err(|source| TemplateError::Open {
        path: template.to_path_buf(),
        source,
    })?;
    let mut archive =
        ZipArchive::new(BufReader::new(file)).map_err(|source| TemplateError::Archive {
            path: template.to_path_buf(),
            source,
        })?;

    if !archive.file_names().any(|name| name == DOCUMENT_PART) {
        return Err(TemplateError::MissingBody {
            path: template.to_path_buf(),
        });
    }

    let out = File::create(output).map_err(|e| TemplateError::Write {
        path: output.to_path_buf(),
        source: ZipError::Io(e),
    })?;
    let mut writer = ZipWriter::new(BufWriter::new(out));

    rewrite_archive(&mut archive, &mut writer, &substitution, template, output)?;
    writer.finish().map_err(|source| TemplateError::Write {
        path: output.to_path_buf(),
        source,
    })?;

    debug!("Filled template {:?} into {:?}", template, output);
    Ok(())
}

/// Read-side failures are reported against `template`, write-side ones against `output`.
fn rewrite_archive<R, W>(
    archive: &mut ZipArchive<R>,
    writer: &mut ZipWriter<W>,
    substitution: &Substitution,
    template: &Path,
    output: &Path,
) -> Result<(), TemplateError>
where
    R: Read + Seek,
    W: Write + Seek,
{
    let read_failed = |source: ZipError| TemplateError::Archive {
        path: template.to_path_buf(),
        source,
    };
    let write_failed = |source: ZipError| TemplateError::Write {
        path: output.to_path_buf(),
        source,
    };
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for i in 0..archive.len() {
        let name = archive.by_index_raw(i).map_err(read_failed)?.name().to_string();

        if FILLABLE_PART_REGEX.is_match(&name) {
            let mut xml = String::new();
            archive
                .by_index(i)
                .map_err(read_failed)?
                .read_to_string(&mut xml)
                .map_err(|e| read_failed(ZipError::Io(e)))?;
            let filled = substitution.fill_xml(&xml);
            writer.start_file(name, options).map_err(write_failed)?;
            writer
                .write_all(filled.as_bytes())
                .map_err(|e| write_failed(ZipError::Io(e)))?;
        } else {
            let raw = archive.by_index_raw(i).map_err(read_failed)?;
            writer.raw_copy_file(raw).map_err(write_failed)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs.iter().copied().collect()
    }

    #[test]
    fn replaces_every_occurrence() {
        let sub = Substitution::new(&fields(&[("{{CODE}}", "019.1.2025")])).unwrap();
        assert_eq!(
            sub.apply("Ref {{CODE}} / copy of {{CODE}}"),
            "Ref 019.1.2025 / copy of 019.1.2025"
        );
    }

    #[test]
    fn values_are_not_rescanned() {
        let sub = Substitution::new(&fields(&[("Cliente", "TIPO Ltda"), ("TIPO", "Comercial")]))
            .unwrap();
        assert_eq!(sub.apply("Cliente - TIPO"), "TIPO Ltda - Comercial");
    }

    #[test]
    fn longest_placeholder_wins() {
        let sub = Substitution::new(&fields(&[("Área", "12"), ("Área total", "40")])).unwrap();
        assert_eq!(sub.apply("Área total: Área"), "40: 12");
    }

    #[test]
    fn paragraphs_without_placeholders_are_unchanged() {
        let sub = Substitution::new(&fields(&[("{{CODE}}", "1")])).unwrap();
        let xml = r#"<w:body><w:p><w:r><w:t>plain</w:t></w:r></w:p></w:body>"#;
        assert_eq!(sub.fill_xml(xml), xml);
    }

    #[test]
    fn placeholder_split_across_runs_is_joined() {
        let sub = Substitution::new(&fields(&[("{{CLIENT}}", "ACME & Sons")])).unwrap();
        let xml = concat!(
            r#"<w:p w:rsidR="00A1"><w:pPr><w:jc w:val="center"/></w:pPr>"#,
            r#"<w:r><w:rPr><w:b/></w:rPr><w:t>To {{CLI</w:t></w:r>"#,
            r#"<w:r><w:t xml:space="preserve">ENT}} now</w:t></w:r></w:p>"#,
        );
        let filled = sub.fill_xml(xml);
        assert!(filled.contains(r#"<w:t xml:space="preserve">To ACME &amp; Sons now</w:t>"#));
        assert!(filled.contains(r#"<w:t xml:space="preserve"></w:t>"#));
        assert!(filled.contains("<w:pPr><w:jc w:val=\"center\"/></w:pPr>"));
    }

    #[test]
    fn self_closing_paragraphs_stay_separate() {
        let sub = Substitution::new(&fields(&[("X", "Y")])).unwrap();
        let xml = r#"<w:p w:rsidR="1"/><w:p><w:r><w:t>X</w:t></w:r></w:p>"#;
        assert_eq!(
            sub.fill_xml(xml),
            r#"<w:p w:rsidR="1"/><w:p><w:r><w:t xml:space="preserve">Y</w:t></w:r></w:p>"#
        );
    }

    #[test]
    fn entities_are_decoded_before_matching() {
        let sub = Substitution::new(&fields(&[("A & B", "<ok>")])).unwrap();
        let xml = r#"<w:p><w:r><w:t>A &amp; B &#233;</w:t></w:r></w:p>"#;
        assert_eq!(
            sub.fill_xml(xml),
            r#"<w:p><w:r><w:t xml:space="preserve">&lt;ok&gt; é</w:t></w:r></w:p>"#
        );
    }

    #[test]
    fn inserting_a_key_twice_keeps_one_entry() {
        let mut f = Fields::new();
        f.insert("TIPO", "Comercial");
        f.insert("TIPO", "Técnica");
        assert_eq!(f.len(), 1);
        assert_eq!(f.get("TIPO"), Some("Técnica"));
    }
}
