mod common;

use chrono::Local;
use common::{FailingConverter, FakePdfConverter, config_with_templates, read_part, sample_form};
use proposal_desk::config::Config;
use proposal_desk::history::Ledger;
use proposal_desk::proposal::{ProposalError, ProposalGenerator, ProposalType};
use std::fs;
use tempfile::tempdir;

#[test]
fn generation_fills_converts_and_records() {
    let dir = tempdir().unwrap();
    let config = config_with_templates(dir.path());
    let ledger = Ledger::open(config.history_path()).unwrap();
    let before = ledger.entries().unwrap().len();
    let start = Local::now();

    let generated = ProposalGenerator::new(&config, &FakePdfConverter)
        .generate(&sample_form(), "vendedor1", &ledger)
        .unwrap();

    let entries = ledger.entries().unwrap();
    assert_eq!(entries.len(), before + 1);
    assert_eq!(generated.index, before);

    let last = entries.last().unwrap();
    assert_eq!(last, &generated.record);
    assert_eq!(last.code, "019.1.2025");
    assert_eq!(last.client, "Fazenda Sol");
    assert_eq!(last.kind, ProposalType::Commercial);
    assert_eq!(last.user, "vendedor1");
    assert!(last.created_at >= start);

    assert_eq!(
        last.pdf,
        config.output_dir().join("Proposta_019.1.2025_Fazenda Sol.pdf")
    );
    assert!(last.pdf.is_file());

    let body = read_part(&generated.document, "word/document.xml");
    assert!(body.contains("Proposta Comercial 019.1.2025"));
    assert!(body.contains("Para: Fazenda Sol"));
}

#[test]
fn technical_proposals_use_their_own_template() {
    let dir = tempdir().unwrap();
    let config = config_with_templates(dir.path());
    fs::remove_file(config.template_for(ProposalType::Commercial)).unwrap();
    let ledger = Ledger::open(config.history_path()).unwrap();

    let mut form = sample_form();
    form.kind = ProposalType::Technical;
    let generated = ProposalGenerator::new(&config, &FakePdfConverter)
        .generate(&form, "ana", &ledger)
        .unwrap();

    let body = read_part(&generated.document, "word/document.xml");
    assert!(body.contains("Proposta Técnica 019.1.2025"));
}

#[test]
fn missing_template_is_reported_and_nothing_is_recorded() {
    let dir = tempdir().unwrap();
    let config = Config::rooted_at(dir.path());
    let ledger = Ledger::open(config.history_path()).unwrap();

    let result = ProposalGenerator::new(&config, &FakePdfConverter).generate(
        &sample_form(),
        "vendedor1",
        &ledger,
    );

    assert!(matches!(
        result,
        Err(ProposalError::MissingTemplate {
            kind: ProposalType::Commercial,
            ..
        })
    ));
    assert!(ledger.entries().unwrap().is_empty());
}

#[test]
fn failed_conversion_leaves_ledger_unchanged() {
    let dir = tempdir().unwrap();
    let config = config_with_templates(dir.path());
    let ledger = Ledger::open(config.history_path()).unwrap();

    let result = ProposalGenerator::new(&config, &FailingConverter).generate(
        &sample_form(),
        "vendedor1",
        &ledger,
    );

    assert!(matches!(result, Err(ProposalError::Convert(_))));
    assert!(ledger.entries().unwrap().is_empty());
}

#[test]
fn regenerating_the_same_code_adds_a_second_entry() {
    let dir = tempdir().unwrap();
    let config = config_with_templates(dir.path());
    let ledger = Ledger::open(config.history_path()).unwrap();
    let generator = ProposalGenerator::new(&config, &FakePdfConverter);

    generator.generate(&sample_form(), "vendedor1", &ledger).unwrap();
    generator.generate(&sample_form(), "ana", &ledger).unwrap();

    let entries = ledger.entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].pdf, entries[1].pdf);
    assert_eq!(ledger.users().unwrap(), vec!["ana", "vendedor1"]);
}
