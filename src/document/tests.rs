use super::*;
use crate::error::PipelineError;

fn sample_document() -> Document {
    Document::from_blocks(
        "doc-test",
        &[
            TemplateBlock::text("Report {{title}}"),
            TemplateBlock::table(vec![
                vec![
                    vec![TemplateBlock::text("{{title}} and {{title}}")],
                    vec![TemplateBlock::table(vec![vec![vec![TemplateBlock::text(
                        "deep {{title}}",
                    )]]])],
                ],
                vec![vec![TemplateBlock::text("{{other}}")]],
            ]),
            TemplateBlock::text("tail"),
        ],
    )
}

#[test]
fn test_snapshot_offsets_are_contiguous() {
    let tree = sample_document().snapshot();
    let mut expected = 0;
    for block in &tree.body {
        let (start, end) = match block {
            Block::Paragraph(p) => (p.start_offset, p.end_offset),
            Block::Table(t) => (t.start_offset, t.end_offset),
        };
        assert_eq!(start, expected);
        expected = end;
    }
    assert_eq!(expected, tree.end_offset);
}

#[test]
fn test_scanner_finds_every_occurrence_including_nested_tables() {
    let tree = sample_document().snapshot();
    let found = scan_placeholders(&tree, "{{title}}");
    assert_eq!(found.len(), 4);
    assert!(found.windows(2).all(|w| w[0].start_offset < w[1].start_offset));
    for occurrence in &found {
        assert_eq!(occurrence.len(), 9);
    }
    assert_eq!(scan_placeholders(&tree, "{{other}}").len(), 1);
}

#[test]
fn test_scanner_is_case_sensitive() {
    let tree = sample_document().snapshot();
    assert!(scan_placeholders(&tree, "{{Title}}").is_empty());
    assert!(scan_placeholders(&tree, "").is_empty());
}

#[test]
fn test_scanner_matches_across_style_runs() {
    let mut document = Document::from_blocks("doc", &[TemplateBlock::text("x {{name}} y")]);
    document
        .apply_batch(&[EditOp::UpdateStyle {
            range: Range { start: 2, end: 5 },
            style: TextStyle::default().with_bold(true),
        }])
        .unwrap();
    let tree = document.snapshot();
    assert!(tree.paragraphs()[0].elements.len() > 1);
    assert_eq!(
        scan_placeholders(&tree, "{{name}}"),
        vec![Occurrence::new(2, 10)]
    );
}

#[test]
fn test_offset_space_rejects_ascending_registration() {
    let mut space = OffsetSpace::new();
    space.replace_text(Occurrence::new(0, 5), "a").unwrap();
    let err = space.replace_text(Occurrence::new(10, 15), "b").unwrap_err();
    assert_eq!(
        err,
        PipelineError::BatchOrder {
            start: 10,
            previous: 0
        }
    );
}

#[test]
fn test_offset_space_rejects_overlap() {
    let mut space = OffsetSpace::new();
    space.replace_text(Occurrence::new(10, 15), "a").unwrap();
    assert!(space.replace_text(Occurrence::new(8, 12), "b").is_err());
    assert!(space.replace_text(Occurrence::new(5, 10), "c").is_ok());
}

#[test]
fn test_offset_space_empty_replacement_only_deletes() {
    let mut space = OffsetSpace::new();
    space.replace_text(Occurrence::new(3, 7), "").unwrap();
    assert_eq!(space.into_ops(), vec![EditOp::DeleteRange { start: 3, end: 7 }]);
}

#[test]
fn test_batch_is_atomic() {
    let mut document = Document::from_blocks("doc", &[TemplateBlock::text("hello")]);
    let before = document.clone();
    let result = document.apply_batch(&[
        EditOp::InsertText {
            at: 0,
            text: "ok ".to_string(),
        },
        EditOp::DeleteRange { start: 50, end: 60 },
    ]);
    assert!(matches!(result, Err(PipelineError::InvalidEdit(_))));
    assert_eq!(document, before);
}

#[test]
fn test_delete_cannot_cross_table_structure() {
    let mut document = sample_document();
    let tree = document.snapshot();
    let table_start = match &tree.body[1] {
        Block::Table(t) => t.start_offset,
        _ => unreachable!(),
    };
    let result = document.apply_batch(&[EditOp::DeleteRange {
        start: table_start - 1,
        end: table_start + 1,
    }]);
    assert!(result.is_err());
}

#[test]
fn test_insert_text_inherits_preceding_style() {
    let mut document = Document::from_blocks("doc", &[TemplateBlock::text("ab")]);
    document
        .apply_batch(&[
            EditOp::UpdateStyle {
                range: Range { start: 0, end: 2 },
                style: TextStyle::font_size(20.0),
            },
            EditOp::InsertText {
                at: 1,
                text: "XYZ".to_string(),
            },
        ])
        .unwrap();
    let tree = document.snapshot();
    match &tree.paragraphs()[0].elements[0] {
        ParagraphElement::TextRun(run) => {
            assert_eq!(run.content, "aXYZb");
            assert_eq!(run.style.font_size, Some(20.0));
        }
        other => panic!("unexpected element {other:?}"),
    }
}

#[test]
fn test_insert_text_with_newline_splits_paragraph() {
    let mut document = Document::from_blocks("doc", &[TemplateBlock::text("{{x}}")]);
    document
        .apply_batch(&[
            EditOp::DeleteRange { start: 0, end: 5 },
            EditOp::InsertText {
                at: 0,
                text: "one\ntwo".to_string(),
            },
        ])
        .unwrap();
    let tree = document.snapshot();
    let texts: Vec<String> = tree.paragraphs().iter().map(|p| p.text()).collect();
    assert_eq!(texts, vec!["one\n".to_string(), "two\n".to_string()]);
}

#[test]
fn test_inline_image_occupies_one_offset() {
    let mut document = Document::from_blocks("doc", &[TemplateBlock::text("ab")]);
    document
        .apply_batch(&[EditOp::InsertImage {
            at: 1,
            uri: "https://img/1.png".to_string(),
            width: 10.0,
            height: 5.0,
        }])
        .unwrap();
    let tree = document.snapshot();
    assert_eq!(tree.end_offset, 4);
    assert_eq!(tree.count_images(), 1);
    assert_eq!(tree.images()[0].offset, 1);
}

#[test]
fn test_find_tokens_lists_remaining_placeholders() {
    let tree = sample_document().snapshot();
    let tokens: Vec<String> = find_tokens(&tree).into_iter().collect();
    assert_eq!(tokens, vec!["other".to_string(), "title".to_string()]);
}

#[test]
fn test_token_helpers() {
    assert_eq!(token_for("title"), "{{title}}");
    assert!(is_valid_token_name("report.date"));
    assert!(!is_valid_token_name("has space"));
    assert!(!is_valid_token_name(""));
}
