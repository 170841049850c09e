use super::*;
use doc_model::{
    Blur, CaseFolding, Color, FontRef, Geometry, Gradient, Page, PageId, PageMetadata, Point,
    Profile, Project, RegionId, Rotation, ScriptClass, Shadow, Stroke, TextEffect, TextRegion,
    TextStyle,
};
use proptest::prelude::*;

fn sample_project() -> Project {
    let mut project = Project::new("Chapter 12 <raw> & \"clean\"");
    project
        .add_profile(Profile::new("Korean", ScriptClass::Hangul).with_case_folding(CaseFolding::None))
        .expect("profile insert expected");

    let first = project.allocate_page_id().expect("page id expected");
    let mut page = Page::new(
        first,
        "pages/001.png",
        PageMetadata { width: 800, height: 1200, rotation: Rotation::Cw90 },
    );
    let style = TextStyle::with_font(FontRef::new("Wild Words"))
        .with_effect(TextEffect::Stroke(Stroke { width: 2.5, color: Color::WHITE }))
        .with_effect(TextEffect::Shadow(Shadow {
            offset_x: 1.0,
            offset_y: -1.5,
            blur_radius: 0.3,
            color: Color::new(0, 0, 0, 128),
        }))
        .with_effect(TextEffect::Blur(Blur { radius: 0.1 }))
        .with_effect(TextEffect::Gradient(Gradient {
            start: Color::rgb(255, 0, 0),
            end: Color::rgb(0, 0, 255),
            angle: 45.0,
        }));

    let mut bubble = TextRegion::new(
        project.allocate_region_id().expect("region id expected"),
        Geometry::rect(10.25, 20.5, 100.0, 40.125),
        "こんにちは、世界！",
    )
    .expect("valid region expected")
    .with_profile("CJK")
    .with_z_order(3)
    .with_style(style)
    .with_confidence(0.87)
    .expect("valid confidence expected");
    bubble.set_translated_text("Hello, <world> & \"friends\"");
    bubble.set_display_override(Some("HELLO!".to_owned()));
    bubble.set_ocr_shadow(Some("こんにちは世界".to_owned()));
    bubble.set_locked(true);
    page.push_region(bubble).expect("region insert expected");

    let mut sfx = TextRegion::new(
        project.allocate_region_id().expect("region id expected"),
        Geometry::Polygon(vec![
            Point::new(0.0, 0.0),
            Point::new(30.5, 2.0),
            Point::new(28.0, 40.0),
            Point::new(-1.0, 35.75),
        ]),
        "",
    )
    .expect("valid region expected");
    sfx.set_hidden(true);
    page.push_region(sfx).expect("region insert expected");
    project.push_page(page).expect("page insert expected");

    let second = project.allocate_page_id().expect("page id expected");
    project
        .push_page(Page::new(second, "pages/002.png", PageMetadata::new(800, 1200)))
        .expect("page insert expected");
    project
}

fn decode_str(xml: &str) -> Result<Project, DecodeError> {
    decode(xml.as_bytes())
}

#[test]
fn test_round_trip_preserves_every_field() {
    let project = sample_project();
    let bytes = encode(&project).expect("encode expected");
    let decoded = decode(&bytes).expect("decode expected");

    assert_eq!(decoded, project);
    assert_eq!(decoded.next_region_id(), project.next_region_id());
    assert_eq!(decoded.next_page_id(), project.next_page_id());
}

#[test]
fn test_encode_writes_indented_utf8_xml() {
    let bytes = encode(&sample_project()).expect("encode expected");
    let text = String::from_utf8(bytes).expect("utf-8 expected");

    assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
    assert!(text.contains("\n  <page id=\"1\" image=\"pages/001.png\""));
    assert!(text.contains("<source>こんにちは、世界！</source>"));
    assert!(text.contains("<ocr-latest>こんにちは世界</ocr-latest>"));
    assert!(text.contains("&lt;world&gt; &amp;"));
    assert!(text.contains("<polygon points=\"0,0 30.5,2 28,40 -1,35.75\"/>"));
    assert!(text.ends_with("</project>\n"));
}

#[test]
fn encoding_is_deterministic() {
    let project = sample_project();
    let first = encode(&project).expect("encode expected");
    let second = encode(&decode(&first).expect("decode expected")).expect("encode expected");
    assert_eq!(first, second);
}

#[test]
fn test_text_whitespace_is_preserved() {
    let mut project = Project::new("spaces");
    let page_id = project.allocate_page_id().expect("page id expected");
    let mut page = Page::new(page_id, "p.png", PageMetadata::new(10, 10));
    let mut region = TextRegion::new(
        project.allocate_region_id().expect("region id expected"),
        Geometry::rect(0.0, 0.0, 5.0, 5.0),
        "  leading\nand trailing  \n",
    )
    .expect("valid region expected");
    region.set_translated_text("\ttabbed");
    region.set_display_override(Some(String::new()));
    page.push_region(region).expect("region insert expected");
    project.push_page(page).expect("page insert expected");

    let decoded = decode(&encode(&project).expect("encode expected")).expect("decode expected");
    let region = &decoded.pages()[0].regions()[0];
    assert_eq!(region.source_text(), "  leading\nand trailing  \n");
    assert_eq!(region.translated_text(), "\ttabbed");
    assert_eq!(region.display_override(), Some(""));
}

#[test]
fn unknown_elements_survive_round_trip_at_every_level() {
    let xml = r##"<?xml version="1.0" encoding="UTF-8"?>
<project format="1" name="ext" next-region="2" next-page="2">
  <settings default-profile="Latin" source-locale="ja" target-locale="en">
    <font family="Arial" style="Regular" bold="false" italic="false"/>
    <vendor-settings mode="dark"/>
  </settings>
  <profile name="Latin" script="latin" case="unicode" normalize="none">
    <hyphenation enabled="true"/>
  </profile>
  <page id="1" image="p.png" width="10" height="10" rotation="0">
    <region id="1" z="0" profile="" confidence="1" edited="false" hidden="false" locked="false" version="0">
      <rect x="0" y="0" width="5" height="5"/>
      <source>a</source>
      <style font-family="Arial" font-style="Regular" bold="false" italic="false" size="20" auto-size="true" color="#000000FF" align="center">
        <warp kind="arc" amount="0.3"/>
      </style>
      <note author="qc">check <b>tone</b></note>
    </region>
    <bookmark label="start"/>
  </page>
  <glossary><term src="先輩" dst="senpai"/></glossary>
</project>
"##;
    let project = decode_str(xml).expect("decode expected");

    assert_eq!(project.settings().extensions, vec![r#"<vendor-settings mode="dark"/>"#]);
    assert_eq!(project.profiles()[0].extensions, vec![r#"<hyphenation enabled="true"/>"#]);
    let page = &project.pages()[0];
    assert_eq!(page.extensions(), [r#"<bookmark label="start"/>"#]);
    let region = &page.regions()[0];
    assert_eq!(region.extensions(), [r#"<note author="qc">check <b>tone</b></note>"#]);
    assert_eq!(region.style().extensions, vec![r#"<warp kind="arc" amount="0.3"/>"#]);
    assert_eq!(project.extensions(), [r#"<glossary><term src="先輩" dst="senpai"/></glossary>"#]);

    let again = decode(&encode(&project).expect("encode expected")).expect("decode expected");
    assert_eq!(again, project);
}

#[test]
fn synthetic_extensions_are_written_back() {
    let mut project = sample_project();
    project.extensions_mut().push("<future-tag version=\"2\"><child/></future-tag>".to_owned());

    let decoded = decode(&encode(&project).expect("encode expected")).expect("decode expected");
    assert_eq!(decoded.extensions(), project.extensions());
}

#[test]
fn invalid_extension_is_rejected_on_encode() {
    let mut project = Project::new("bad");
    project.extensions_mut().push("<a></b>".to_owned());
    assert!(matches!(encode(&project), Err(EncodeError::InvalidExtension { .. })));

    project.extensions_mut().clear();
    project.extensions_mut().push("text <a/>".to_owned());
    assert!(matches!(encode(&project), Err(EncodeError::InvalidExtension { .. })));
}

#[test]
fn test_missing_geometry_is_reported() {
    let xml = r#"<project name="x"><page id="1" image="a.png"><region id="1"><source>a</source></region></page></project>"#;
    assert_eq!(
        decode_str(xml),
        Err(DecodeError::MissingRequiredField {
            element: "region".to_owned(),
            field: "geometry".to_owned(),
        })
    );
}

#[test]
fn test_missing_attribute_is_reported() {
    assert_eq!(
        decode_str(r#"<project format="1"/>"#),
        Err(DecodeError::MissingRequiredField {
            element: "project".to_owned(),
            field: "name".to_owned(),
        })
    );
    let xml = r#"<project name="x"><page image="a.png"/></project>"#;
    assert_eq!(
        decode_str(xml),
        Err(DecodeError::MissingRequiredField { element: "page".to_owned(), field: "id".to_owned() })
    );
}

#[test]
fn test_duplicate_region_ids_across_pages() {
    let xml = r#"<project name="x">
  <page id="1" image="a.png"><region id="7"><rect x="0" y="0" width="1" height="1"/></region></page>
  <page id="2" image="b.png"><region id="7"><rect x="0" y="0" width="1" height="1"/></region></page>
</project>"#;
    assert_eq!(
        decode_str(xml),
        Err(DecodeError::DuplicateIdentifier { kind: "region", id: "7".to_owned() })
    );
}

#[test]
fn test_duplicate_page_and_profile_ids() {
    let pages = r#"<project name="x"><page id="3" image="a.png"/><page id="3" image="b.png"/></project>"#;
    assert_eq!(
        decode_str(pages),
        Err(DecodeError::DuplicateIdentifier { kind: "page", id: "3".to_owned() })
    );

    let profiles = r#"<project name="x"><profile name="CJK" script="cjk"/><profile name="CJK" script="latin"/></project>"#;
    assert_eq!(
        decode_str(profiles),
        Err(DecodeError::DuplicateIdentifier { kind: "profile", id: "CJK".to_owned() })
    );
}

#[test]
fn malformed_documents_are_rejected() {
    let cases = [
        "",
        "not xml at all",
        "<project name=\"x\">",
        "<project name=\"x\"></page>",
        "<book name=\"x\"/>",
        "<project name=\"x\"/><project name=\"y\"/>",
        "<project name=\"x\">stray text</project>",
        "<project name=\"x\"><page id=\"one\" image=\"a.png\"/></project>",
        "<project name=\"x\"><page id=\"1\" image=\"a.png\" rotation=\"45\"/></project>",
        "<project name=\"x\"><profile name=\"p\" script=\"klingon\"/></project>",
    ];
    for xml in cases {
        let result = decode_str(xml);
        assert!(
            matches!(result, Err(DecodeError::MalformedTag { .. })),
            "{xml:?} decoded to {result:?}"
        );
    }
}

#[test]
fn test_invalid_region_values_are_rejected() {
    let zero_width = r#"<project name="x"><page id="1" image="a.png"><region id="1"><rect x="0" y="0" width="0" height="5"/></region></page></project>"#;
    assert!(matches!(decode_str(zero_width), Err(DecodeError::MalformedTag { .. })));

    let nan = r#"<project name="x"><page id="1" image="a.png"><region id="1"><rect x="NaN" y="0" width="4" height="5"/></region></page></project>"#;
    assert!(matches!(decode_str(nan), Err(DecodeError::MalformedTag { .. })));

    let two_geometries = r#"<project name="x"><page id="1" image="a.png"><region id="1"><rect x="0" y="0" width="4" height="5"/><rect x="0" y="0" width="4" height="5"/></region></page></project>"#;
    assert!(matches!(decode_str(two_geometries), Err(DecodeError::MalformedTag { .. })));
}

#[test]
fn maximal_identifiers_fail_to_decode() {
    let region = r#"<project name="p"><page id="1" image="a.png"><region id="18446744073709551615"><rect x="0" y="0" width="4" height="5"/></region></page></project>"#;
    let page = r#"<project name="p"><page id="18446744073709551615" image="a.png"/></project>"#;
    for xml in [region, page] {
        match decode_str(xml) {
            Err(DecodeError::MalformedTag { detail, .. }) => {
                assert!(detail.contains("identifiers left"), "{detail}")
            }
            other => panic!("{xml:?} decoded to {other:?}"),
        }
    }

    let largest = r#"<project name="p"><page id="18446744073709551614" image="a.png"/></project>"#;
    let project = decode_str(largest).expect("decode expected");
    assert_eq!(project.next_page_id(), u64::MAX);
}

#[test]
fn test_defaults_fill_optional_attributes() {
    let xml = r#"<project name="minimal"><page id="4" image="a.png"><region id="9"><rect x="1" y="2" width="3" height="4"/></region></page></project>"#;
    let project = decode_str(xml).expect("decode expected");

    assert_eq!(project.settings(), &doc_model::ProjectSettings::default());
    assert!(project.profiles().is_empty());
    let region = project.region(RegionId(9)).expect("region expected");
    assert_eq!(region.source_text(), "");
    assert_eq!(region.confidence(), 1.0);
    assert_eq!(region.style(), &TextStyle::default());
    assert!(!region.is_manually_edited());
    assert_eq!(project.next_region_id(), 10);
    assert_eq!(project.next_page_id(), 5);
    assert!(project.page(PageId(4)).is_some());
}

#[test]
fn newer_format_version_still_decodes() {
    let xml = r#"<project format="7" name="future"><hologram/></project>"#;
    let project = decode_str(xml).expect("decode expected");
    assert_eq!(project.extensions(), ["<hologram/>"]);
}

#[test]
fn test_non_finite_value_is_an_encode_error() {
    let mut project = sample_project();
    let page = project.pages()[0].id();
    let region = project.pages()[0].regions()[0].id();
    let mut style = project.region(region).expect("region expected").style().clone();
    style.size = f32::INFINITY;
    project.region_mut(region).expect("region expected").set_style(style);

    let error = encode(&project).expect_err("encode should fail");
    assert!(matches!(error, EncodeError::NonFiniteValue { .. }));
    assert!(project.page(page).is_some());
}

proptest! {
    #[test]
    fn any_text_survives_round_trip(
        source in "[^\\p{Cc}]{0,40}",
        translation in "[^\\p{Cc}]{0,40}",
        name in "[^\\p{Cc}]{1,20}",
    ) {
        let mut project = Project::new(name);
        let page_id = project.allocate_page_id().expect("page id expected");
        let mut page = Page::new(page_id, "p.png", PageMetadata::new(10, 10));
        let mut region = TextRegion::new(
            project.allocate_region_id().expect("region id expected"),
            Geometry::rect(0.0, 0.0, 5.0, 5.0),
            source,
        )
        .expect("valid region expected");
        region.set_translated_text(translation);
        page.push_region(region).expect("region insert expected");
        project.push_page(page).expect("page insert expected");

        let decoded = decode(&encode(&project).expect("encode expected")).expect("decode expected");
        prop_assert_eq!(decoded, project);
    }
}
