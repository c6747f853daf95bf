use std::path::PathBuf;

use visionport_core::{
    file_name, DescriptorError, Modality, ModelDescriptor, ValidationError,
};

const DEEPLAB: &str = r#"
name = "deeplabv3"
modality = "semantic_segmentation"
outputs = ["out"]
work_dir = "/var/cache/visionport/deeplab"

[[inputs]]
type = "Image"

[model]
base_url = "https://models.example.com/deeplab/"
graph_path = "/deeplabv3.onnx"
graph_checksum = "ABCDEF"
features_path = "voc_labels.txt"
"#;

#[test]
fn parses_manifest_with_defaults() {
    let d = ModelDescriptor::from_toml_str(DEEPLAB).unwrap();
    assert_eq!(d.modality, Modality::SemanticSegmentation);
    assert_eq!(d.version, "1.0");
    assert_eq!(d.canonical_name(), "deeplabv3:1.0");
    assert_eq!(d.outputs, vec!["out".to_string()]);
    assert!(!d.model.is_archive);
    assert!(d.validate_inputs().is_ok());
}

#[test]
fn resolves_urls_against_base() {
    let d = ModelDescriptor::from_toml_str(DEEPLAB).unwrap();
    assert_eq!(
        d.graph_url().unwrap(),
        "https://models.example.com/deeplab/deeplabv3.onnx"
    );
    assert_eq!(
        d.features_url().unwrap().as_deref(),
        Some("https://models.example.com/deeplab/voc_labels.txt")
    );
    assert_eq!(
        d.graph_file().unwrap(),
        PathBuf::from("/var/cache/visionport/deeplab/deeplabv3.onnx")
    );
    assert_eq!(
        d.features_file().unwrap(),
        Some(PathBuf::from("/var/cache/visionport/deeplab/voc_labels.txt"))
    );
}

#[test]
fn relative_paths_need_a_base_url() {
    let d = ModelDescriptor::from_toml_str(
        r#"
name = "esrgan"
modality = "image_enhancement"
[[inputs]]
type = "image"
[model]
graph_path = "esrgan.onnx"
"#,
    )
    .unwrap();
    assert!(matches!(
        d.graph_url(),
        Err(DescriptorError::MissingBaseUrl {
            field: "graph_path"
        })
    ));
}

#[test]
fn absolute_locations_pass_through() {
    let d = ModelDescriptor::from_toml_str(
        r#"
name = "esrgan"
modality = "image_enhancement"
[[inputs]]
type = "image"
[model]
base_url = "https://ignored.example.com"
graph_path = "file:///models/esrgan.onnx"
"#,
    )
    .unwrap();
    assert_eq!(d.graph_url().unwrap(), "file:///models/esrgan.onnx");
    assert_eq!(d.features_url().unwrap(), None);
}

#[test]
fn archive_graph_lives_inside_work_dir() {
    let d = ModelDescriptor::from_toml_str(
        r#"
name = "ssd"
version = "2"
modality = "object_detection"
work_dir = "/tmp/ssd"
[[inputs]]
type = "image"
[model]
base_url = "https://models.example.com/ssd.tar.gz"
graph_path = "ssd/frozen.onnx"
is_archive = true
features_path = "coco.txt"
"#,
    )
    .unwrap();
    assert_eq!(d.graph_file().unwrap(), PathBuf::from("/tmp/ssd/ssd/frozen.onnx"));
}

#[test]
fn rejects_non_image_inputs() {
    let mut d = ModelDescriptor::from_toml_str(DEEPLAB).unwrap();
    d.inputs[0].kind = "audio".to_string();
    assert!(matches!(
        d.validate_inputs(),
        Err(ValidationError::UnsupportedInputSpec(_))
    ));

    d.inputs.clear();
    assert!(matches!(
        d.validate_inputs(),
        Err(ValidationError::UnsupportedInputSpec(_))
    ));
}

#[test]
fn unknown_modality_fails_to_parse() {
    let err = ModelDescriptor::from_toml_str(
        r#"
name = "x"
modality = "speech"
[model]
graph_path = "x.onnx"
"#,
    )
    .unwrap_err();
    assert!(matches!(err, DescriptorError::Parse(_)));
}

#[test]
fn file_name_strips_query_and_fragment() {
    assert_eq!(file_name("https://h/a/b/model.onnx?sig=1#frag"), "model.onnx");
    assert_eq!(file_name("labels.txt"), "labels.txt");
    assert_eq!(file_name("/abs/dir/labels.txt"), "labels.txt");
}

#[test]
fn modalities_round_trip_through_names() {
    for m in Modality::ALL {
        assert_eq!(m.as_str().parse::<Modality>().unwrap(), m);
    }
    assert!(!Modality::ImageEnhancement.needs_features());
    assert!(Modality::InstanceSegmentation.needs_features());
}
