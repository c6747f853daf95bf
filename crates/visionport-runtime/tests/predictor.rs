mod common;

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::*;
use visionport_core::{
    BackendError, DType, DecodeError, DescriptorError, FetchError, FetchOutcome, Fetcher, IOName,
    Modality, PredictionOptions, PredictorError, Shape, ShapeError, StateError, Tensor,
    ValidationError,
};
use visionport_runtime::{Features, Predictor, PredictorRegistry, PredictorState};

fn predictor(fixture: &ModelFixture, modality: Modality, backend: &MockBackend) -> Predictor {
    PredictorRegistry::with_defaults()
        .create(
            fixture.descriptor(modality),
            context(backend, Arc::new(CountingFetcher::default())),
        )
        .unwrap()
}

#[tokio::test]
async fn enhancement_end_to_end() {
    let fixture = ModelFixture::new();
    let backend = MockBackend::new(Script::Echo);
    let mut p = predictor(&fixture, Modality::ImageEnhancement, &backend);

    p.load().await.unwrap();
    assert_eq!(p.state(), PredictorState::Loaded);
    p.predict(&[coded_image(3, 4, 4)]).unwrap();
    assert_eq!(p.state(), PredictorState::Ready);

    let Features::ImageEnhancement(out) = p.read_predicted_features().unwrap() else {
        panic!("wrong feature kind");
    };
    assert_eq!(out.images.len(), 1);
    assert_eq!(out.images[0].len(), 4);
    assert_eq!(out.images[0][0].len(), 4);
    assert_eq!(out.images[0][2][3], [23.0, 123.0, 223.0]);
    assert_eq!(*backend.seen.lock().unwrap(), vec![Shape::from_slice(&[1, 3, 4, 4])]);
}

#[tokio::test]
async fn segmentation_end_to_end_uses_label_file() {
    let fixture = ModelFixture::new();
    // [1, 3, 2, 2]: class 2 wins at (0, 0), class 1 at (1, 1), class 0 elsewhere.
    let scores = f32_tensor(
        &[1, 3, 2, 2],
        &[
            0.5, 0.9, 0.9, 0.1, //
            0.2, 0.0, 0.0, 0.8, //
            0.7, 0.1, 0.1, 0.3,
        ],
    );
    let backend = MockBackend::new(Script::Fixed(vec![scores]));
    let mut p = predictor(&fixture, Modality::SemanticSegmentation, &backend);

    p.load().await.unwrap();
    assert_eq!(p.labels(), ["background", "person", "cat"]);
    p.predict(&[coded_image(3, 2, 2)]).unwrap();

    let Features::SemanticSegmentation(seg) = p.read_predicted_features().unwrap() else {
        panic!("wrong feature kind");
    };
    assert_eq!(seg.masks, vec![vec![vec![2, 0], vec![0, 1]]]);
    assert_eq!(seg.label_at(0, 0, 0), Some("cat"));
    assert_eq!(seg.label_at(0, 1, 1), Some("person"));
}

#[tokio::test]
async fn close_is_idempotent() {
    let fixture = ModelFixture::new();
    let backend = MockBackend::new(Script::Echo);
    let mut p = predictor(&fixture, Modality::ImageEnhancement, &backend);

    p.close();
    p.close();
    assert_eq!(p.state(), PredictorState::Closed);

    let mut loaded = predictor(&fixture, Modality::ImageEnhancement, &backend);
    loaded.load().await.unwrap();
    loaded.close();
    loaded.close();
    assert_eq!(loaded.state(), PredictorState::Closed);
}

#[tokio::test]
async fn use_after_close_is_reported() {
    let fixture = ModelFixture::new();
    let backend = MockBackend::new(Script::Echo);
    let mut p = predictor(&fixture, Modality::ImageEnhancement, &backend);
    p.load().await.unwrap();
    p.close();

    assert!(matches!(
        p.predict(&[coded_image(3, 2, 2)]),
        Err(PredictorError::Backend(BackendError::UseAfterClose))
    ));
    assert!(matches!(
        p.read_predicted_features(),
        Err(PredictorError::State(StateError::Closed))
    ));
    assert!(matches!(
        p.load().await,
        Err(PredictorError::State(StateError::Closed))
    ));
}

#[tokio::test]
async fn predict_before_load_fails() {
    let fixture = ModelFixture::new();
    let backend = MockBackend::new(Script::Echo);
    let mut p = predictor(&fixture, Modality::ImageEnhancement, &backend);

    assert!(matches!(
        p.predict(&[coded_image(3, 2, 2)]),
        Err(PredictorError::State(StateError::NotLoaded))
    ));
    assert_eq!(backend.load_count(), 0);
}

#[tokio::test]
async fn read_before_predict_has_no_output() {
    let fixture = ModelFixture::new();
    let backend = MockBackend::new(Script::Echo);
    let mut p = predictor(&fixture, Modality::ImageEnhancement, &backend);
    p.load().await.unwrap();

    assert!(matches!(
        p.read_predicted_features(),
        Err(PredictorError::State(StateError::NoOutputAvailable))
    ));
    assert!(matches!(
        p.read_raw_outputs(),
        Err(PredictorError::State(StateError::NoOutputAvailable))
    ));
}

#[tokio::test]
async fn download_then_load_fetches_once() {
    let fixture = ModelFixture::new();
    let backend = MockBackend::new(Script::Echo);
    let fetcher = Arc::new(CountingFetcher::default());
    let mut p = PredictorRegistry::with_defaults()
        .create(
            fixture.descriptor(Modality::SemanticSegmentation),
            context(&backend, fetcher.clone()),
        )
        .unwrap();

    p.download().await.unwrap();
    assert_eq!(p.state(), PredictorState::Downloaded);
    assert_eq!(backend.load_count(), 0);
    p.download().await.unwrap();
    p.load().await.unwrap();
    p.load().await.unwrap();

    assert_eq!(fetcher.files.load(Ordering::SeqCst), 2);
    assert_eq!(fetcher.downloads(), 2);
    assert_eq!(backend.load_count(), 1);

    let artifacts = p.artifacts().unwrap();
    assert_eq!(artifacts.graph_path, fixture.work_path("model.onnx"));
    assert_eq!(artifacts.features_path, Some(fixture.work_path("labels.txt")));
}

#[tokio::test]
async fn second_predictor_reuses_downloaded_files() {
    let fixture = ModelFixture::new();
    let backend = MockBackend::new(Script::Echo);
    let mut first = predictor(&fixture, Modality::ObjectDetection, &backend);
    first.load().await.unwrap();

    let fetcher = Arc::new(CountingFetcher::default());
    let mut second = PredictorRegistry::with_defaults()
        .create(
            fixture.descriptor(Modality::ObjectDetection),
            context(&backend, fetcher.clone()),
        )
        .unwrap();
    second.load().await.unwrap();

    assert_eq!(fetcher.files.load(Ordering::SeqCst), 2);
    assert_eq!(fetcher.downloads(), 0);
    assert_eq!(backend.load_count(), 2);
}

#[tokio::test]
async fn checksum_mismatch_never_reaches_backend() {
    let fixture = ModelFixture::new();
    let backend = MockBackend::new(Script::Echo);
    let mut descriptor = fixture.descriptor(Modality::ImageEnhancement);
    descriptor.model.graph_checksum = Some("00".repeat(32));
    let mut p = PredictorRegistry::with_defaults()
        .create(descriptor, context(&backend, Arc::new(CountingFetcher::default())))
        .unwrap();

    let err = p.load().await.unwrap_err();
    assert!(matches!(
        err,
        PredictorError::Integrity {
            source: FetchError::Integrity { .. },
            ..
        }
    ));
    assert_eq!(backend.load_count(), 0);
    assert!(!fixture.work_path("model.onnx").exists());
    assert_eq!(p.state(), PredictorState::Uninitialized);
}

#[tokio::test]
async fn matching_checksum_loads() {
    let fixture = ModelFixture::new();
    let backend = MockBackend::new(Script::Echo);
    let mut descriptor = fixture.descriptor(Modality::ImageEnhancement);
    descriptor.model.graph_checksum = Some(fixture.graph_checksum().to_uppercase());
    let mut p = PredictorRegistry::with_defaults()
        .create(descriptor, context(&backend, Arc::new(CountingFetcher::default())))
        .unwrap();

    p.load().await.unwrap();
    assert_eq!(backend.load_count(), 1);
}

#[tokio::test]
async fn missing_remote_file_is_a_download_error() {
    let fixture = ModelFixture::new();
    let backend = MockBackend::new(Script::Echo);
    let mut descriptor = fixture.descriptor(Modality::ImageEnhancement);
    descriptor.model.graph_path = "missing.onnx".to_string();
    let mut p = PredictorRegistry::with_defaults()
        .create(descriptor, context(&backend, Arc::new(CountingFetcher::default())))
        .unwrap();

    assert!(matches!(
        p.download().await,
        Err(PredictorError::Download {
            source: FetchError::Download { .. },
            ..
        })
    ));
}

struct StalledFetcher;

#[async_trait]
impl Fetcher for StalledFetcher {
    async fn fetch_file(
        &self,
        _url: &str,
        _dest: &Path,
        _checksum: Option<&str>,
    ) -> Result<FetchOutcome, FetchError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(FetchOutcome::Downloaded)
    }

    async fn fetch_archive_into(&self, _url: &str, _dest_dir: &Path) -> Result<(), FetchError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

#[tokio::test]
async fn stalled_download_times_out() {
    let fixture = ModelFixture::new();
    let backend = MockBackend::new(Script::Echo);
    let mut ctx = context(&backend, Arc::new(StalledFetcher));
    ctx.options = PredictionOptions::default().with_download_timeout(Duration::from_millis(20));
    let mut p = PredictorRegistry::with_defaults()
        .create(fixture.descriptor(Modality::ImageEnhancement), ctx)
        .unwrap();

    assert!(matches!(
        p.load().await,
        Err(PredictorError::Download {
            source: FetchError::TimedOut { .. },
            ..
        })
    ));
    assert_eq!(backend.load_count(), 0);
}

#[tokio::test]
async fn rejects_bad_inputs() {
    let fixture = ModelFixture::new();
    let backend = MockBackend::new(Script::Echo);
    let mut p = predictor(&fixture, Modality::ImageEnhancement, &backend);
    p.load().await.unwrap();

    assert!(matches!(
        p.predict(&[]),
        Err(PredictorError::Validation(ValidationError::NilInput))
    ));

    let ints = Tensor::from_bytes(DType::I64, Shape::from_slice(&[1]), vec![0u8; 8].into());
    assert!(matches!(
        p.predict(&[coded_image(3, 2, 2), ints]),
        Err(PredictorError::Validation(ValidationError::WrongTensorType {
            index: 1,
            expected: DType::F32,
            got: DType::I64,
        }))
    ));

    assert!(matches!(
        p.predict(&[coded_image(3, 2, 2), coded_image(3, 2, 3)]),
        Err(PredictorError::Shape(ShapeError::InconsistentShape { index: 1, .. }))
    ));
    assert!(backend.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn batches_samples_along_leading_axis() {
    let fixture = ModelFixture::new();
    let backend = MockBackend::new(Script::Echo);
    let mut p = predictor(&fixture, Modality::ImageEnhancement, &backend);
    p.load().await.unwrap();

    p.predict(&[coded_image(3, 2, 2), coded_image(3, 2, 2)]).unwrap();
    let features = p.read_predicted_features().unwrap();
    assert_eq!(features.batch_len(), 2);
    assert_eq!(features.modality(), Modality::ImageEnhancement);
    assert_eq!(*backend.seen.lock().unwrap(), vec![Shape::from_slice(&[2, 3, 2, 2])]);
}

#[tokio::test]
async fn unsupported_input_spec_is_rejected_at_construction() {
    let fixture = ModelFixture::new();
    let backend = MockBackend::new(Script::Echo);
    let mut descriptor = fixture.descriptor(Modality::ImageEnhancement);
    descriptor.inputs[0].kind = "text".to_string();

    let err = PredictorRegistry::with_defaults()
        .create(descriptor, context(&backend, Arc::new(CountingFetcher::default())))
        .err()
        .expect("text input must be rejected");
    assert!(matches!(
        err,
        PredictorError::Validation(ValidationError::UnsupportedInputSpec(_))
    ));
}

#[tokio::test]
async fn failed_inference_clears_previous_outputs() {
    let fixture = ModelFixture::new();
    let backend = MockBackend::new(Script::Echo);
    let mut p = predictor(&fixture, Modality::ImageEnhancement, &backend);
    p.load().await.unwrap();
    p.predict(&[coded_image(3, 2, 2)]).unwrap();

    // A 4-channel output cannot be read as RGB.
    p.predict(&[coded_image(4, 2, 2)]).unwrap();
    assert!(matches!(
        p.read_predicted_features(),
        Err(PredictorError::Decode(DecodeError::ShapeMismatch { output: "enhanced", .. }))
    ));

    let failing = MockBackend::new(Script::Fail);
    let mut q = predictor(&fixture, Modality::ImageEnhancement, &failing);
    q.load().await.unwrap();
    assert!(matches!(
        q.predict(&[coded_image(3, 2, 2)]),
        Err(PredictorError::Backend(BackendError::InferFailed { .. }))
    ));
    assert!(matches!(
        q.read_predicted_features(),
        Err(PredictorError::State(StateError::NoOutputAvailable))
    ));
}

#[tokio::test]
async fn reset_drops_outputs_and_resets_stateful_sessions() {
    let fixture = ModelFixture::new();
    let backend = MockBackend::new(Script::Echo).stateful();
    let mut p = predictor(&fixture, Modality::ImageEnhancement, &backend);
    p.load().await.unwrap();
    p.predict(&[coded_image(3, 2, 2)]).unwrap();

    p.reset().unwrap();
    assert_eq!(p.state(), PredictorState::Loaded);
    assert_eq!(backend.resets.load(Ordering::SeqCst), 1);
    assert!(matches!(
        p.read_predicted_features(),
        Err(PredictorError::State(StateError::NoOutputAvailable))
    ));

    let stateless = MockBackend::new(Script::Echo);
    let mut q = predictor(&fixture, Modality::ImageEnhancement, &stateless);
    q.load().await.unwrap();
    q.reset().unwrap();
    assert_eq!(stateless.resets.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn raw_outputs_are_named() {
    let fixture = ModelFixture::new();
    let backend = MockBackend::new(Script::Fixed(vec![
        f32_tensor(&[1, 2], &[0.25, 0.75]),
        f32_tensor(&[1], &[3.0]),
    ]));
    let mut descriptor = fixture.descriptor(Modality::ImageEnhancement);
    descriptor.outputs = vec!["scores".to_string()];
    let mut p = PredictorRegistry::with_defaults()
        .create(descriptor, context(&backend, Arc::new(CountingFetcher::default())))
        .unwrap();
    p.load().await.unwrap();
    p.predict(&[coded_image(3, 2, 2)]).unwrap();

    let raw = p.read_raw_outputs().unwrap();
    let names: Vec<&IOName> = raw.outputs.iter().map(|(n, _)| n).collect();
    assert_eq!(
        names,
        [&IOName("scores".to_string()), &IOName("out1".to_string())]
    );
    assert_eq!(raw.outputs[0].1.to_f32_vec().unwrap(), vec![0.25, 0.75]);
}

#[tokio::test]
async fn descriptor_must_match_predictor_modality() {
    let fixture = ModelFixture::new();
    let backend = MockBackend::new(Script::Echo);
    let ctx = context(&backend, Arc::new(CountingFetcher::default()));

    let err = Predictor::new(
        Modality::ObjectDetection,
        fixture.descriptor(Modality::ImageEnhancement),
        ctx.options.clone(),
        ctx.backend.clone(),
        ctx.fetcher.clone(),
    )
    .err()
    .expect("modality mismatch must be rejected");
    assert!(matches!(
        err,
        PredictorError::Descriptor(DescriptorError::ModalityMismatch { .. })
    ));

    let mut descriptor = fixture.descriptor(Modality::ObjectDetection);
    descriptor.model.features_path = None;
    let err = Predictor::new(
        Modality::ObjectDetection,
        descriptor,
        ctx.options.clone(),
        ctx.backend,
        ctx.fetcher,
    )
    .err()
    .expect("detection without labels must be rejected");
    assert!(matches!(
        err,
        PredictorError::Descriptor(DescriptorError::MissingFeatures(Modality::ObjectDetection))
    ));
}
