use crux_core::testing::AppTester;

use palletscope::api::ModelVersion;
use palletscope::app::{BoxColor, Event, Model, ViewState};
use palletscope::detection::{BoundingBox, Detection};
use palletscope::export::ExportFormat;
use palletscope::history::HistoryEntry;
use palletscope::App;

fn detection(class: &str, confidence: f64) -> Detection {
    Detection {
        class_label: class.into(),
        confidence,
        bbox: Some(BoundingBox::clamped(0.2, 0.2, 0.3, 0.3)),
    }
}

fn model_with_analysis() -> Model {
    let entry = HistoryEntry::new(
        "warehouse.jpg",
        ModelVersion::V2,
        vec![
            detection("Pallet", 0.93),
            detection("Pallet", 0.55),
            detection("Crate", 0.35),
        ],
    );
    let mut model = Model {
        current_analysis: Some(entry.clone()),
        ..Model::default()
    };
    model.history.push(entry);
    model
}

fn ready_total(app: &AppTester<App, palletscope::Effect>, model: &Model) -> usize {
    match app.view(model).state {
        ViewState::Ready { total, .. } => total,
        other => panic!("expected ready state, got {other:?}"),
    }
}

#[test]
fn threshold_slider_drives_filtered_set() {
    let app = AppTester::<App, _>::default();
    let mut model = model_with_analysis();

    assert_eq!(ready_total(&app, &model), 2);

    app.update(Event::ThresholdChanged { value: 0.25 }, &mut model);
    assert_eq!(ready_total(&app, &model), 3);

    app.update(Event::ThresholdChanged { value: 0.9 }, &mut model);
    assert_eq!(ready_total(&app, &model), 1);

    // Out-of-range values clamp instead of erroring.
    app.update(Event::ThresholdChanged { value: 1.5 }, &mut model);
    assert!((model.threshold - 1.0).abs() < 1e-9);
    assert_eq!(ready_total(&app, &model), 0);

    app.update(Event::ThresholdChanged { value: -0.5 }, &mut model);
    assert!(model.threshold.abs() < 1e-9);
    assert_eq!(ready_total(&app, &model), 3);
}

#[test]
fn overlay_style_events_reshape_the_view() {
    let app = AppTester::<App, _>::default();
    let mut model = model_with_analysis();

    app.update(Event::SetOverlayShrink { factor: 0.8 }, &mut model);
    app.update(
        Event::SetBoxColor {
            color: BoxColor::Green,
        },
        &mut model,
    );
    app.update(Event::SetShowLabels { show: false }, &mut model);

    let ViewState::Ready { overlays, .. } = app.view(&model).state else {
        panic!("expected ready state");
    };

    let overlay = &overlays[0];
    assert!((overlay.width_pct - 24.0).abs() < 1e-9);
    assert_eq!(overlay.color_hex, "#22c55e");
    assert!(overlay.label.is_none());
}

#[test]
fn bogus_shrink_factor_coerces_to_identity() {
    let app = AppTester::<App, _>::default();
    let mut model = model_with_analysis();

    app.update(Event::SetOverlayShrink { factor: f64::NAN }, &mut model);
    assert!((model.overlay.shrink - 1.0).abs() < 1e-9);

    app.update(Event::SetOverlayShrink { factor: -2.0 }, &mut model);
    assert!((model.overlay.shrink - 1.0).abs() < 1e-9);
}

#[test]
fn selecting_a_history_entry_restores_it() {
    let app = AppTester::<App, _>::default();
    let mut model = model_with_analysis();

    let older = HistoryEntry::new("older.jpg", ModelVersion::V1, vec![detection("Pallet", 0.8)]);
    let older_id = older.id.0.clone();
    model.history.push(older);
    model.current_analysis = None;

    app.update(Event::HistoryEntrySelected { id: older_id }, &mut model);

    let analysis = model.current_analysis.as_ref().expect("analysis restored");
    assert_eq!(analysis.file_name, "older.jpg");
    assert_eq!(model.model_version, ModelVersion::V1);

    let view = app.view(&model);
    assert!(matches!(view.state, ViewState::Ready { .. }));
    assert!(view.toast.is_some());
}

#[test]
fn unknown_history_id_is_ignored() {
    let app = AppTester::<App, _>::default();
    let mut model = model_with_analysis();

    app.update(
        Event::HistoryEntrySelected {
            id: "no-such-id".into(),
        },
        &mut model,
    );

    assert!(model.current_analysis.is_some());
    assert!(app.view(&model).error.is_none());
}

#[test]
fn model_version_selection_raises_toast_once() {
    let app = AppTester::<App, _>::default();
    let mut model = Model::default();

    app.update(
        Event::ModelVersionSelected {
            version: ModelVersion::V3,
        },
        &mut model,
    );
    assert_eq!(model.model_version, ModelVersion::V3);
    let toast = app.view(&model).toast.expect("toast raised");
    assert!(toast.message.contains("87.1"));

    // Re-selecting the same version is quiet.
    app.update(Event::DismissToast, &mut model);
    app.update(
        Event::ModelVersionSelected {
            version: ModelVersion::V3,
        },
        &mut model,
    );
    assert!(app.view(&model).toast.is_none());
}

#[test]
fn export_produces_payload_then_clears_on_delivery() {
    let app = AppTester::<App, _>::default();
    let mut model = model_with_analysis();

    app.update(
        Event::ExportRequested {
            format: ExportFormat::Csv,
        },
        &mut model,
    );

    let payload = app
        .view(&model)
        .pending_export
        .expect("export payload ready");
    assert_eq!(payload.mime_type, "text/csv");
    let text = String::from_utf8(payload.data).unwrap();
    assert!(text.starts_with("class,confidence,x,y,width,height"));
    assert_eq!(text.lines().count(), 4);

    app.update(Event::ExportDelivered, &mut model);
    assert!(app.view(&model).pending_export.is_none());
}

#[test]
fn export_without_analysis_is_an_invalid_state() {
    let app = AppTester::<App, _>::default();
    let mut model = Model::default();

    app.update(
        Event::ExportRequested {
            format: ExportFormat::Json,
        },
        &mut model,
    );

    let error = app.view(&model).error.expect("error surfaced");
    assert_eq!(error.error_code, "INVALID_STATE");
}

#[test]
fn clearing_history_empties_the_view() {
    let app = AppTester::<App, _>::default();
    let mut model = model_with_analysis();

    assert_eq!(app.view(&model).history.len(), 1);
    app.update(Event::ClearHistory, &mut model);
    assert!(app.view(&model).history.is_empty());
}
