//! The Crux application: event handling and view derivation.
//!
//! `update` owns state transitions and effect dispatch; `view` re-derives
//! everything display-ready (filtered detections, overlay rectangles, class
//! counts) from the model on every call, so a threshold change is nothing
//! more than a field write plus a render.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::{self, ApiConfig, ApiError, ModelVersion};
use crate::capabilities::http::HttpResult;
use crate::capabilities::kv::{self, KeyNamespace, KvError, KvKey};
use crate::capabilities::{http, Capabilities};
use crate::detection::{
    clamp_threshold, coerce_shrink_factor, filter_and_count, normalize_response, shrink_to_center,
    Detection, FilterSummary,
};
use crate::export::{render_export, ExportFormat, ExportPayload};
use crate::history::{HistoryEntry, HistoryLog};
use crate::image_processing::{stage_upload, StagedImage, StagingConfig};
use crate::{
    AnalysisId, AppError, ErrorKind, ToastKind, ToastMessage, DEFAULT_CONFIDENCE_THRESHOLD,
    DEFAULT_OVERLAY_SHRINK,
};

/// KV key the history snapshot lives under.
const HISTORY_STORE_KEY: &str = "log_v1";

/// Overlay color choices the shell offers. Hex values are what the renderer
/// feeds into CSS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BoxColor {
    #[default]
    Blue,
    Green,
    Orange,
    Red,
}

impl BoxColor {
    #[must_use]
    pub const fn hex(self) -> &'static str {
        match self {
            Self::Blue => "#3b82f6",
            Self::Green => "#22c55e",
            Self::Orange => "#f97316",
            Self::Red => "#ef4444",
        }
    }
}

/// How overlays are drawn. All fields are plain configuration; the geometry
/// math lives in the detection module.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayStyle {
    pub shrink: f64,
    pub show_labels: bool,
    pub color: BoxColor,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            shrink: DEFAULT_OVERLAY_SHRINK,
            show_labels: true,
            color: BoxColor::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    Noop,

    AppStarted,

    ImageSelected {
        data: Vec<u8>,
        file_name: String,
    },
    ClearImage,

    AnalyzeResponse(Box<HttpResult>),

    ThresholdChanged {
        value: f64,
    },
    ModelVersionSelected {
        version: ModelVersion,
    },
    SetShowLabels {
        show: bool,
    },
    SetOverlayShrink {
        factor: f64,
    },
    SetBoxColor {
        color: BoxColor,
    },

    HistoryEntrySelected {
        id: String,
    },
    ClearHistory,
    HistoryRestored {
        result: Box<Result<Option<Vec<u8>>, KvError>>,
    },
    HistoryPersisted {
        result: Box<Result<(), KvError>>,
    },

    ExportRequested {
        format: ExportFormat,
    },
    ExportDelivered,

    DismissError,
    DismissToast,
}

impl Event {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::AppStarted => "app_started",
            Self::ImageSelected { .. } => "image_selected",
            Self::ClearImage => "clear_image",
            Self::AnalyzeResponse(_) => "analyze_response",
            Self::ThresholdChanged { .. } => "threshold_changed",
            Self::ModelVersionSelected { .. } => "model_version_selected",
            Self::SetShowLabels { .. } => "set_show_labels",
            Self::SetOverlayShrink { .. } => "set_overlay_shrink",
            Self::SetBoxColor { .. } => "set_box_color",
            Self::HistoryEntrySelected { .. } => "history_entry_selected",
            Self::ClearHistory => "clear_history",
            Self::HistoryRestored { .. } => "history_restored",
            Self::HistoryPersisted { .. } => "history_persisted",
            Self::ExportRequested { .. } => "export_requested",
            Self::ExportDelivered => "export_delivered",
            Self::DismissError => "dismiss_error",
            Self::DismissToast => "dismiss_toast",
        }
    }

    #[must_use]
    pub const fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            Self::ImageSelected { .. }
                | Self::ClearImage
                | Self::ThresholdChanged { .. }
                | Self::ModelVersionSelected { .. }
                | Self::SetShowLabels { .. }
                | Self::SetOverlayShrink { .. }
                | Self::SetBoxColor { .. }
                | Self::HistoryEntrySelected { .. }
                | Self::ClearHistory
                | Self::ExportRequested { .. }
                | Self::DismissError
                | Self::DismissToast
        )
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::Noop
    }
}

pub struct Model {
    pub staged_image: Option<StagedImage>,
    /// The analysis currently on screen. Also lives in the history log; this
    /// copy is what `view` derives from.
    pub current_analysis: Option<HistoryEntry>,
    pub threshold: f64,
    pub overlay: OverlayStyle,
    pub model_version: ModelVersion,
    pub api: ApiConfig,
    pub staging: StagingConfig,
    pub history: HistoryLog,
    pub is_processing: bool,
    pub active_error: Option<AppError>,
    pub active_toast: Option<ToastMessage>,
    pub pending_export: Option<ExportPayload>,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            staged_image: None,
            current_analysis: None,
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            overlay: OverlayStyle::default(),
            model_version: ModelVersion::default(),
            api: ApiConfig::default(),
            staging: StagingConfig::default(),
            history: HistoryLog::new(),
            is_processing: false,
            active_error: None,
            active_toast: None,
            pending_export: None,
        }
    }
}

impl Model {
    pub fn set_error(&mut self, error: AppError) {
        self.active_error = Some(error);
    }

    pub fn clear_error(&mut self) {
        self.active_error = None;
    }

    pub fn show_toast(&mut self, message: impl Into<String>, kind: ToastKind) {
        self.active_toast = Some(ToastMessage::new(message, kind));
    }

    pub fn clear_toast(&mut self) {
        self.active_toast = None;
    }
}

/// One rectangle for the shell to absolutely position over the preview,
/// already in percent space.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OverlayBox {
    pub left_pct: f64,
    pub top_pct: f64,
    pub width_pct: f64,
    pub height_pct: f64,
    pub label: Option<String>,
    pub confidence_pct: u8,
    pub color_hex: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DetectionListItem {
    pub class_label: String,
    pub confidence_pct: u8,
    pub has_bbox: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClassCountView {
    pub label: String,
    pub count: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HistoryItemView {
    pub id: String,
    pub summary_text: String,
    pub model_version: String,
    pub captured_at_ms: u64,
}

impl From<&HistoryEntry> for HistoryItemView {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            id: entry.id.0.clone(),
            summary_text: entry.summary_text(),
            model_version: entry.model_version.as_str().to_string(),
            captured_at_ms: entry.captured_at.as_millis(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ModelVersionView {
    pub version: String,
    pub display_name: String,
    pub precision_pct: f64,
    pub is_selected: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserFacingError {
    pub message: String,
    pub is_retryable: bool,
    pub error_code: String,
}

impl From<&AppError> for UserFacingError {
    fn from(e: &AppError) -> Self {
        Self {
            message: e.user_facing_message(),
            is_retryable: e.is_retryable(),
            error_code: e.code().to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToastView {
    pub message: String,
    pub kind: ToastKind,
    pub duration_ms: u64,
}

impl From<&ToastMessage> for ToastView {
    fn from(t: &ToastMessage) -> Self {
        Self {
            message: t.message.clone(),
            kind: t.kind,
            duration_ms: t.duration_ms,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewState {
    /// Nothing uploaded yet (or the image was cleared).
    Idle { has_image: bool },
    /// Upload sent, waiting on the detection service.
    Processing { file_name: String },
    /// An analysis is on screen.
    Ready {
        file_name: String,
        model_version: String,
        threshold: f64,
        threshold_pct: u8,
        overlays: Vec<OverlayBox>,
        detections: Vec<DetectionListItem>,
        class_counts: Vec<ClassCountView>,
        total: usize,
        detected_none: bool,
        show_labels: bool,
        overlay_shrink: f64,
        box_color: BoxColor,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ViewModel {
    pub state: ViewState,
    pub error: Option<UserFacingError>,
    pub toast: Option<ToastView>,
    pub history: Vec<HistoryItemView>,
    pub model_versions: Vec<ModelVersionView>,
    pub pending_export: Option<ExportPayload>,
}

#[derive(Default)]
pub struct App;

impl App {
    fn history_key() -> KvKey {
        KvKey::new(KeyNamespace::History, HISTORY_STORE_KEY)
            .expect("history store key is statically valid")
    }

    fn persist_history(model: &Model, caps: &Capabilities) {
        let bytes = match model.history.to_snapshot_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "history snapshot serialization failed, skipping persist");
                return;
            }
        };

        if let Err(e) = kv::write(&caps.kv, &Self::history_key(), bytes, |result| {
            Event::HistoryPersisted {
                result: Box::new(result),
            }
        }) {
            warn!(error = %e, "history snapshot rejected before dispatch");
        }
    }

    fn send_analyze_request(model: &mut Model, caps: &Capabilities, staged: &StagedImage) -> bool {
        let request = match api::build_analyze_request(&model.api, staged, model.model_version) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "analyze request construction failed");
                model.set_error(AppError::new(ErrorKind::Analysis, e.to_string()));
                return false;
            }
        };

        debug!(
            url = request.url().as_str(),
            bytes = staged.size_bytes(),
            version = %model.model_version,
            "dispatching analyze request"
        );

        http::execute(&caps.http, request, |result| {
            Event::AnalyzeResponse(Box::new(result))
        });
        true
    }

    fn handle_analyze_response(result: HttpResult, model: &mut Model, caps: &Capabilities) {
        let outcome = result
            .map_err(ApiError::from)
            .and_then(|response| api::parse_analyze_response(&response));

        match outcome {
            Ok(response) => {
                let detections = normalize_response(&response);
                let file_name = model
                    .staged_image
                    .as_ref()
                    .map_or_else(|| "image.jpg".to_string(), |s| s.file_name.clone());

                let entry = HistoryEntry::new(file_name, model.model_version, detections);
                let summary_text = entry.summary_text();

                debug!(
                    total = entry.total_count,
                    inference_secs = response.time.unwrap_or_default(),
                    "analysis complete"
                );

                model.history.push(entry.clone());
                model.current_analysis = Some(entry);
                Self::persist_history(model, caps);

                model.show_toast(format!("Analysis complete! {summary_text}."), ToastKind::Success);
            }
            Err(e) => {
                warn!(error = %e, "analysis failed");
                model.current_analysis = None;
                model.set_error(e.into());
            }
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn percent(value: f64) -> u8 {
        (value * 100.0).round().clamp(0.0, 100.0) as u8
    }

    fn build_overlays(summary: &FilterSummary, style: &OverlayStyle) -> Vec<OverlayBox> {
        summary
            .filtered
            .iter()
            .filter_map(|detection| {
                let bbox = detection.bbox.as_ref()?;
                let drawn = shrink_to_center(bbox, style.shrink);
                let confidence_pct = Self::percent(detection.confidence);

                Some(OverlayBox {
                    left_pct: drawn.x * 100.0,
                    top_pct: drawn.y * 100.0,
                    width_pct: drawn.width * 100.0,
                    height_pct: drawn.height * 100.0,
                    label: style
                        .show_labels
                        .then(|| format!("{} {confidence_pct}%", detection.class_label)),
                    confidence_pct,
                    color_hex: style.color.hex().to_string(),
                })
            })
            .collect()
    }

    fn build_list_items(filtered: &[Detection]) -> Vec<DetectionListItem> {
        filtered
            .iter()
            .map(|detection| DetectionListItem {
                class_label: detection.class_label.clone(),
                confidence_pct: Self::percent(detection.confidence),
                has_bbox: detection.has_bbox(),
            })
            .collect()
    }

    fn build_version_views(selected: ModelVersion) -> Vec<ModelVersionView> {
        ModelVersion::ALL
            .iter()
            .map(|&version| ModelVersionView {
                version: version.as_str().to_string(),
                display_name: version.display_name(),
                precision_pct: version.precision_pct(),
                is_selected: version == selected,
            })
            .collect()
    }
}

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        debug!(event = event.name(), "handling event");

        match event {
            Event::Noop => {}

            Event::AppStarted => {
                kv::read(&caps.kv, &Self::history_key(), |result| {
                    Event::HistoryRestored {
                        result: Box::new(result),
                    }
                });
                caps.render.render();
            }

            Event::ImageSelected { data, file_name } => {
                if model.is_processing {
                    debug!("image selection ignored while an analysis is in flight");
                    return;
                }

                match stage_upload(&data, &file_name, &model.staging) {
                    Ok(staged) => {
                        model.clear_error();
                        model.current_analysis = None;

                        if Self::send_analyze_request(model, caps, &staged) {
                            model.is_processing = true;
                        }
                        model.staged_image = Some(staged);
                    }
                    Err(e) => {
                        warn!(error = %e, file_name = %file_name, "image staging failed");
                        model.set_error(e.into());
                    }
                }

                caps.render.render();
            }

            Event::ClearImage => {
                model.staged_image = None;
                model.current_analysis = None;
                caps.render.render();
            }

            Event::AnalyzeResponse(result) => {
                model.is_processing = false;
                Self::handle_analyze_response(*result, model, caps);
                caps.render.render();
            }

            Event::ThresholdChanged { value } => {
                model.threshold = clamp_threshold(value);
                caps.render.render();
            }

            Event::ModelVersionSelected { version } => {
                if model.model_version != version {
                    model.model_version = version;
                    model.show_toast(
                        format!(
                            "Model version changed. Now using version {} with {:.1}% precision.",
                            version.as_str(),
                            version.precision_pct()
                        ),
                        ToastKind::Info,
                    );
                }
                caps.render.render();
            }

            Event::SetShowLabels { show } => {
                model.overlay.show_labels = show;
                caps.render.render();
            }

            Event::SetOverlayShrink { factor } => {
                model.overlay.shrink = coerce_shrink_factor(factor);
                caps.render.render();
            }

            Event::SetBoxColor { color } => {
                model.overlay.color = color;
                caps.render.render();
            }

            Event::HistoryEntrySelected { id } => {
                let id = AnalysisId::new(id);
                if let Some(entry) = model.history.get(&id) {
                    model.model_version = entry.model_version;
                    model.current_analysis = Some(entry.clone());
                    model.staged_image = None;
                    model.show_toast("Loaded from history", ToastKind::Info);
                } else {
                    debug!(id = %id, "history entry not found");
                }
                caps.render.render();
            }

            Event::ClearHistory => {
                model.history.clear();
                Self::persist_history(model, caps);
                caps.render.render();
            }

            Event::HistoryRestored { result } => {
                match *result {
                    Ok(Some(bytes)) => match HistoryLog::from_snapshot_bytes(&bytes) {
                        Ok(log) => {
                            debug!(entries = log.len(), "history restored");
                            model.history = log;
                        }
                        Err(e) => {
                            warn!(error = %e, "history snapshot unreadable, starting fresh");
                        }
                    },
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, "history restore failed");
                    }
                }
                caps.render.render();
            }

            Event::HistoryPersisted { result } => {
                if let Err(e) = *result {
                    warn!(error = %e, "history persist failed");
                }
            }

            Event::ExportRequested { format } => {
                match &model.current_analysis {
                    Some(entry) => match render_export(entry, format) {
                        Ok(payload) => {
                            model.pending_export = Some(payload);
                        }
                        Err(e) => {
                            warn!(error = %e, "export rendering failed");
                            model.set_error(e.into());
                        }
                    },
                    None => {
                        model.set_error(AppError::new(
                            ErrorKind::InvalidState,
                            "There is no analysis to export yet.",
                        ));
                    }
                }
                caps.render.render();
            }

            Event::ExportDelivered => {
                model.pending_export = None;
                caps.render.render();
            }

            Event::DismissError => {
                model.clear_error();
                caps.render.render();
            }

            Event::DismissToast => {
                model.clear_toast();
                caps.render.render();
            }
        }
    }

    fn view(&self, model: &Model) -> ViewModel {
        let state = if model.is_processing {
            let file_name = model
                .staged_image
                .as_ref()
                .map_or_else(String::new, |s| s.file_name.clone());
            ViewState::Processing { file_name }
        } else if let Some(analysis) = &model.current_analysis {
            let summary = filter_and_count(&analysis.detections, model.threshold);

            ViewState::Ready {
                file_name: analysis.file_name.clone(),
                model_version: analysis.model_version.as_str().to_string(),
                threshold: model.threshold,
                threshold_pct: Self::percent(model.threshold),
                overlays: Self::build_overlays(&summary, &model.overlay),
                detections: Self::build_list_items(&summary.filtered),
                class_counts: summary
                    .class_counts
                    .iter()
                    .map(|(label, count)| ClassCountView {
                        label: label.to_string(),
                        count,
                    })
                    .collect(),
                total: summary.total,
                detected_none: summary.total == 0,
                show_labels: model.overlay.show_labels,
                overlay_shrink: model.overlay.shrink,
                box_color: model.overlay.color,
            }
        } else {
            ViewState::Idle {
                has_image: model.staged_image.is_some(),
            }
        };

        ViewModel {
            state,
            error: model.active_error.as_ref().map(UserFacingError::from),
            toast: model.active_toast.as_ref().map(ToastView::from),
            history: model.history.iter().map(HistoryItemView::from).collect(),
            model_versions: Self::build_version_views(model.model_version),
            pending_export: model.pending_export.clone(),
        }
    }
}
