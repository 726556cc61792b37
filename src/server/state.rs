use std::sync::Arc;

use crate::ocr::TextDetector;
use crate::render::Compositor;
use crate::settings::Settings;
use crate::translate::{Batcher, TranslationBackend};

/// Shared by every request. Pipelines are built per request from these parts.
#[derive(Clone)]
pub struct ServerState {
    pub(crate) settings: Settings,
    pub(crate) batcher: Batcher,
    pub(crate) detector: Arc<dyn TextDetector>,
    pub(crate) compositor: Compositor,
}

impl ServerState {
    pub fn new(
        settings: Settings,
        backend: Arc<dyn TranslationBackend>,
        detector: Arc<dyn TextDetector>,
        compositor: Compositor,
    ) -> Self {
        let batcher = Batcher::from_settings(backend, &settings);
        Self {
            settings,
            batcher,
            detector,
            compositor,
        }
    }
}
