use crate::ocr::Pipeline;
use crate::ocr::engine::RecognitionEngine;
use crate::providers::Provider;
use crate::semantic::SemanticService;

pub(crate) struct ServerState<E: RecognitionEngine, P: Provider> {
    pub(crate) pipeline: Pipeline<E>,
    /// Absent when no language-model key was configured at startup.
    pub(crate) semantic: Option<SemanticService<P>>,
}
