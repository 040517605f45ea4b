use crate::detection::DetectionResult;

/// What the presentation layer is currently showing for one detection.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DetectionView {
    #[default]
    Idle,
    Analyzing,
    Complete(DetectionResult),
    /// Holds a message that is safe to show to the farmer.
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// A second image was submitted while the first one is still being analysed.
    #[error("an image is already being analysed")]
    AlreadyAnalyzing,
    /// An outcome arrived with no analysis in flight.
    #[error("no analysis is in progress")]
    NotAnalyzing,
}

/// Client-side state machine for one detection panel:
/// `idle -> analyzing -> complete | error`, with `reset` back to idle.
/// Re-submitting from `complete` or `error` is the manual retry path.
#[derive(Debug, Clone, Default)]
pub struct DetectionSession {
    view: DetectionView,
}

impl DetectionSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> &DetectionView {
        &self.view
    }

    pub fn is_analyzing(&self) -> bool {
        matches!(self.view, DetectionView::Analyzing)
    }

    pub fn begin_analysis(&mut self) -> Result<(), SessionError> {
        if self.is_analyzing() {
            return Err(SessionError::AlreadyAnalyzing);
        }
        self.view = DetectionView::Analyzing;
        Ok(())
    }

    pub fn finish(&mut self, outcome: Result<DetectionResult, String>) -> Result<(), SessionError> {
        if !self.is_analyzing() {
            return Err(SessionError::NotAnalyzing);
        }
        self.view = match outcome {
            Ok(result) => DetectionView::Complete(result),
            Err(message) => DetectionView::Error(message),
        };
        Ok(())
    }

    pub fn reset(&mut self) {
        self.view = DetectionView::Idle;
    }

    /// The result to render: the diagnosis when complete, the canned fallback after a
    /// failure, nothing while idle or analysing.
    pub fn displayed_result(&self) -> Option<DetectionResult> {
        match &self.view {
            DetectionView::Complete(result) => Some(result.clone()),
            DetectionView::Error(_) => Some(DetectionResult::analysis_failed()),
            DetectionView::Idle | DetectionView::Analyzing => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.view {
            DetectionView::Error(message) => Some(message),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{Severity, Urgency};
    use serde_json::json;

    #[test]
    fn starts_idle_with_nothing_to_show() {
        let session = DetectionSession::new();
        assert_eq!(session.view(), &DetectionView::Idle);
        assert!(session.displayed_result().is_none());
    }

    #[test]
    fn successful_analysis_shows_the_result() {
        let mut session = DetectionSession::new();
        session.begin_analysis().unwrap();
        assert!(session.is_analyzing());
        assert!(session.displayed_result().is_none());

        let result = DetectionResult::sanitize(&json!({ "disease": "Leaf Spot", "confidence": 80 }));
        session.finish(Ok(result.clone())).unwrap();

        assert_eq!(session.view(), &DetectionView::Complete(result.clone()));
        assert_eq!(session.displayed_result(), Some(result));
    }

    #[test]
    fn failure_shows_the_bilingual_fallback() {
        let mut session = DetectionSession::new();
        session.begin_analysis().unwrap();
        session.finish(Err("Failed to analyze image".into())).unwrap();

        let shown = session.displayed_result().unwrap();
        assert_eq!(shown.disease, "Analysis Failed");
        assert_eq!(shown.malayalam_label, "വിശകലനം പരാജയപ്പെട്ടു");
        assert_eq!(shown.confidence, 0);
        assert_eq!(shown.severity, Severity::Moderate);
        assert_eq!(shown.urgency, Urgency::Medium);
        assert_eq!(session.error_message(), Some("Failed to analyze image"));
    }

    #[test]
    fn cannot_submit_twice_while_analyzing() {
        let mut session = DetectionSession::new();
        session.begin_analysis().unwrap();
        let err = session.begin_analysis().unwrap_err();
        assert_eq!(err, SessionError::AlreadyAnalyzing);
        assert_eq!(err.to_string(), "an image is already being analysed");
    }

    #[test]
    fn outcome_without_submission_is_rejected() {
        let mut session = DetectionSession::new();
        let outcome = Ok(DetectionResult::analysis_failed());
        let err = session.finish(outcome).unwrap_err();
        assert_eq!(err, SessionError::NotAnalyzing);
        assert_eq!(err.to_string(), "no analysis is in progress");
        assert_eq!(session.view(), &DetectionView::Idle);
    }

    #[test]
    fn retry_after_error_and_reset() {
        let mut session = DetectionSession::new();
        session.begin_analysis().unwrap();
        session.finish(Err("timeout".into())).unwrap();

        session.begin_analysis().unwrap();
        assert!(session.is_analyzing());
        session.finish(Ok(DetectionResult::sanitize(&json!({})))).unwrap();

        session.reset();
        assert_eq!(session.view(), &DetectionView::Idle);
        assert!(session.error_message().is_none());
    }
}
