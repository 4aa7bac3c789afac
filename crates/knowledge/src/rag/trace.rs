//! Diagnostic trace recording and the observability sink.

use crate::rag::types::DiagnosticTrace;
use crate::types::Intent;
use planes_core::logging::sanitize_for_log;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Receives trace events. Infallible: sinks must not affect the answer.
pub trait TraceSink: Send + Sync {
    fn on_step(&self, step: &str);

    fn on_complete(&self, user_id: Option<&str>, tags: &[String], steps: &[String]);
}

/// Default sink: emits trace events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn on_step(&self, step: &str) {
        tracing::debug!(step = %sanitize_for_log(step), "Pipeline step");
    }

    fn on_complete(&self, user_id: Option<&str>, tags: &[String], steps: &[String]) {
        tracing::info!(
            user_id = user_id.unwrap_or("-"),
            tags = %tags.join(","),
            steps = steps.len(),
            "Pipeline run complete"
        );
    }
}

/// Accumulates steps for one run and forwards them to the sink.
pub(crate) struct TraceRecorder {
    sink: Arc<dyn TraceSink>,
    trace: DiagnosticTrace,
}

impl TraceRecorder {
    pub(crate) fn new(sink: Arc<dyn TraceSink>) -> Self {
        Self {
            sink,
            trace: DiagnosticTrace::default(),
        }
    }

    pub(crate) fn step(&mut self, step: impl Into<String>) {
        let step = step.into();
        self.sink.on_step(&step);
        self.trace.steps.push(step);
    }

    /// Attach final tags, notify the sink and return the finished trace.
    pub(crate) fn finish(
        mut self,
        user_id: Option<&str>,
        intent: Intent,
        parties: &BTreeSet<String>,
        sources: usize,
        streaming: bool,
    ) -> DiagnosticTrace {
        self.trace.tags = build_tags(intent, parties, sources, streaming);
        self.sink
            .on_complete(user_id, &self.trace.tags, &self.trace.steps);
        self.trace
    }
}

/// Intent, `party:<code>` per party, `sources:<n>` when n > 0, `streaming`.
pub fn build_tags(
    intent: Intent,
    parties: &BTreeSet<String>,
    sources: usize,
    streaming: bool,
) -> Vec<String> {
    let mut tags = vec![intent.as_str().to_string()];
    tags.extend(parties.iter().map(|p| format!("party:{}", p)));
    if sources > 0 {
        tags.push(format!("sources:{}", sources));
    }
    if streaming {
        tags.push("streaming".to_string());
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        steps: Mutex<Vec<String>>,
        completed: Mutex<Option<(Option<String>, Vec<String>)>>,
    }

    impl TraceSink for RecordingSink {
        fn on_step(&self, step: &str) {
            self.steps.lock().unwrap().push(step.to_string());
        }

        fn on_complete(&self, user_id: Option<&str>, tags: &[String], _steps: &[String]) {
            *self.completed.lock().unwrap() = Some((user_id.map(String::from), tags.to_vec()));
        }
    }

    #[test]
    fn test_tags() {
        let parties = BTreeSet::from(["PLN".to_string(), "FA".to_string()]);
        assert_eq!(
            build_tags(Intent::SpecificParty, &parties, 3, true),
            vec!["specific_party", "party:FA", "party:PLN", "sources:3", "streaming"]
        );
        assert_eq!(
            build_tags(Intent::MetadataQuery, &BTreeSet::new(), 0, false),
            vec!["metadata_query"]
        );
    }

    #[test]
    fn test_recorder_forwards_to_sink() {
        let sink = Arc::new(RecordingSink::default());
        let mut recorder = TraceRecorder::new(sink.clone());
        recorder.step("Intent: unclear");
        recorder.step("Retrieved 0 chunks");

        let trace = recorder.finish(Some("abcd"), Intent::Unclear, &BTreeSet::new(), 0, false);
        assert_eq!(trace.steps, *sink.steps.lock().unwrap());
        assert_eq!(
            *sink.completed.lock().unwrap(),
            Some((Some("abcd".to_string()), vec!["unclear".to_string()]))
        );
    }
}
