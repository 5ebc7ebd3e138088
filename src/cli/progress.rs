use specforge_utils::{ProgressEvent, ProgressSink, Stage};

/// Prints run progress to stdout, one line per event.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    #[must_use]
    pub fn format(event: &ProgressEvent) -> String {
        let indent = match event.stage {
            Stage::Workflow => "",
            Stage::Design => "  ",
            Stage::Generation | Stage::Testing | Stage::Verification => "    ",
        };
        let marker = match event.event.as_str() {
            "design_failed" | "batch_failed" => "✗ ",
            "design_done" | "design_cached" | "batch_done" => "✓ ",
            _ => "",
        };
        format!("{indent}{marker}{}", event.message)
    }
}

impl ProgressSink for ConsoleSink {
    fn emit(&self, event: &ProgressEvent) {
        // state changes are already visible from the stage events
        if event.event == "state" {
            return;
        }
        println!("{}", Self::format(event));
    }
}
