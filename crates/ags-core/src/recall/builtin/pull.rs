use crate::recall::{
    InitStage, RecallBehavior, RecallError, RecallPrototype, RunOutcome, RunStage, StageContext,
};

/// Adds the voice of the linked upstream channel into this voice.
///
/// Used on input channels whose line is linked to another audio's output;
/// the nested run feeding the upstream voice finishes each stage before
/// this one reads it.
#[derive(Clone, Debug, Default)]
pub struct PullRecall {
    scratch: Vec<f32>,
}

impl PullRecall {
    /// Recall name.
    pub const NAME: &'static str = "pull";

    /// Prototype for a pull recall.
    pub fn prototype() -> RecallPrototype {
        RecallPrototype::of(Self::NAME, Self::default())
    }
}

impl RecallBehavior for PullRecall {
    fn init(&mut self, stage: InitStage, cx: &StageContext<'_>) -> Result<(), RecallError> {
        if stage == InitStage::Pre {
            self.scratch = vec![0.0; cx.engine().settings().buffer_size];
        }
        Ok(())
    }

    fn run(&mut self, stage: RunStage, cx: &StageContext<'_>) -> RunOutcome {
        if stage != RunStage::Pre {
            return RunOutcome::Continue;
        }
        let (Some(upstream), Some(signal)) = (cx.upstream_signal(), cx.signal()) else {
            return RunOutcome::Continue;
        };
        let n = upstream.read_current(&mut self.scratch);
        signal.with_current_mut(|buf| {
            for (out, &s) in buf.iter_mut().zip(&self.scratch[..n]) {
                *out += s;
            }
        });
        RunOutcome::Continue
    }

    fn duplicate(&self) -> Box<dyn RecallBehavior> {
        Box::new(Self::default())
    }
}
