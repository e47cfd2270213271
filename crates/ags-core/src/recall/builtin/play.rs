use crate::recall::{RecallBehavior, RecallError, RecallPrototype, RunOutcome, RunStage, StageContext};

use super::Follow;

/// Mixes the voice signal into the output bus in the post stage.
///
/// The bus lane is the channel's audio channel index.
#[derive(Clone, Debug, Default)]
pub struct PlayRecall {
    follow: Follow,
    lane: usize,
}

impl PlayRecall {
    /// Recall name.
    pub const NAME: &'static str = "play";

    /// Finishes once the sibling called `name` on the same signal is done.
    pub fn following(mut self, name: &'static str) -> Self {
        self.follow = Follow::new(name);
        self
    }

    /// Prototype built from this configuration.
    pub fn into_prototype(self) -> RecallPrototype {
        RecallPrototype::of(Self::NAME, self)
    }
}

impl RecallBehavior for PlayRecall {
    fn resolve(&mut self, cx: &StageContext<'_>) -> Result<(), RecallError> {
        self.follow.resolve(cx)?;
        let channel = cx
            .channel()
            .and_then(|c| cx.graph().channel(c))
            .ok_or_else(|| RecallError::Failed("not bound to a channel".into()))?;
        self.lane = channel.audio_channel();
        Ok(())
    }

    fn run(&mut self, stage: RunStage, cx: &StageContext<'_>) -> RunOutcome {
        if stage != RunStage::Post {
            return RunOutcome::Continue;
        }
        if let Some(signal) = cx.signal() {
            signal.with_current(|buf| cx.bus().mix(self.lane, buf));
        }
        if self.follow.finished(cx) {
            RunOutcome::Done
        } else {
            RunOutcome::Continue
        }
    }

    fn duplicate(&self) -> Box<dyn RecallBehavior> {
        Box::new(self.clone())
    }
}
