use std::sync::Arc;

use crate::port::{PortDescriptor, PortSet};
use crate::recall::{
    RecallBehavior, RecallError, RecallLayer, RecallPrototype, RunOutcome, RunStage, StageContext,
};

use super::Follow;

/// Scales the voice signal by the `volume` port.
///
/// If the container's channel recall carries a `muted` port above 0.5 the
/// voice is silenced instead.
#[derive(Clone, Debug, Default)]
pub struct VolumeRecall {
    follow: Follow,
    channel_ports: Option<Arc<PortSet>>,
    ticks: u64,
}

impl VolumeRecall {
    /// Recall name.
    pub const NAME: &'static str = "volume";
    /// Gain port.
    pub const PORT: &'static str = "volume";
    /// Mute port looked up on the shared channel recall.
    pub const MUTE_PORT: &'static str = "muted";

    /// Prototype with a `volume` port defaulting to unity gain.
    pub fn prototype() -> RecallPrototype {
        Self::default().into_prototype()
    }

    /// Finishes once the sibling called `name` on the same signal is done.
    pub fn following(mut self, name: &'static str) -> Self {
        self.follow = Follow::new(name);
        self
    }

    /// Prototype built from this configuration.
    pub fn into_prototype(self) -> RecallPrototype {
        RecallPrototype::of(Self::NAME, self).with_port(PortDescriptor::new(Self::PORT, 1.0, 0.0, 2.0))
    }

    /// Ticks this voice has been scaled.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

impl RecallBehavior for VolumeRecall {
    fn resolve(&mut self, cx: &StageContext<'_>) -> Result<(), RecallError> {
        self.follow.resolve(cx)?;
        self.channel_ports = cx
            .shared_recall(RecallLayer::Channel)
            .filter(|r| r.ports().index_of(Self::MUTE_PORT).is_some())
            .map(|r| r.shared_ports());
        Ok(())
    }

    fn run(&mut self, stage: RunStage, cx: &StageContext<'_>) -> RunOutcome {
        if stage != RunStage::Inter {
            return RunOutcome::Continue;
        }
        let Some(signal) = cx.signal() else {
            return RunOutcome::Continue;
        };
        let muted = self
            .channel_ports
            .as_ref()
            .and_then(|p| p.get(Self::MUTE_PORT))
            .is_some_and(|m| m > 0.5);
        let gain = if muted {
            0.0
        } else {
            cx.port(Self::PORT).unwrap_or(1.0)
        };
        signal.with_current_mut(|buf| buf.iter_mut().for_each(|s| *s *= gain));
        self.ticks += 1;
        if self.follow.finished(cx) {
            RunOutcome::Done
        } else {
            RunOutcome::Continue
        }
    }

    fn duplicate(&self) -> Box<dyn RecallBehavior> {
        Box::new(Self {
            follow: self.follow,
            channel_ports: None,
            ticks: 0,
        })
    }
}
