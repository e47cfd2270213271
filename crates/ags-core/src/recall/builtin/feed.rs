use core::fmt;

use crate::loader::BufferLoader;
use crate::recall::{RecallBehavior, RecallPrototype, RunOutcome, RunStage, StageContext};

/// Fills the voice signal from a [`BufferLoader`] in the pre stage.
///
/// Finishes when the loader runs dry or the frame limit is reached.
#[derive(Clone)]
pub struct FeedRecall {
    loader: Box<dyn BufferLoader>,
    frame_limit: Option<u64>,
    frames: u64,
}

impl FeedRecall {
    /// Recall name.
    pub const NAME: &'static str = "feed";

    /// Feed reading from `loader`.
    pub fn new(loader: impl BufferLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            frame_limit: None,
            frames: 0,
        }
    }

    /// Stops after `frames` frames.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Prototype built from this configuration.
    pub fn into_prototype(self) -> RecallPrototype {
        RecallPrototype::of(Self::NAME, self)
    }

    /// Frames written by this voice.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl fmt::Debug for FeedRecall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedRecall")
            .field("frame_limit", &self.frame_limit)
            .field("frames", &self.frames)
            .finish_non_exhaustive()
    }
}

impl RecallBehavior for FeedRecall {
    fn run(&mut self, stage: RunStage, cx: &StageContext<'_>) -> RunOutcome {
        if stage != RunStage::Pre {
            return RunOutcome::Continue;
        }
        let Some(signal) = cx.signal() else {
            return RunOutcome::Continue;
        };
        let note = cx.note();
        let samplerate = signal.samplerate();
        let remaining = self
            .frame_limit
            .map_or(usize::MAX, |limit| limit.saturating_sub(self.frames) as usize);
        let written = signal.with_current_mut(|buf| {
            let n = buf.len().min(remaining);
            let written = self.loader.fill(note, samplerate, &mut buf[..n]);
            buf[written..].fill(0.0);
            written
        });
        self.frames += written as u64;
        let exhausted = written == 0 || self.frame_limit.is_some_and(|l| self.frames >= l);
        if exhausted {
            RunOutcome::Done
        } else {
            RunOutcome::Continue
        }
    }

    fn duplicate(&self) -> Box<dyn RecallBehavior> {
        Box::new(Self {
            loader: self.loader.boxed_clone(),
            frame_limit: self.frame_limit,
            frames: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{SampleLoader, SineLoader};
    use crate::note::Note;
    use crate::recall::StartRequest;
    use crate::sound::SoundScope;
    use crate::test_support::{engine, graph_with_leaf};

    #[test]
    fn frame_limit_ends_the_voice() {
        let (engine, _rx) = engine();
        let feed = FeedRecall::new(SineLoader::default()).with_frame_limit(1000);
        let (mut graph, _audio, _fx, outs) = graph_with_leaf(1, feed.into_prototype());
        let report = graph
            .start_channel(
                &engine,
                StartRequest::new(outs[0], SoundScope::Notation).with_note(Note::new(60, 100)),
            )
            .unwrap();
        let rid = report.recall_id;

        let first = graph.tick(&engine);
        assert_eq!(first.finished, 0);
        let second = graph.tick(&engine);
        assert_eq!(second.finished, 1);
        assert!(graph.recall_id(rid).unwrap().is_cancel_requested());

        let leaf = graph.find_by_name(graph.recall_id(rid).unwrap().recalls(), FeedRecall::NAME).unwrap();
        let frames = graph.recall(leaf).unwrap().inspect(|f: &FeedRecall| f.frames()).unwrap();
        assert_eq!(frames, 1000);
    }

    #[test]
    fn short_sample_pads_with_silence() {
        let (engine, _rx) = engine();
        let feed = FeedRecall::new(SampleLoader::new(vec![0.5; 10]));
        let (mut graph, _audio, _fx, outs) = graph_with_leaf(1, feed.into_prototype());
        let rid = graph
            .start_channel(&engine, StartRequest::new(outs[0], SoundScope::Playback))
            .unwrap()
            .recall_id;
        graph.tick(&engine);
        let signal = graph.recall_id(rid).unwrap().signals()[0];
        let buffer = graph.signal(signal).unwrap().buffer(0).unwrap();
        assert_eq!(buffer[9], 0.5);
        assert_eq!(buffer[10], 0.0);
    }
}
