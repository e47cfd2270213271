use core::fmt;
use std::sync::Arc;

use crate::ids::ChannelId;
use crate::note::{NoteEvent, NoteFeed};
use crate::recall_id::RecallId;
use crate::recall::{
    InitStage, RecallBehavior, RecallError, RecallFlags, RecallPrototype, RunOutcome, RunStage,
    StageContext,
};
use crate::sound::{Direction, ScopeSet, SoundScope};
use crate::tasks::{NoteOff, NoteOn};

/// Turns note feed events into voice tasks.
///
/// Runs as an audio-run recall in the sequencer scope and stays alive until
/// cancelled. Every pre stage it drains the feed, holds events until their
/// tick offset has passed and then queues a [`NoteOn`] or [`NoteOff`] for
/// the output line it targets. Voices nest below the driver's context, so
/// they tick inside the driver's run and go away with it.
#[derive(Clone)]
pub struct NotationRecall {
    feed: Arc<dyn NoteFeed>,
    line: usize,
    voice_scope: SoundScope,
    target: Option<ChannelId>,
    received: Vec<NoteEvent>,
    pending: Vec<(u64, NoteEvent)>,
    emitted: u64,
}

impl NotationRecall {
    /// Recall name.
    pub const NAME: &'static str = "notation";

    /// Recall reading `feed` and starting notation voices on output line 0.
    pub fn new(feed: Arc<dyn NoteFeed>) -> Self {
        Self {
            feed,
            line: 0,
            voice_scope: SoundScope::Notation,
            target: None,
            received: Vec::new(),
            pending: Vec::new(),
            emitted: 0,
        }
    }

    /// Targets output line `line`.
    pub fn with_line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    /// Starts voices in `scope`.
    pub fn with_voice_scope(mut self, scope: SoundScope) -> Self {
        self.voice_scope = scope;
        self
    }

    /// Persistent audio-run prototype for the sequencer scope.
    pub fn into_prototype(self) -> RecallPrototype {
        RecallPrototype::of(Self::NAME, self)
            .with_ability(ScopeSet::of(SoundScope::Sequencer))
            .with_flags(RecallFlags::PERSISTENT)
    }

    /// Tasks queued so far by this run.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Events waiting for their tick.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn emit(&mut self, event: NoteEvent, cx: &StageContext<'_>) {
        let Some(channel) = self.target else {
            return;
        };
        if event.on {
            cx.submit(NoteOn {
                channel,
                note: event.note,
                scope: self.voice_scope,
                parent: cx.recall_id().map(RecallId::context),
            });
        } else {
            cx.submit(NoteOff {
                channel,
                key: event.note.key,
            });
        }
        self.emitted += 1;
    }
}

impl fmt::Debug for NotationRecall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotationRecall")
            .field("line", &self.line)
            .field("voice_scope", &self.voice_scope)
            .field("target", &self.target)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl RecallBehavior for NotationRecall {
    fn resolve(&mut self, cx: &StageContext<'_>) -> Result<(), RecallError> {
        let audio = cx
            .audio()
            .ok_or_else(|| RecallError::Failed("not bound to an audio".into()))?;
        let target = cx
            .graph()
            .nth_channel(audio, Direction::Output, self.line)
            .ok_or_else(|| RecallError::Failed(format!("no output line {}", self.line)))?;
        self.target = Some(target);
        Ok(())
    }

    fn init(&mut self, stage: InitStage, _cx: &StageContext<'_>) -> Result<(), RecallError> {
        if stage == InitStage::Pre {
            self.received.reserve(64);
            self.pending.reserve(64);
        }
        Ok(())
    }

    fn run(&mut self, stage: RunStage, cx: &StageContext<'_>) -> RunOutcome {
        if stage != RunStage::Pre {
            return RunOutcome::Continue;
        }
        let tick = cx.tick();
        self.feed.drain_into(&mut self.received);
        for event in self.received.drain(..) {
            let due = tick + u64::from(event.tick_offset);
            let at = self.pending.partition_point(|&(d, _)| d <= due);
            self.pending.insert(at, (due, event));
        }
        let ready = self.pending.partition_point(|&(d, _)| d <= tick);
        for i in 0..ready {
            let (_, event) = self.pending[i];
            self.emit(event, cx);
        }
        self.pending.drain(..ready);
        RunOutcome::Continue
    }

    fn duplicate(&self) -> Box<dyn RecallBehavior> {
        Box::new(Self::new(Arc::clone(&self.feed))
            .with_line(self.line)
            .with_voice_scope(self.voice_scope))
    }
}
