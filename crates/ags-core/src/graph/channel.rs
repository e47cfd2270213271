//! Channels and the pad/line grid.
//!
//! Within one direction of an audio, `next`/`prev` connect the lines of a
//! pad and `next_pad`/`prev_pad` connect the same line across pads. The
//! links are derived from the audio's pad-major channel list by
//! [`AudioGraph::rewire`], never written individually.

use std::collections::HashSet;

use crate::error::TopologyError;
use crate::ids::{AudioId, ChannelId, RecallIdKey, RecyclingId};
use crate::sound::{Direction, SoundScope};

use super::recycling::Recycling;
use super::AudioGraph;

/// One lane of an [`Audio`](crate::Audio).
#[derive(Debug)]
pub struct Channel {
    pub(crate) audio: AudioId,
    pub(crate) direction: Direction,
    pub(crate) pad: usize,
    pub(crate) audio_channel: usize,
    pub(crate) line: usize,
    pub(crate) next: Option<ChannelId>,
    pub(crate) prev: Option<ChannelId>,
    pub(crate) next_pad: Option<ChannelId>,
    pub(crate) prev_pad: Option<ChannelId>,
    pub(crate) link: Option<ChannelId>,
    pub(crate) recycling: RecyclingId,
    pub(crate) recall_ids: Vec<RecallIdKey>,
}

impl Channel {
    /// Owning audio.
    pub fn audio(&self) -> AudioId {
        self.audio
    }

    /// Input or output.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Pad index.
    pub fn pad(&self) -> usize {
        self.pad
    }

    /// Line within the pad.
    pub fn audio_channel(&self) -> usize {
        self.audio_channel
    }

    /// Line index across the whole direction.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Next line in the same pad.
    pub fn next(&self) -> Option<ChannelId> {
        self.next
    }

    /// Previous line in the same pad.
    pub fn prev(&self) -> Option<ChannelId> {
        self.prev
    }

    /// Same line in the next pad.
    pub fn next_pad(&self) -> Option<ChannelId> {
        self.next_pad
    }

    /// Same line in the previous pad.
    pub fn prev_pad(&self) -> Option<ChannelId> {
        self.prev_pad
    }

    /// Linked channel of another audio.
    pub fn link(&self) -> Option<ChannelId> {
        self.link
    }

    /// Owned recycling.
    pub fn recycling(&self) -> RecyclingId {
        self.recycling
    }

    /// Live recall ids covering this channel.
    pub fn recall_ids(&self) -> &[RecallIdKey] {
        &self.recall_ids
    }
}

impl AudioGraph {
    /// Creates a detached channel with its recycling and template signal.
    /// Grid fields are filled in by [`rewire`](Self::rewire).
    pub(crate) fn create_channel(&mut self, audio: AudioId, direction: Direction) -> ChannelId {
        let channel = self.channels.next_key();
        let template = self.signals.next_key();
        let recycling = self.recyclings.insert(Recycling::new(channel, template));
        let signal = self.new_signal(recycling, None);
        let inserted = self.signals.insert(signal);
        debug_assert_eq!(inserted, template);
        let inserted = self.channels.insert(Channel {
            audio,
            direction,
            pad: 0,
            audio_channel: 0,
            line: 0,
            next: None,
            prev: None,
            next_pad: None,
            prev_pad: None,
            link: None,
            recycling,
            recall_ids: Vec::new(),
        });
        debug_assert_eq!(inserted, channel);
        channel
    }

    /// Frees a channel, its recycling and every signal in it.
    ///
    /// The channel must already be unlinked and hold no live recall id.
    pub(crate) fn destroy_channel(&mut self, channel: ChannelId) {
        let Some(removed) = self.channels.remove(channel) else {
            return;
        };
        if let Some(recycling) = self.recyclings.remove(removed.recycling) {
            self.signals.remove(recycling.template);
            for signal in recycling.signals {
                self.signals.remove(signal);
            }
        }
    }

    /// Recomputes pad, line and neighbour links of every channel of `audio`
    /// from its channel lists.
    pub(crate) fn rewire(&mut self, audio: AudioId) {
        let Some(a) = self.audios.get(audio) else {
            return;
        };
        let per_pad = a.audio_channels.max(1);
        for list in [a.outputs.clone(), a.inputs.clone()] {
            let mut previous_recycling: Option<RecyclingId> = None;
            for (line, &id) in list.iter().enumerate() {
                let pad = line / per_pad;
                let audio_channel = line % per_pad;
                let Some(channel) = self.channels.get_mut(id) else {
                    continue;
                };
                channel.pad = pad;
                channel.audio_channel = audio_channel;
                channel.line = line;
                channel.prev = (audio_channel > 0).then(|| list[line - 1]);
                channel.next = (audio_channel + 1 < per_pad)
                    .then(|| list.get(line + 1).copied())
                    .flatten();
                channel.prev_pad = (pad > 0).then(|| list[line - per_pad]);
                channel.next_pad = list.get(line + per_pad).copied();

                let recycling = channel.recycling;
                if let Some(r) = self.recyclings.get_mut(recycling) {
                    r.prev = previous_recycling;
                    r.next = None;
                }
                if let Some(prev) = previous_recycling.and_then(|p| self.recyclings.get_mut(p)) {
                    prev.next = Some(recycling);
                }
                previous_recycling = Some(recycling);
            }
        }
    }

    /// Checks the grid invariant of one audio: every channel appears exactly
    /// once, belongs to this audio, and its pad/line fields and neighbour
    /// links match its position. Links to other audios must be mirrored.
    pub fn verify_grid(&self, audio: AudioId) -> Result<(), TopologyError> {
        let a = self.audios.get(audio).ok_or(TopologyError::UnknownAudio(audio))?;
        let per_pad = a.audio_channels;
        let mut seen = HashSet::new();
        for direction in [Direction::Output, Direction::Input] {
            let list = a.channels(direction);
            let expected = a.pads(direction) * per_pad;
            if list.len() != expected {
                return Err(TopologyError::Inconsistent(format!(
                    "{audio} {direction}: {} channels for {} pads x {per_pad} lines",
                    list.len(),
                    a.pads(direction)
                )));
            }
            for (line, &id) in list.iter().enumerate() {
                if !seen.insert(id) {
                    return Err(TopologyError::Inconsistent(format!("{id} listed twice")));
                }
                let ch = self.channels.get(id).ok_or(TopologyError::UnknownChannel(id))?;
                let pad = line / per_pad;
                let audio_channel = line % per_pad;
                let expected_links = (
                    (audio_channel > 0).then(|| list[line - 1]),
                    (audio_channel + 1 < per_pad).then(|| list[line + 1]),
                    (pad > 0).then(|| list[line - per_pad]),
                    list.get(line + per_pad).copied(),
                );
                let ok = ch.audio == audio
                    && ch.direction == direction
                    && ch.pad == pad
                    && ch.audio_channel == audio_channel
                    && ch.line == line
                    && (ch.prev, ch.next, ch.prev_pad, ch.next_pad) == expected_links;
                if !ok {
                    return Err(TopologyError::Inconsistent(format!(
                        "{id} misplaced at {direction} line {line}"
                    )));
                }
                if self.recyclings.get(ch.recycling).map(|r| r.channel) != Some(id) {
                    return Err(TopologyError::Inconsistent(format!(
                        "{id} does not own {}",
                        ch.recycling
                    )));
                }
                if let Some(link) = ch.link {
                    let mirrored = self
                        .channels
                        .get(link)
                        .is_some_and(|l| l.link == Some(id) && l.direction != direction);
                    if !mirrored {
                        return Err(TopologyError::Inconsistent(format!(
                            "{id} link to {link} is not mirrored"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Live recall ids of `scope` covering `channel`.
    pub fn check_scope(
        &self,
        channel: ChannelId,
        scope: SoundScope,
    ) -> impl Iterator<Item = RecallIdKey> + '_ {
        self.channels
            .get(channel)
            .map(|c| c.recall_ids.as_slice())
            .unwrap_or_default()
            .iter()
            .copied()
            .filter(move |&key| self.recall_ids.get(key).is_some_and(|id| id.scope() == scope))
    }

    /// Recall ids anchored on `channel` for `scope` whose context has no
    /// running parent. These are the entry points the loop drives; nested
    /// runs are reached through them.
    pub fn top_level_recall_ids(
        &self,
        channel: ChannelId,
        scope: SoundScope,
    ) -> impl Iterator<Item = RecallIdKey> + '_ {
        self.check_scope(channel, scope).filter(move |&key| {
            let Some(id) = self.recall_ids.get(key) else {
                return false;
            };
            if id.anchor() != channel {
                return false;
            }
            let parent = self.contexts.get(id.context()).and_then(|c| c.parent());
            parent
                .and_then(|p| self.contexts.get(p))
                .and_then(|p| p.recall_id())
                .is_none_or(|parent_id| !self.recall_ids.contains(parent_id))
        })
    }
}
