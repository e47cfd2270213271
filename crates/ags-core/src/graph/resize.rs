//! Controlled resize of an audio's channel grid.
//!
//! Both resize operations go through one routine that computes the new grid
//! first and refuses the whole change if any channel it would drop still
//! carries a live recall id. Only then are dropped channels unmapped,
//! unlinked and destroyed, new channels created, the grid rewired and the
//! audio's recall containers mapped onto the new channels.

use crate::error::TopologyError;
use crate::ids::{AudioId, ChannelId};
use crate::sound::Direction;

use super::AudioGraph;

/// Outcome of a resize.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResizeReport {
    /// Channels created.
    pub added: usize,
    /// Channels destroyed.
    pub removed: usize,
    /// Template recalls mapped onto new channels.
    pub templates_added: usize,
    /// Template recalls released with dropped channels.
    pub templates_removed: usize,
}

struct GridPlan {
    list: Vec<Option<ChannelId>>,
    dropped: Vec<ChannelId>,
}

impl AudioGraph {
    /// Changes the number of lines per pad.
    pub fn set_audio_channels(
        &mut self,
        audio: AudioId,
        audio_channels: usize,
    ) -> Result<ResizeReport, TopologyError> {
        let a = self.audios.get(audio).ok_or(TopologyError::UnknownAudio(audio))?;
        let (outputs, inputs) = (a.output_pads, a.input_pads);
        self.resize_grid(audio, audio_channels, outputs, inputs)
    }

    /// Changes the pad count of one direction.
    pub fn set_pads(
        &mut self,
        audio: AudioId,
        direction: Direction,
        pads: usize,
    ) -> Result<ResizeReport, TopologyError> {
        let a = self.audios.get(audio).ok_or(TopologyError::UnknownAudio(audio))?;
        let (ac, outputs, inputs) = match direction {
            Direction::Output => (a.audio_channels, pads, a.input_pads),
            Direction::Input => (a.audio_channels, a.output_pads, pads),
        };
        self.resize_grid(audio, ac, outputs, inputs)
    }

    fn plan_grid(&self, audio: AudioId, direction: Direction, ac: usize, pads: usize) -> GridPlan {
        let Some(a) = self.audios.get(audio) else {
            return GridPlan {
                list: Vec::new(),
                dropped: Vec::new(),
            };
        };
        let old = a.channels(direction);
        let (old_ac, old_pads) = (a.audio_channels, a.pads(direction));
        let mut list = Vec::with_capacity(ac * pads);
        for pad in 0..pads {
            for line in 0..ac {
                let kept = (pad < old_pads && line < old_ac)
                    .then(|| old.get(pad * old_ac + line).copied())
                    .flatten();
                list.push(kept);
            }
        }
        let dropped = old
            .iter()
            .enumerate()
            .filter(|&(i, _)| {
                let (pad, line) = (i / old_ac.max(1), i % old_ac.max(1));
                pad >= pads || line >= ac
            })
            .map(|(_, &c)| c)
            .collect();
        GridPlan { list, dropped }
    }

    fn resize_grid(
        &mut self,
        audio: AudioId,
        ac: usize,
        output_pads: usize,
        input_pads: usize,
    ) -> Result<ResizeReport, TopologyError> {
        let plans = [
            (Direction::Output, self.plan_grid(audio, Direction::Output, ac, output_pads)),
            (Direction::Input, self.plan_grid(audio, Direction::Input, ac, input_pads)),
        ];
        for (_, plan) in &plans {
            for &channel in &plan.dropped {
                let live = self.channels.get(channel).map_or(0, |c| c.recall_ids.len());
                if live > 0 {
                    return Err(TopologyError::WouldOrphan {
                        audio,
                        channel,
                        live,
                    });
                }
            }
        }

        let mut report = ResizeReport::default();
        let mut created = Vec::new();
        for (direction, plan) in plans {
            for channel in plan.dropped {
                self.unlink_unchecked(channel);
                report.templates_removed += self.unmap_channel(channel);
                self.destroy_channel(channel);
                report.removed += 1;
            }
            let list: Vec<ChannelId> = plan
                .list
                .into_iter()
                .map(|slot| {
                    slot.unwrap_or_else(|| {
                        let channel = self.create_channel(audio, direction);
                        created.push(channel);
                        channel
                    })
                })
                .collect();
            if let Some(a) = self.audios.get_mut(audio) {
                match direction {
                    Direction::Output => a.outputs = list,
                    Direction::Input => a.inputs = list,
                }
            }
        }
        if let Some(a) = self.audios.get_mut(audio) {
            a.audio_channels = ac;
            a.output_pads = output_pads;
            a.input_pads = input_pads;
        }
        self.rewire(audio);

        for channel in created {
            report.added += 1;
            report.templates_added += self.map_channel(channel);
        }
        tracing::debug!(
            "graph: resize {audio} to {ac} line(s), {output_pads} output pad(s), {input_pads} input pad(s): {report:?}"
        );
        Ok(report)
    }

    /// Resizes lines and both pad counts at once.
    pub fn resize(
        &mut self,
        audio: AudioId,
        audio_channels: usize,
        output_pads: usize,
        input_pads: usize,
    ) -> Result<ResizeReport, TopologyError> {
        self.resize_grid(audio, audio_channels, output_pads, input_pads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AudioSpec;

    #[test]
    fn growing_keeps_existing_channels() {
        let mut graph = AudioGraph::default();
        let id = graph.add_audio(AudioSpec::new("a").with_audio_channels(1).with_output_pads(2));
        let before = graph.audio(id).unwrap().outputs().to_vec();
        let report = graph.set_audio_channels(id, 2).unwrap();
        assert_eq!(report.added, 2);
        assert_eq!(report.removed, 0);
        let after = graph.audio(id).unwrap().outputs().to_vec();
        assert_eq!(after.len(), 4);
        assert_eq!(after[0], before[0]);
        assert_eq!(after[2], before[1]);
        assert!(graph.verify().is_ok());
    }

    #[test]
    fn shrinking_pads_destroys_tail() {
        let mut graph = AudioGraph::default();
        let id = graph.add_audio(AudioSpec::new("a").with_audio_channels(2).with_input_pads(3));
        let report = graph.set_pads(id, Direction::Input, 1).unwrap();
        assert_eq!(report.removed, 4);
        assert_eq!(graph.audio(id).unwrap().inputs().len(), 2);
        assert_eq!(graph.channel_count(), 4);
        assert!(graph.verify().is_ok());
    }

    #[test]
    fn shrink_to_zero_and_back() {
        let mut graph = AudioGraph::default();
        let id = graph.add_audio(AudioSpec::new("a").with_audio_channels(2));
        graph.set_audio_channels(id, 0).unwrap();
        assert!(graph.audio(id).unwrap().outputs().is_empty());
        assert!(graph.verify().is_ok());
        graph.set_audio_channels(id, 3).unwrap();
        assert_eq!(graph.audio(id).unwrap().outputs().len(), 3);
        assert!(graph.verify().is_ok());
    }

    #[test]
    fn dropped_links_are_cleared() {
        let mut graph = AudioGraph::default();
        let src = graph.add_audio(AudioSpec::new("src").with_output_pads(2));
        let dst = graph.add_audio(AudioSpec::new("dst").with_input_pads(1));
        let out = graph.audio(src).unwrap().outputs()[1];
        let inp = graph.audio(dst).unwrap().inputs()[0];
        graph.link_channels(out, inp).unwrap();
        graph.set_pads(src, Direction::Output, 1).unwrap();
        assert_eq!(graph.channel(inp).unwrap().link(), None);
        assert!(graph.verify().is_ok());
    }

    #[test]
    fn unknown_audio_is_rejected() {
        let mut graph = AudioGraph::default();
        let id = graph.add_audio(AudioSpec::new("a"));
        graph.remove_audio(id).unwrap();
        assert_eq!(
            graph.set_audio_channels(id, 2),
            Err(TopologyError::UnknownAudio(id))
        );
    }
}
