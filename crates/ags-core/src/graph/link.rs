//! Linking output channels of one audio to input channels of another.
//!
//! A link is symmetric: both channels name each other. The input's
//! recycling takes the output's recycling as parent, which is how a nested
//! run on the input side finds the upstream voice.

use std::collections::HashSet;

use crate::error::TopologyError;
use crate::ids::{AudioId, ChannelId};
use crate::sound::Direction;

use super::AudioGraph;

impl AudioGraph {
    /// Links two channels of different audios, one output and one input.
    ///
    /// Existing links of either channel are dropped first. Rejected when
    /// either side runs a recall id or the link would close a cycle.
    pub fn link_channels(&mut self, a: ChannelId, b: ChannelId) -> Result<(), TopologyError> {
        let ca = self.channels.get(a).ok_or(TopologyError::UnknownChannel(a))?;
        let cb = self.channels.get(b).ok_or(TopologyError::UnknownChannel(b))?;
        if ca.direction == cb.direction {
            return Err(TopologyError::InvalidLink {
                from: a,
                to: b,
                reason: "both channels have the same direction",
            });
        }
        if ca.audio == cb.audio {
            return Err(TopologyError::InvalidLink {
                from: a,
                to: b,
                reason: "channels belong to the same audio",
            });
        }
        if ca.link == Some(b) {
            return Err(TopologyError::AlreadyLinked { from: a, to: b });
        }
        let (output, input) = match ca.direction {
            Direction::Output => (a, b),
            Direction::Input => (b, a),
        };
        self.ensure_idle(output)?;
        self.ensure_idle(input)?;
        for side in [output, input] {
            if let Some(partner) = self.channels.get(side).and_then(|c| c.link) {
                self.ensure_idle(partner)?;
            }
        }

        let upstream = self.channels.get(output).map(|c| c.audio);
        let downstream = self.channels.get(input).map(|c| c.audio);
        if let (Some(up), Some(down)) = (upstream, downstream) {
            if self.audio_feeds(down, up) {
                return Err(TopologyError::InvalidLink {
                    from: a,
                    to: b,
                    reason: "link would create a cycle",
                });
            }
        }

        self.unlink_unchecked(output);
        self.unlink_unchecked(input);
        let output_recycling = self.channels.get(output).map(|c| c.recycling);
        if let Some(c) = self.channels.get_mut(output) {
            c.link = Some(input);
        }
        if let Some(c) = self.channels.get_mut(input) {
            c.link = Some(output);
            let recycling = c.recycling;
            if let Some(r) = self.recyclings.get_mut(recycling) {
                r.parent = output_recycling;
            }
        }
        tracing::debug!("graph: link {output} -> {input}");
        Ok(())
    }

    /// Drops the link of `channel`. Returns the former partner.
    pub fn unlink_channel(&mut self, channel: ChannelId) -> Result<Option<ChannelId>, TopologyError> {
        let partner = self
            .channels
            .get(channel)
            .ok_or(TopologyError::UnknownChannel(channel))?
            .link;
        self.ensure_idle(channel)?;
        if let Some(partner) = partner {
            self.ensure_idle(partner)?;
        }
        Ok(self.unlink_unchecked(channel))
    }

    pub(crate) fn unlink_unchecked(&mut self, channel: ChannelId) -> Option<ChannelId> {
        let partner = self.channels.get_mut(channel)?.link.take()?;
        if let Some(p) = self.channels.get_mut(partner) {
            p.link = None;
        }
        for side in [channel, partner] {
            let Some(c) = self.channels.get(side) else {
                continue;
            };
            if c.direction == Direction::Input {
                let recycling = c.recycling;
                if let Some(r) = self.recyclings.get_mut(recycling) {
                    r.parent = None;
                }
            }
        }
        tracing::debug!("graph: unlink {channel} from {partner}");
        Some(partner)
    }

    fn ensure_idle(&self, channel: ChannelId) -> Result<(), TopologyError> {
        let live = self.channels.get(channel).map_or(0, |c| c.recall_ids.len());
        if live > 0 {
            return Err(TopologyError::InFlight { channel, live });
        }
        Ok(())
    }

    /// Returns `true` if signal flows from `from` to `to` through links.
    pub fn audio_feeds(&self, from: AudioId, to: AudioId) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![from];
        while let Some(audio) = stack.pop() {
            if audio == to {
                return true;
            }
            if !seen.insert(audio) {
                continue;
            }
            let Some(a) = self.audios.get(audio) else {
                continue;
            };
            for &output in &a.outputs {
                let downstream = self
                    .channels
                    .get(output)
                    .and_then(|c| c.link)
                    .and_then(|input| self.channels.get(input))
                    .map(|c| c.audio);
                if let Some(next) = downstream {
                    stack.push(next);
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AudioSpec;

    fn pair(graph: &mut AudioGraph) -> (AudioId, AudioId) {
        let source = graph.add_audio(AudioSpec::new("source"));
        let sink = graph.add_audio(AudioSpec::new("sink").with_input_pads(1));
        (source, sink)
    }

    #[test]
    fn link_is_mirrored_and_sets_recycling_parent() {
        let mut graph = AudioGraph::default();
        let (source, sink) = pair(&mut graph);
        let out = graph.audio(source).unwrap().outputs()[0];
        let inp = graph.audio(sink).unwrap().inputs()[0];
        graph.link_channels(inp, out).unwrap();
        assert_eq!(graph.channel(out).unwrap().link(), Some(inp));
        assert_eq!(graph.channel(inp).unwrap().link(), Some(out));
        let parent = graph
            .recycling(graph.channel(inp).unwrap().recycling())
            .unwrap()
            .parent();
        assert_eq!(parent, Some(graph.channel(out).unwrap().recycling()));
        assert!(graph.verify().is_ok());
        assert!(graph.audio_feeds(source, sink));
    }

    #[test]
    fn same_direction_is_rejected() {
        let mut graph = AudioGraph::default();
        let a = graph.add_audio(AudioSpec::new("a"));
        let b = graph.add_audio(AudioSpec::new("b"));
        let oa = graph.audio(a).unwrap().outputs()[0];
        let ob = graph.audio(b).unwrap().outputs()[0];
        assert!(matches!(
            graph.link_channels(oa, ob),
            Err(TopologyError::InvalidLink { .. })
        ));
    }

    #[test]
    fn cycle_is_rejected() {
        let mut graph = AudioGraph::default();
        let a = graph.add_audio(AudioSpec::new("a").with_input_pads(1));
        let b = graph.add_audio(AudioSpec::new("b").with_input_pads(1));
        let a_out = graph.audio(a).unwrap().outputs()[0];
        let a_in = graph.audio(a).unwrap().inputs()[0];
        let b_out = graph.audio(b).unwrap().outputs()[0];
        let b_in = graph.audio(b).unwrap().inputs()[0];
        graph.link_channels(a_out, b_in).unwrap();
        let err = graph.link_channels(b_out, a_in).unwrap_err();
        assert!(matches!(err, TopologyError::InvalidLink { reason, .. } if reason.contains("cycle")));
        assert_eq!(graph.channel(a_in).unwrap().link(), None);
    }

    #[test]
    fn relink_drops_previous_partner() {
        let mut graph = AudioGraph::default();
        let (source, sink) = pair(&mut graph);
        let other = graph.add_audio(AudioSpec::new("other"));
        let out = graph.audio(source).unwrap().outputs()[0];
        let other_out = graph.audio(other).unwrap().outputs()[0];
        let inp = graph.audio(sink).unwrap().inputs()[0];
        graph.link_channels(out, inp).unwrap();
        assert_eq!(
            graph.link_channels(out, inp),
            Err(TopologyError::AlreadyLinked { from: out, to: inp })
        );
        graph.link_channels(other_out, inp).unwrap();
        assert_eq!(graph.channel(out).unwrap().link(), None);
        assert_eq!(graph.channel(inp).unwrap().link(), Some(other_out));
    }

    #[test]
    fn unlink_clears_both_sides() {
        let mut graph = AudioGraph::default();
        let (source, sink) = pair(&mut graph);
        let out = graph.audio(source).unwrap().outputs()[0];
        let inp = graph.audio(sink).unwrap().inputs()[0];
        graph.link_channels(out, inp).unwrap();
        assert_eq!(graph.unlink_channel(inp), Ok(Some(out)));
        assert_eq!(graph.channel(out).unwrap().link(), None);
        let recycling = graph.channel(inp).unwrap().recycling();
        assert_eq!(graph.recycling(recycling).unwrap().parent(), None);
        assert_eq!(graph.unlink_channel(inp), Ok(None));
    }
}
