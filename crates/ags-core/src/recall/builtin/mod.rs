//! Recalls shipped with the engine.
//!
//! A voice is usually assembled from three containers registered in order:
//! [`FeedRecall`] fills the voice buffer in the pre stage, [`VolumeRecall`]
//! scales it in the inter stage and [`PlayRecall`] mixes it into the output
//! bus in the post stage. [`playback_chain`] builds that trio.

mod feed;
mod notation;
mod play;
mod plugin;
mod pull;
mod volume;

pub use feed::FeedRecall;
pub use notation::NotationRecall;
pub use play::PlayRecall;
pub use plugin::PluginRecall;
pub use pull::PullRecall;
pub use volume::VolumeRecall;

use crate::ids::RecallKey;
use crate::loader::BufferLoader;
use crate::sound::ScopeSet;

use super::{ContainerSpec, RecallError, StageContext};

/// Feed, volume and play containers for voices in `ability`.
///
/// Volume and play follow the feed: once it runs dry they finish too, so
/// the voice ends by itself.
pub fn playback_chain(
    loader: impl BufferLoader + 'static,
    frame_limit: Option<u64>,
    ability: ScopeSet,
) -> Vec<ContainerSpec> {
    let mut feed = FeedRecall::new(loader);
    if let Some(limit) = frame_limit {
        feed = feed.with_frame_limit(limit);
    }
    vec![
        ContainerSpec::new("feed").with_signal(feed.into_prototype().with_ability(ability)),
        ContainerSpec::new("volume").with_signal(
            VolumeRecall::default()
                .following(FeedRecall::NAME)
                .into_prototype()
                .with_ability(ability),
        ),
        ContainerSpec::new("play").with_signal(
            PlayRecall::default()
                .following(FeedRecall::NAME)
                .into_prototype()
                .with_ability(ability),
        ),
    ]
}

/// Ties a recall's lifetime to a sibling on the same graph object.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Follow {
    name: Option<&'static str>,
    target: Option<RecallKey>,
}

impl Follow {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name: Some(name),
            target: None,
        }
    }

    /// Finds the leader among the run's recalls sharing this recall's
    /// binding.
    pub(crate) fn resolve(&mut self, cx: &StageContext<'_>) -> Result<(), RecallError> {
        let Some(name) = self.name else {
            return Ok(());
        };
        let id = cx
            .recall_id()
            .ok_or_else(|| RecallError::Failed(format!("{} is gone", cx.recall_id_key())))?;
        let own = cx.binding();
        let found = id.recalls().iter().copied().find(|&key| {
            key != cx.recall_key()
                && cx
                    .graph()
                    .recall(key)
                    .is_some_and(|r| r.name() == name && Some(r.binding()) == own)
        });
        match found {
            Some(key) => {
                self.target = Some(key);
                Ok(())
            }
            None => Err(RecallError::Dependency(format!("{name} not present"))),
        }
    }

    /// Returns `true` once the leader is done or failed.
    pub(crate) fn finished(&self, cx: &StageContext<'_>) -> bool {
        self.target
            .and_then(|key| cx.graph().recall(key))
            .is_some_and(|r| r.is_done() || r.is_failed())
    }
}
