//! The plugin boundary.
//!
//! A loaded effect is reached only through [`PluginAdapter`]: a port list,
//! a `process` callback and an optional asynchronous worker. Plugin ABIs
//! live outside this crate; a host wraps its instances in an adapter and
//! registers a [`PluginFactory`] per effect.

use std::sync::Arc;

use crate::error::EngineError;
use crate::port::PortDescriptor;

/// One plugin instance, owned by one voice.
pub trait PluginAdapter: Send {
    /// Control ports, in the order `process` expects their values.
    fn ports(&self) -> &[PortDescriptor];

    /// Processes one buffer. Must not block.
    fn process(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], port_values: &[f32]);

    /// Worker serving this instance's asynchronous requests.
    fn worker(&self) -> Option<Arc<dyn PluginWorker>> {
        None
    }

    /// A pending worker request, if the instance wants one served.
    fn schedule_work(&mut self) -> Option<Vec<u8>> {
        None
    }

    /// Delivers a worker reply on the tick path.
    fn respond(&mut self, response: Vec<u8>) {
        let _ = response;
    }
}

/// Blocking side of a plugin's worker interface.
pub trait PluginWorker: Send + Sync {
    /// Serves one request. Runs on the worker thread.
    fn work(&self, request: Vec<u8>) -> Vec<u8>;
}

/// Creates instances of one effect.
pub trait PluginFactory: Send + Sync {
    /// Effect name.
    fn name(&self) -> &str;

    /// Control ports every instance exposes.
    fn ports(&self) -> Vec<PortDescriptor>;

    /// Creates an instance for the given stream.
    fn instantiate(
        &self,
        samplerate: u32,
        buffer_size: usize,
    ) -> Result<Box<dyn PluginAdapter>, EngineError>;
}
