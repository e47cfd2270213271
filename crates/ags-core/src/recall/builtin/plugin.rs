use core::fmt;
use std::sync::Arc;

use crate::fault::Fault;
use crate::plugin::{PluginAdapter, PluginFactory};
use crate::recall::{
    InitStage, RecallBehavior, RecallError, RecallPrototype, RunOutcome, RunStage, StageContext,
};
use crate::worker::{WorkPoll, WorkTicket, schedule_work};

/// Hosts one [`PluginAdapter`] instance per voice.
///
/// The instance is created in the pre init stage and processes the voice
/// signal in place during the inter run stage. Worker requests are handed to
/// the engine's work scheduler; the reply is delivered on a later tick, and
/// a reply that is late by more than the configured number of ticks is
/// recorded as a [`Fault::WorkerTimeout`].
pub struct PluginRecall {
    factory: Arc<dyn PluginFactory>,
    instance: Option<Box<dyn PluginAdapter>>,
    ticket: Option<WorkTicket<Vec<u8>>>,
    input: Vec<f32>,
    output: Vec<f32>,
    port_values: Vec<f32>,
}

impl PluginRecall {
    /// Recall hosting instances of `factory`.
    pub fn new(factory: Arc<dyn PluginFactory>) -> Self {
        Self {
            factory,
            instance: None,
            ticket: None,
            input: Vec::new(),
            output: Vec::new(),
            port_values: Vec::new(),
        }
    }

    /// Prototype named after the effect, carrying the factory's ports.
    pub fn prototype(factory: Arc<dyn PluginFactory>) -> RecallPrototype {
        let ports = factory.ports();
        let name = factory.name().to_owned();
        let proto = RecallPrototype::new(name, move || -> Box<dyn RecallBehavior> {
            Box::new(PluginRecall::new(Arc::clone(&factory)))
        });
        ports.into_iter().fold(proto, RecallPrototype::with_port)
    }

    /// Returns `true` once the instance exists.
    pub fn is_instantiated(&self) -> bool {
        self.instance.is_some()
    }

    /// Returns `true` while a worker request is outstanding.
    pub fn is_waiting(&self) -> bool {
        self.ticket.is_some()
    }

    fn poll_worker(&mut self, cx: &StageContext<'_>) {
        let Some(instance) = self.instance.as_mut() else {
            return;
        };
        if let Some(mut ticket) = self.ticket.take() {
            match ticket.poll(cx.tick()) {
                WorkPoll::Ready(response) => instance.respond(response),
                WorkPoll::Pending => self.ticket = Some(ticket),
                WorkPoll::TimedOut { waited } => {
                    cx.record(Fault::WorkerTimeout {
                        recall: cx.recall_key(),
                        waited_ticks: waited,
                    });
                    self.ticket = Some(ticket);
                }
            }
            return;
        }
        let Some(worker) = instance.worker() else {
            return;
        };
        if let Some(request) = instance.schedule_work() {
            let timeout = cx.engine().settings().worker_timeout_ticks;
            self.ticket = Some(schedule_work(cx.engine().worker(), cx.tick(), timeout, move || {
                worker.work(request)
            }));
        }
    }
}

impl fmt::Debug for PluginRecall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRecall")
            .field("effect", &self.factory.name())
            .field("instantiated", &self.instance.is_some())
            .field("waiting", &self.ticket.is_some())
            .finish_non_exhaustive()
    }
}

impl RecallBehavior for PluginRecall {
    fn init(&mut self, stage: InitStage, cx: &StageContext<'_>) -> Result<(), RecallError> {
        if stage != InitStage::Pre {
            return Ok(());
        }
        let settings = cx.engine().settings();
        let instance = self
            .factory
            .instantiate(settings.samplerate, settings.buffer_size)
            .map_err(|e| RecallError::Failed(e.to_string()))?;
        self.port_values = Vec::with_capacity(instance.ports().len());
        self.input = vec![0.0; settings.buffer_size];
        self.output = vec![0.0; settings.buffer_size];
        self.instance = Some(instance);
        Ok(())
    }

    fn run(&mut self, stage: RunStage, cx: &StageContext<'_>) -> RunOutcome {
        if stage != RunStage::Inter {
            return RunOutcome::Continue;
        }
        self.poll_worker(cx);
        let (Some(instance), Some(signal)) = (self.instance.as_mut(), cx.signal()) else {
            return RunOutcome::Continue;
        };
        if let Some(ports) = cx.ports() {
            ports.values_into(&mut self.port_values);
        }
        let n = signal.read_current(&mut self.input);
        self.output[..n].fill(0.0);
        instance.process(&[&self.input[..n]], &mut [&mut self.output[..n]], &self.port_values);
        signal.with_current_mut(|buf| buf[..n].copy_from_slice(&self.output[..n]));
        RunOutcome::Continue
    }

    fn cancel(&mut self, _cx: &StageContext<'_>) {
        self.ticket = None;
        self.instance = None;
    }

    fn duplicate(&self) -> Box<dyn RecallBehavior> {
        Box::new(Self::new(Arc::clone(&self.factory)))
    }
}
