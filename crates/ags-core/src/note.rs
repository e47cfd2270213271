//! Notes and the external MIDI/notation feed.
//!
//! An external sequencer or clock pushes [`NoteEvent`]s into a [`NoteFeed`].
//! The notation recall drains the feed once per tick and turns the events
//! into note-on/note-off tasks.

use crossbeam_channel::{Receiver, Sender, TryRecvError};

/// A sounding note attached to a voice signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Note {
    /// MIDI key, 0-127.
    pub key: u8,
    /// MIDI velocity, 0-127.
    pub velocity: u8,
}

impl Note {
    /// Creates a note.
    pub const fn new(key: u8, velocity: u8) -> Self {
        Self { key, velocity }
    }

    /// Equal-tempered frequency with A4 (key 69) at 440 Hz.
    pub fn frequency(self) -> f32 {
        440.0 * 2f32.powf((f32::from(self.key) - 69.0) / 12.0)
    }

    /// Velocity scaled to 0.0-1.0.
    pub fn gain(self) -> f32 {
        f32::from(self.velocity.min(127)) / 127.0
    }
}

/// One event from the external feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoteEvent {
    /// The note.
    pub note: Note,
    /// `true` for note-on, `false` for note-off.
    pub on: bool,
    /// Ticks to wait after the event is received.
    pub tick_offset: u32,
}

impl NoteEvent {
    /// Note-on due immediately.
    pub const fn on(key: u8, velocity: u8) -> Self {
        Self {
            note: Note::new(key, velocity),
            on: true,
            tick_offset: 0,
        }
    }

    /// Note-off due immediately.
    pub const fn off(key: u8) -> Self {
        Self {
            note: Note::new(key, 0),
            on: false,
            tick_offset: 0,
        }
    }

    /// Delays the event by `ticks`.
    pub const fn after(mut self, ticks: u32) -> Self {
        self.tick_offset = ticks;
        self
    }
}

/// Source of note events, polled from the tick path.
///
/// Implementations must not block.
pub trait NoteFeed: Send + Sync {
    /// Moves every event received since the last call into `out`.
    fn drain_into(&self, out: &mut Vec<NoteEvent>);
}

/// [`NoteFeed`] backed by an unbounded crossbeam channel.
///
/// ```rust
/// use ags_core::{ChannelNoteFeed, NoteEvent, NoteFeed};
///
/// let feed = ChannelNoteFeed::new();
/// feed.sender().send(NoteEvent::on(60, 100)).unwrap();
/// let mut events = Vec::new();
/// feed.drain_into(&mut events);
/// assert_eq!(events.len(), 1);
/// ```
pub struct ChannelNoteFeed {
    tx: Sender<NoteEvent>,
    rx: Receiver<NoteEvent>,
}

impl ChannelNoteFeed {
    /// Creates an empty feed.
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    /// Handle for the producing side.
    pub fn sender(&self) -> Sender<NoteEvent> {
        self.tx.clone()
    }
}

impl Default for ChannelNoteFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl NoteFeed for ChannelNoteFeed {
    fn drain_into(&self, out: &mut Vec<NoteEvent>) {
        loop {
            match self.rx.try_recv() {
                Ok(event) => out.push(event),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
    }
}
