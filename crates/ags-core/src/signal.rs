//! Audio signals: appendable streams of fixed-size buffers.
//!
//! An [`AudioSignal`] belongs to exactly one [`Recycling`](crate::Recycling)
//! and, unless it is the recycling's template, to exactly one
//! [`RecallId`](crate::RecallId). Buffers are addressed by an absolute index;
//! the stream position names the buffer processed by the current tick and
//! only ever moves forward.
//!
//! # Retention
//!
//! Endless playback would otherwise grow the stream forever, so a signal
//! keeps at most `retain` buffers behind its position. Trimmed buffers are
//! zeroed and reused for the next position, which keeps [`AudioSignal::advance`]
//! allocation-free in steady state.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::ids::{RecallIdKey, RecyclingId};
use crate::note::Note;
use crate::sound::SampleFormat;

struct Stream {
    buffers: VecDeque<Vec<f32>>,
    /// Absolute index of `buffers[0]`.
    first: u64,
    position: u64,
}

impl Stream {
    fn current_slot(&mut self, buffer_size: usize) -> &mut Vec<f32> {
        let offset = (self.position - self.first) as usize;
        while self.buffers.len() <= offset {
            self.buffers.push_back(vec![0.0; buffer_size]);
        }
        &mut self.buffers[offset]
    }
}

/// One stream of audio buffers.
pub struct AudioSignal {
    recycling: RecyclingId,
    recall_id: Option<RecallIdKey>,
    template: bool,
    note: Option<Note>,
    samplerate: u32,
    buffer_size: usize,
    format: SampleFormat,
    retain: usize,
    stream: Mutex<Stream>,
}

impl AudioSignal {
    pub(crate) fn new(
        recycling: RecyclingId,
        recall_id: Option<RecallIdKey>,
        samplerate: u32,
        buffer_size: usize,
        format: SampleFormat,
        retain: usize,
    ) -> Self {
        let mut buffers = VecDeque::new();
        buffers.push_back(vec![0.0; buffer_size]);
        Self {
            recycling,
            recall_id,
            template: recall_id.is_none(),
            note: None,
            samplerate,
            buffer_size,
            format,
            retain,
            stream: Mutex::new(Stream {
                buffers,
                first: 0,
                position: 0,
            }),
        }
    }

    pub(crate) fn with_note(mut self, note: Option<Note>) -> Self {
        self.note = note;
        self
    }

    /// Owning recycling.
    pub fn recycling(&self) -> RecyclingId {
        self.recycling
    }

    /// Recall id this signal is produced for, `None` for a template.
    pub fn recall_id(&self) -> Option<RecallIdKey> {
        self.recall_id
    }

    /// Returns `true` for the recycling's template signal.
    pub fn is_template(&self) -> bool {
        self.template
    }

    /// Note this voice was started for, if any.
    pub fn note(&self) -> Option<Note> {
        self.note
    }

    /// Sample rate in Hz.
    pub fn samplerate(&self) -> u32 {
        self.samplerate
    }

    /// Frames per buffer.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Sample format.
    pub fn format(&self) -> SampleFormat {
        self.format
    }

    /// Absolute index of the buffer processed this tick.
    pub fn position(&self) -> u64 {
        self.stream.lock().position
    }

    /// Buffers currently held.
    pub fn len(&self) -> usize {
        self.stream.lock().buffers.len()
    }

    /// Always `false`; a signal holds at least its current buffer.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Appends one zeroed buffer at the end of the stream.
    pub fn add_stream(&self) {
        self.stream.lock().buffers.push_back(vec![0.0; self.buffer_size]);
    }

    /// Grows or shrinks the stream to `count` buffers counted from the
    /// oldest held buffer. Never drops the current buffer.
    pub fn stream_resize(&self, count: usize) {
        let mut stream = self.stream.lock();
        let keep = (stream.position - stream.first) as usize + 1;
        let count = count.max(keep);
        let buffer_size = self.buffer_size;
        stream.buffers.resize_with(count, || vec![0.0; buffer_size]);
    }

    /// Runs `f` on the current buffer.
    pub fn with_current<R>(&self, f: impl FnOnce(&[f32]) -> R) -> R {
        let mut stream = self.stream.lock();
        f(stream.current_slot(self.buffer_size))
    }

    /// Runs `f` on the current buffer, mutably.
    pub fn with_current_mut<R>(&self, f: impl FnOnce(&mut [f32]) -> R) -> R {
        let mut stream = self.stream.lock();
        f(stream.current_slot(self.buffer_size))
    }

    /// Copies the current buffer into `out`. Returns the frames copied.
    pub fn read_current(&self, out: &mut [f32]) -> usize {
        self.with_current(|buffer| {
            let n = buffer.len().min(out.len());
            out[..n].copy_from_slice(&buffer[..n]);
            n
        })
    }

    /// Zeroes the current buffer.
    pub fn clear_current(&self) {
        self.with_current_mut(|buffer| buffer.fill(0.0));
    }

    /// Copy of the buffer at absolute `index`, if still held.
    pub fn buffer(&self, index: u64) -> Option<Vec<f32>> {
        let stream = self.stream.lock();
        let offset = index.checked_sub(stream.first)? as usize;
        stream.buffers.get(offset).cloned()
    }

    /// Moves the stream position forward by one buffer and returns it.
    pub fn advance(&self) -> u64 {
        let mut stream = self.stream.lock();
        stream.position += 1;
        let mut spare = None;
        while stream.position - stream.first > self.retain as u64 && stream.buffers.len() > 1 {
            spare = stream.buffers.pop_front();
            stream.first += 1;
        }
        let offset = (stream.position - stream.first) as usize;
        if stream.buffers.len() <= offset {
            let buffer = match spare {
                Some(mut buffer) => {
                    buffer.fill(0.0);
                    buffer
                }
                None => vec![0.0; self.buffer_size],
            };
            stream.buffers.push_back(buffer);
        }
        stream.position
    }

    /// Replaces this stream with a copy of `other`'s held buffers and
    /// rewinds to the first of them.
    ///
    /// Used to seed a voice from its recycling's template. The two locks are
    /// never held at the same time.
    pub fn copy_stream_from(&self, other: &AudioSignal) {
        let copied: VecDeque<Vec<f32>> = other.stream.lock().buffers.clone();
        let mut stream = self.stream.lock();
        stream.buffers = copied;
        if stream.buffers.is_empty() {
            stream.buffers.push_back(vec![0.0; self.buffer_size]);
        }
        stream.first = 0;
        stream.position = 0;
    }
}

impl core::fmt::Debug for AudioSignal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AudioSignal")
            .field("recycling", &self.recycling)
            .field("recall_id", &self.recall_id)
            .field("template", &self.template)
            .field("note", &self.note)
            .field("position", &self.position())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Key;

    fn signal(retain: usize) -> AudioSignal {
        let recycling = RecyclingId::from_parts(0, 0);
        let rid = RecallIdKey::from_parts(0, 0);
        AudioSignal::new(recycling, Some(rid), 48_000, 4, SampleFormat::F32, retain)
    }

    #[test]
    fn new_signal_holds_one_zeroed_buffer() {
        let s = signal(4);
        assert_eq!(s.len(), 1);
        assert_eq!(s.position(), 0);
        s.with_current(|b| assert_eq!(b, &[0.0; 4]));
        assert!(!s.is_template());
    }

    #[test]
    fn advance_is_monotonic() {
        let s = signal(2);
        let mut last = s.position();
        for _ in 0..20 {
            let next = s.advance();
            assert!(next > last);
            last = next;
        }
        assert_eq!(s.position(), 20);
    }

    #[test]
    fn retention_bounds_length() {
        let s = signal(3);
        for _ in 0..50 {
            s.advance();
        }
        assert!(s.len() <= 4, "len {}", s.len());
        assert!(s.buffer(0).is_none());
        assert!(s.buffer(50).is_some());
    }

    #[test]
    fn reused_buffers_are_zeroed() {
        let s = signal(1);
        for _ in 0..5 {
            s.with_current_mut(|b| b.fill(1.0));
            s.advance();
            s.with_current(|b| assert_eq!(b, &[0.0; 4]));
        }
    }

    #[test]
    fn stream_resize_keeps_current() {
        let s = signal(8);
        s.advance();
        s.advance();
        s.stream_resize(0);
        assert_eq!(s.len(), 3);
        s.stream_resize(6);
        assert_eq!(s.len(), 6);
    }

    #[test]
    fn add_stream_appends() {
        let s = signal(8);
        s.add_stream();
        s.add_stream();
        assert_eq!(s.len(), 3);
        assert_eq!(s.position(), 0);
    }

    #[test]
    fn copy_stream_rewinds() {
        let template = signal(8);
        template.with_current_mut(|b| b.fill(0.5));
        template.add_stream();
        let voice = signal(8);
        voice.advance();
        voice.copy_stream_from(&template);
        assert_eq!(voice.position(), 0);
        assert_eq!(voice.len(), 2);
        voice.with_current(|b| assert_eq!(b, &[0.5; 4]));
    }

    #[test]
    fn read_current_copies_min_len() {
        let s = signal(8);
        s.with_current_mut(|b| b.copy_from_slice(&[1.0, 2.0, 3.0, 4.0]));
        let mut out = [0.0; 2];
        assert_eq!(s.read_current(&mut out), 2);
        assert_eq!(out, [1.0, 2.0]);
    }
}
