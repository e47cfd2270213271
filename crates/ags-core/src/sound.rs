//! Sound scopes, channel direction, sample formats and audio behaviour flags.

use core::fmt;
use core::str::FromStr;

/// Mutually exclusive execution context of a [`RecallId`](crate::RecallId).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SoundScope {
    /// Live playback of a channel.
    Playback,
    /// Pattern sequencer.
    Sequencer,
    /// Notation (piano roll) playback.
    Notation,
    /// Audio file/wave playback.
    Wave,
    /// MIDI pass-through.
    Midi,
}

impl SoundScope {
    /// Number of scopes.
    pub const COUNT: usize = 5;

    /// All scopes in processing order.
    pub const ALL: [SoundScope; Self::COUNT] = [
        SoundScope::Playback,
        SoundScope::Sequencer,
        SoundScope::Notation,
        SoundScope::Wave,
        SoundScope::Midi,
    ];

    /// Dense index, usable for per-scope tables.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Lowercase name.
    pub const fn name(self) -> &'static str {
        match self {
            SoundScope::Playback => "playback",
            SoundScope::Sequencer => "sequencer",
            SoundScope::Notation => "notation",
            SoundScope::Wave => "wave",
            SoundScope::Midi => "midi",
        }
    }
}

impl fmt::Display for SoundScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of scopes a recall is able to run in.
///
/// ```rust
/// use ags_core::{ScopeSet, SoundScope};
///
/// let scopes = ScopeSet::of(SoundScope::Playback).with(SoundScope::Notation);
/// assert!(scopes.contains(SoundScope::Notation));
/// assert!(!scopes.contains(SoundScope::Wave));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ScopeSet(u8);

impl ScopeSet {
    /// No scope.
    pub const NONE: Self = Self(0);
    /// Every scope.
    pub const ALL: Self = Self(0b1_1111);

    /// Set holding a single scope.
    pub const fn of(scope: SoundScope) -> Self {
        Self(1 << scope.index())
    }

    /// Returns the set with `scope` added.
    pub const fn with(self, scope: SoundScope) -> Self {
        Self(self.0 | (1 << scope.index()))
    }

    /// Returns `true` if `scope` is in the set.
    #[inline]
    pub const fn contains(self, scope: SoundScope) -> bool {
        self.0 & (1 << scope.index()) != 0
    }

    /// Returns `true` if no scope is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<SoundScope> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = SoundScope>>(iter: I) -> Self {
        iter.into_iter().fold(Self::NONE, ScopeSet::with)
    }
}

/// Whether a channel carries signal out of or into its audio.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Output lane.
    Output,
    /// Input lane.
    Input,
}

impl Direction {
    /// The opposite direction.
    pub const fn opposite(self) -> Self {
        match self {
            Direction::Output => Direction::Input,
            Direction::Input => Direction::Output,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Output => "output",
            Direction::Input => "input",
        })
    }
}

/// Behaviour flags of an [`Audio`](crate::Audio).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct AudioBehaviour(u8);

impl AudioBehaviour {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Output playback pulls from the inputs of the same audio channel.
    pub const DEFAULTS_TO_INPUT: Self = Self(1 << 0);
    /// Input playback feeds straight to the outputs.
    pub const DEFAULTS_TO_OUTPUT: Self = Self(1 << 1);
    /// Inputs map to outputs in reverse pad order.
    pub const REVERSE_MAPPING: Self = Self(1 << 2);
    /// Inputs are processed as one block rather than per pad.
    pub const BULK_MODE: Self = Self(1 << 3);

    /// Returns `true` if all bits in `other` are set in `self`.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of two flag sets.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Sample format announced by the soundcard.
///
/// Buffers inside the engine are always `f32`; the format only matters at
/// the soundcard boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SampleFormat {
    /// Signed 16 bit.
    S16,
    /// Signed 24 bit.
    S24,
    /// Signed 32 bit.
    S32,
    /// 32 bit float.
    #[default]
    F32,
    /// 64 bit float.
    F64,
}

impl SampleFormat {
    /// Bytes used per sample on the wire.
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::S16 => 2,
            SampleFormat::S24 => 3,
            SampleFormat::S32 | SampleFormat::F32 => 4,
            SampleFormat::F64 => 8,
        }
    }

    /// Short lowercase name, the inverse of [`FromStr`].
    pub const fn name(self) -> &'static str {
        match self {
            SampleFormat::S16 => "s16",
            SampleFormat::S24 => "s24",
            SampleFormat::S32 => "s32",
            SampleFormat::F32 => "f32",
            SampleFormat::F64 => "f64",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown sample format name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sample format '{0}' (expected s16, s24, s32, f32 or f64)")]
pub struct ParseSampleFormatError(pub String);

impl FromStr for SampleFormat {
    type Err = ParseSampleFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s16" => Ok(SampleFormat::S16),
            "s24" => Ok(SampleFormat::S24),
            "s32" => Ok(SampleFormat::S32),
            "f32" => Ok(SampleFormat::F32),
            "f64" => Ok(SampleFormat::F64),
            _ => Err(ParseSampleFormatError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_indices_are_dense() {
        for (i, scope) in SoundScope::ALL.iter().enumerate() {
            assert_eq!(scope.index(), i);
        }
    }

    #[test]
    fn scope_set_from_iter() {
        let set: ScopeSet = [SoundScope::Wave, SoundScope::Midi].into_iter().collect();
        assert!(set.contains(SoundScope::Wave));
        assert!(set.contains(SoundScope::Midi));
        assert!(!set.contains(SoundScope::Playback));
    }

    #[test]
    fn scope_set_all_contains_everything() {
        for scope in SoundScope::ALL {
            assert!(ScopeSet::ALL.contains(scope));
            assert!(!ScopeSet::NONE.contains(scope));
        }
    }

    #[test]
    fn behaviour_union() {
        let b = AudioBehaviour::DEFAULTS_TO_INPUT.union(AudioBehaviour::BULK_MODE);
        assert!(b.contains(AudioBehaviour::DEFAULTS_TO_INPUT));
        assert!(!b.contains(AudioBehaviour::REVERSE_MAPPING));
    }

    #[test]
    fn sample_format_parse() {
        assert_eq!("F32".parse::<SampleFormat>(), Ok(SampleFormat::F32));
        assert_eq!("s24".parse::<SampleFormat>(), Ok(SampleFormat::S24));
        assert!("u8".parse::<SampleFormat>().is_err());
    }

    #[test]
    fn sample_format_name_roundtrips() {
        for format in [
            SampleFormat::S16,
            SampleFormat::S24,
            SampleFormat::S32,
            SampleFormat::F32,
            SampleFormat::F64,
        ] {
            assert_eq!(format.name().parse::<SampleFormat>(), Ok(format));
        }
    }
}
