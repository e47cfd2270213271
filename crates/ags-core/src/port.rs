//! Control ports shared between a template recall and its duplicates.
//!
//! Values are stored as `f32` bits in an `AtomicU32`, so a control surface
//! can write while the tick reads without any lock.

use std::sync::atomic::{AtomicU32, Ordering};

/// Static description of a port.
#[derive(Clone, Debug, PartialEq)]
pub struct PortDescriptor {
    /// Port name, unique within its recall.
    pub name: String,
    /// Initial value.
    pub default: f32,
    /// Lower bound.
    pub min: f32,
    /// Upper bound.
    pub max: f32,
}

impl PortDescriptor {
    /// Creates a descriptor. `min` and `max` are swapped if given in reverse.
    pub fn new(name: impl Into<String>, default: f32, min: f32, max: f32) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            name: name.into(),
            default: default.clamp(min, max),
            min,
            max,
        }
    }
}

/// A live port.
#[derive(Debug)]
pub struct Port {
    descriptor: PortDescriptor,
    value: AtomicU32,
}

impl Port {
    /// Creates a port holding its default value.
    pub fn new(descriptor: PortDescriptor) -> Self {
        let value = AtomicU32::new(descriptor.default.to_bits());
        Self { descriptor, value }
    }

    /// Descriptor.
    pub fn descriptor(&self) -> &PortDescriptor {
        &self.descriptor
    }

    /// Current value.
    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.value.load(Ordering::Relaxed))
    }

    /// Stores `value` clamped to the port range.
    #[inline]
    pub fn set(&self, value: f32) {
        let clamped = value.clamp(self.descriptor.min, self.descriptor.max);
        self.value.store(clamped.to_bits(), Ordering::Relaxed);
    }
}

/// Ordered set of ports.
#[derive(Debug, Default)]
pub struct PortSet {
    ports: Vec<Port>,
}

impl PortSet {
    /// Builds a set from descriptors.
    pub fn new(descriptors: impl IntoIterator<Item = PortDescriptor>) -> Self {
        Self {
            ports: descriptors.into_iter().map(Port::new).collect(),
        }
    }

    /// Empty set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Index of the port called `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.ports.iter().position(|p| p.descriptor.name == name)
    }

    /// Port at `index`.
    pub fn port(&self, index: usize) -> Option<&Port> {
        self.ports.get(index)
    }

    /// Value of the port called `name`.
    pub fn get(&self, name: &str) -> Option<f32> {
        self.index_of(name).map(|i| self.ports[i].get())
    }

    /// Sets the port called `name`. Returns `false` if there is none.
    pub fn set(&self, name: &str, value: f32) -> bool {
        match self.index_of(name) {
            Some(i) => {
                self.ports[i].set(value);
                true
            }
            None => false,
        }
    }

    /// Copies every value into `out`, resizing it to the port count.
    pub fn values_into(&self, out: &mut Vec<f32>) {
        out.clear();
        out.extend(self.ports.iter().map(Port::get));
    }

    /// Number of ports.
    pub fn len(&self) -> usize {
        self.ports.len()
    }

    /// Returns `true` if there are no ports.
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Iterates over the ports.
    pub fn iter(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter()
    }
}
