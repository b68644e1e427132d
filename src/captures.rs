/*! Capture groups.

A capture group is a named interval of the input collected as a side effect
of state-entry/exit callbacks. Callbacks receive a mutable reference to the
run's [`Captures`] store and open groups with [`Captures::begin`] and close
them with [`Captures::end`]; the executors append every consumed byte to all
open groups.

Under backtracking the whole store is snapshotted at each choice point and
restored when the engine backtracks, so groups recorded along a discarded
path are invisible afterwards.
*/

use std::borrow::Cow;

use thiserror::Error;

/// Errors returned by capture-group operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// `begin` was called for a name that already has an open group.
    #[error("capture group `{0}` is already active")]
    AlreadyActive(String),

    /// `end` was called for a name with no open group.
    #[error("no active capture group named `{0}`")]
    NotActive(String),
}

/// A closed capture group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureGroup {
    name: String,
    start: usize,
    end: usize,
    value: Vec<u8>,
}

impl CaptureGroup {
    /// The group's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Input position at which the group was opened.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Input position at which the group was closed.
    pub fn end(&self) -> usize {
        self.end
    }

    /// Number of input bytes covered by the group.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns `true` if the group covers no input.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The bytes recorded between `begin` and `end`.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// The recorded bytes as a string, with invalid UTF-8 replaced.
    pub fn value_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

/// An open capture still accumulating bytes.
#[derive(Debug, Clone)]
struct ActiveCapture {
    name: String,
    start: usize,
    buffer: Vec<u8>,
}

/// The per-run capture store.
///
/// Tracks the current input position, the open groups, and the list of
/// closed groups in closing order. The same name may appear in the closed
/// list multiple times across one run, but at most one open group per name
/// exists at any time.
#[derive(Debug, Clone, Default)]
pub struct Captures {
    position: usize,
    active: Vec<ActiveCapture>,
    closed: Vec<CaptureGroup>,
}

impl Captures {
    /// Opens a capture group at the current input position.
    pub fn begin(&mut self, name: &str) -> Result<(), CaptureError> {
        if self.active.iter().any(|a| a.name == name) {
            return Err(CaptureError::AlreadyActive(name.to_string()));
        }
        self.active.push(ActiveCapture {
            name: name.to_string(),
            start: self.position,
            buffer: Vec::new(),
        });
        Ok(())
    }

    /// Closes the open group with the given name, appends it to the closed
    /// list, and returns it.
    pub fn end(&mut self, name: &str) -> Result<CaptureGroup, CaptureError> {
        let index = self
            .active
            .iter()
            .position(|a| a.name == name)
            .ok_or_else(|| CaptureError::NotActive(name.to_string()))?;
        let active = self.active.remove(index);
        let group = CaptureGroup {
            name: active.name,
            start: active.start,
            end: self.position,
            value: active.buffer,
        };
        self.closed.push(group.clone());
        Ok(group)
    }

    /// The first closed group with the given name, if any.
    pub fn get(&self, name: &str) -> Option<&CaptureGroup> {
        self.closed.iter().find(|c| c.name == name)
    }

    /// The closed group at the given position in closing order.
    pub fn get_index(&self, index: usize) -> Option<&CaptureGroup> {
        self.closed.get(index)
    }

    /// All closed groups, in closing order.
    pub fn all(&self) -> &[CaptureGroup] {
        &self.closed
    }

    /// Returns `true` if a closed group with the given name exists.
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of groups currently open.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Discards all open and closed groups. The input position is kept.
    pub fn clear(&mut self) {
        self.active.clear();
        self.closed.clear();
    }

    /// The current input position (bytes consumed so far).
    pub fn position(&self) -> usize {
        self.position
    }

    pub(crate) fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    /// Appends a consumed byte to every open group.
    pub(crate) fn record(&mut self, byte: u8) {
        for active in &mut self.active {
            active.buffer.push(byte);
        }
    }
}
