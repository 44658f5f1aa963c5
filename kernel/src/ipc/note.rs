//! Notes: short out-of-band messages delivered to a thread outside the
//! normal IPC channel/endpoint path, plus a kill fast-path that bypasses
//! the note queue entirely.
//!
//! Grounded on the original kernel's `note_queue_t`: a fixed-size ring
//! buffer of small buffers, overwriting the oldest entry when full, with
//! one flag (`received_kill`) that short-circuits queued delivery. A kill
//! note must still be observed even if the queue itself is full or the
//! thread never drains it, so it isn't a queue entry at all.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use spin::Mutex;

use crate::{println, process::ProcessId};

/// Maximum payload carried by a single note.
pub const NOTE_MAX_BUFFER: usize = 64;

/// Number of notes the ring buffer holds before it starts overwriting the
/// oldest entry.
pub const CONFIG_MAX_NOTES: usize = 8;

/// A single queued note.
#[derive(Debug, Clone, Copy)]
pub struct Note {
    pub buffer: [u8; NOTE_MAX_BUFFER],
    pub length: u16,
    pub sender: ProcessId,
}

impl Note {
    fn new(sender: ProcessId, data: &[u8]) -> Self {
        let mut buffer = [0u8; NOTE_MAX_BUFFER];
        let length = data.len().min(NOTE_MAX_BUFFER);
        buffer[..length].copy_from_slice(&data[..length]);
        Self {
            buffer,
            length: length as u16,
            sender,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.buffer[..self.length as usize]
    }
}

struct Ring {
    notes: [Option<Note>; CONFIG_MAX_NOTES],
    read_index: usize,
    write_index: usize,
    length: usize,
}

impl Ring {
    const fn new() -> Self {
        Self {
            notes: [None; CONFIG_MAX_NOTES],
            read_index: 0,
            write_index: 0,
            length: 0,
        }
    }

    fn push(&mut self, note: Note) {
        self.notes[self.write_index] = Some(note);
        self.write_index = (self.write_index + 1) % CONFIG_MAX_NOTES;
        if self.length == CONFIG_MAX_NOTES {
            // Full: the slot we just overwrote was the oldest, advance the
            // read side to match.
            self.read_index = self.write_index;
        } else {
            self.length += 1;
        }
    }

    fn pop(&mut self) -> Option<Note> {
        if self.length == 0 {
            return None;
        }
        let note = self.notes[self.read_index].take();
        self.read_index = (self.read_index + 1) % CONFIG_MAX_NOTES;
        self.length -= 1;
        note
    }
}

/// Per-thread note queue plus kill fast-path flag.
pub struct NoteQueue {
    ring: Mutex<Ring>,
    received_kill: AtomicBool,
    len: AtomicUsize,
}

impl NoteQueue {
    pub const fn new() -> Self {
        Self {
            ring: Mutex::new(Ring::new()),
            received_kill: AtomicBool::new(false),
            len: AtomicUsize::new(0),
        }
    }

    /// Number of notes currently queued (excludes the kill flag).
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record that the thread has been sent a kill note. Never fails and
    /// never touches the ring buffer: a kill must be observed even if the
    /// queue is full.
    pub fn send_kill(&self) {
        self.received_kill.store(true, Ordering::Release);
    }

    pub fn has_pending_kill(&self) -> bool {
        self.received_kill.load(Ordering::Acquire)
    }

    /// Queue an ordinary note, overwriting the oldest one if the ring is
    /// full.
    pub fn write(&self, sender: ProcessId, data: &[u8]) {
        let note = Note::new(sender, data);
        let mut ring = self.ring.lock();
        let was_full = ring.length == CONFIG_MAX_NOTES;
        ring.push(note);
        if !was_full {
            self.len.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Handle whatever is pending for the current thread: a kill takes
    /// priority over and short-circuits draining the queue. Returns `true`
    /// if the caller was killed (the caller should not assume execution
    /// continues past this point -- `exit_process` does not return).
    pub fn handle_pending(&self) -> bool {
        if self.received_kill.swap(false, Ordering::AcqRel) {
            println!("[NOTE] Pending kill, exiting process");
            crate::process::lifecycle::exit_process(-1);
            return true;
        }

        while let Some(note) = {
            let mut ring = self.ring.lock();
            let note = ring.pop();
            if note.is_some() {
                self.len.fetch_sub(1, Ordering::Relaxed);
            }
            note
        } {
            // General note handling (software interrupts) isn't built; log
            // and drop, matching the source this is grounded on.
            println!(
                "[NOTE] Unknown note from process {} ({} bytes)",
                note.sender.0,
                note.length
            );
        }

        false
    }
}

impl Default for NoteQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_drain_in_order() {
        let queue = NoteQueue::new();
        queue.write(ProcessId(1), b"first");
        queue.write(ProcessId(2), b"second");
        assert_eq!(queue.len(), 2);

        let mut ring = queue.ring.lock();
        let a = ring.pop().unwrap();
        let b = ring.pop().unwrap();
        assert_eq!(a.data(), b"first");
        assert_eq!(b.data(), b"second");
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let queue = NoteQueue::new();
        for i in 0..CONFIG_MAX_NOTES + 2 {
            queue.write(ProcessId(i as u64), &[i as u8]);
        }
        assert_eq!(queue.len(), CONFIG_MAX_NOTES);

        let mut ring = queue.ring.lock();
        let first = ring.pop().unwrap();
        // The two oldest entries (0, 1) were evicted.
        assert_eq!(first.data(), &[2u8]);
    }

    #[test]
    fn test_kill_bypasses_queue() {
        let queue = NoteQueue::new();
        queue.write(ProcessId(1), b"noise");
        queue.send_kill();
        assert!(queue.has_pending_kill());
        // The ordinary note is untouched by the kill flag.
        assert_eq!(queue.len(), 1);
    }
}
