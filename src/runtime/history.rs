//! Sample history buffers for the per-sample calling shape.

use log::warn;

use crate::expr::CompileError;

/// Input history: `2 × frames` samples laid out `[previous | current]`.
#[derive(Debug, Clone)]
pub struct InputHistory {
    frames: usize,
    samples: Vec<f32>,
}

impl InputHistory {
    pub fn new(frames: usize) -> Self {
        Self {
            frames,
            samples: vec![0.0; frames * 2],
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Shift the current block into the previous half and copy `block` in
    /// as the new current block.
    pub fn push_block(&mut self, block: &[f32]) -> Result<(), CompileError> {
        if block.len() != self.frames {
            return Err(CompileError::argument(format!(
                "input block has {} samples, history expects {}",
                block.len(),
                self.frames
            )));
        }
        self.samples.copy_within(self.frames.., 0);
        self.samples[self.frames..].copy_from_slice(block);
        Ok(())
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }

    pub fn previous(&self) -> &[f32] {
        &self.samples[..self.frames]
    }

    pub fn current(&self) -> &[f32] {
        &self.samples[self.frames..]
    }

    pub fn clear(&mut self) {
        self.samples.fill(0.0);
    }

    /// Write `values` as the most recent samples, first value most recent.
    pub fn set(&mut self, values: &[f32]) {
        write_recent(&mut self.samples, values, "input");
    }
}

/// Output history: `frames` samples, read circularly by generated code and
/// overwritten on every call.
#[derive(Debug, Clone)]
pub struct OutputHistory {
    samples: Vec<f32>,
}

impl OutputHistory {
    pub fn new(frames: usize) -> Self {
        Self {
            samples: vec![0.0; frames],
        }
    }

    pub fn frames(&self) -> usize {
        self.samples.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    pub fn clear(&mut self) {
        self.samples.fill(0.0);
    }

    /// Write `values` as the most recent samples, first value most recent.
    pub fn set(&mut self, values: &[f32]) {
        write_recent(&mut self.samples, values, "output");
    }
}

fn write_recent(buf: &mut [f32], values: &[f32], which: &str) {
    if values.len() > buf.len() {
        warn!(
            "{which} history holds {} samples, ignoring {} extra value(s)",
            buf.len(),
            values.len() - buf.len()
        );
    }
    let len = buf.len();
    for (i, v) in values.iter().take(len).enumerate() {
        buf[len - 1 - i] = *v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_block_shifts() {
        let mut h = InputHistory::new(3);
        h.push_block(&[1.0, 2.0, 3.0]).unwrap();
        h.push_block(&[4.0, 5.0, 6.0]).unwrap();
        assert_eq!(h.previous(), &[1.0, 2.0, 3.0]);
        assert_eq!(h.current(), &[4.0, 5.0, 6.0]);
        assert_eq!(h.as_slice().len(), 6);
    }

    #[test]
    fn push_block_length_mismatch() {
        let mut h = InputHistory::new(3);
        assert!(h.push_block(&[1.0]).is_err());
    }

    #[test]
    fn set_writes_most_recent_first() {
        let mut h = InputHistory::new(2);
        h.set(&[9.0, 8.0]);
        assert_eq!(h.as_slice(), &[0.0, 0.0, 8.0, 9.0]);

        let mut y = OutputHistory::new(3);
        y.set(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(y.as_slice(), &[3.0, 2.0, 1.0]);
    }

    #[test]
    fn clear_zeroes() {
        let mut y = OutputHistory::new(2);
        y.set(&[1.0]);
        y.clear();
        assert_eq!(y.as_slice(), &[0.0, 0.0]);
        let mut x = InputHistory::new(2);
        x.push_block(&[1.0, 1.0]).unwrap();
        x.clear();
        assert!(x.as_slice().iter().all(|v| *v == 0.0));
    }
}
