//! Look-ahead delay for the audio path
//!
//! One ring buffer per channel, sized once for the longest step at the
//! current sample rate. A single write cursor is shared by all channels and
//! advances once per frame. The detector never goes through this delay.

use serde::{Deserialize, Serialize};
use vx_core::{Sample, ms_to_samples};

use crate::{Processor, ProcessorConfig};

/// Longest supported look-ahead
pub const MAX_LOOKAHEAD_MS: f64 = 10.0;

/// Selectable look-ahead steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LookaheadTime {
    #[default]
    Off,
    Ms2,
    Ms5,
    Ms10,
}

impl LookaheadTime {
    pub const ALL: [LookaheadTime; 4] = [
        LookaheadTime::Off,
        LookaheadTime::Ms2,
        LookaheadTime::Ms5,
        LookaheadTime::Ms10,
    ];

    /// Step from a parameter value, rounded to the nearest index
    pub fn from_index(value: f64) -> Self {
        if value.is_nan() {
            return Self::Off;
        }
        let index = value.round().clamp(0.0, 3.0) as usize;
        Self::ALL[index]
    }

    pub fn index(self) -> usize {
        match self {
            Self::Off => 0,
            Self::Ms2 => 1,
            Self::Ms5 => 2,
            Self::Ms10 => 3,
        }
    }

    pub fn ms(self) -> f64 {
        match self {
            Self::Off => 0.0,
            Self::Ms2 => 2.0,
            Self::Ms5 => 5.0,
            Self::Ms10 => MAX_LOOKAHEAD_MS,
        }
    }
}

/// Per-channel look-ahead ring buffers with a shared cursor
#[derive(Debug, Clone)]
pub struct LookaheadDelay {
    buffers: Vec<Vec<Sample>>,
    capacity: usize,
    write_pos: usize,
    delay_samples: usize,
    time: LookaheadTime,
    sample_rate: f64,
}

impl LookaheadDelay {
    /// Allocates `channels` buffers of `MAX_LOOKAHEAD_MS · fs + 1` samples
    pub fn new(channels: usize, sample_rate: f64) -> Self {
        let capacity = Self::capacity_for(sample_rate);
        Self {
            buffers: vec![vec![0.0; capacity]; channels],
            capacity,
            write_pos: 0,
            delay_samples: 0,
            time: LookaheadTime::Off,
            sample_rate,
        }
    }

    fn capacity_for(sample_rate: f64) -> usize {
        ms_to_samples(MAX_LOOKAHEAD_MS, sample_rate) + 1
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn channels(&self) -> usize {
        self.buffers.len()
    }

    pub fn time(&self) -> LookaheadTime {
        self.time
    }

    pub fn delay_samples(&self) -> usize {
        self.delay_samples
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.delay_samples > 0
    }

    /// Select a step. Switching clears the buffers so no stale audio plays.
    pub fn set_time(&mut self, time: LookaheadTime) {
        if time == self.time {
            return;
        }
        self.time = time;
        self.update_delay();
        self.reset();
    }

    fn update_delay(&mut self) {
        self.delay_samples = ms_to_samples(self.time.ms(), self.sample_rate).min(self.capacity - 1);
    }

    #[inline]
    fn read_pos(&self) -> usize {
        (self.write_pos + self.capacity - self.delay_samples) % self.capacity
    }

    /// Delay one frame in place and advance the cursor.
    ///
    /// Channels beyond the allocated count are passed through.
    #[inline]
    pub fn process_frame(&mut self, frame: &mut [Sample]) {
        if !self.is_active() {
            return;
        }

        let read_pos = self.read_pos();
        let write_pos = self.write_pos;
        for (sample, buffer) in frame.iter_mut().zip(self.buffers.iter_mut()) {
            let delayed = buffer[read_pos];
            buffer[write_pos] = *sample;
            *sample = delayed;
        }

        self.write_pos = (self.write_pos + 1) % self.capacity;
    }
}

impl Processor for LookaheadDelay {
    fn reset(&mut self) {
        for buffer in &mut self.buffers {
            buffer.fill(0.0);
        }
        self.write_pos = 0;
    }

    fn latency(&self) -> usize {
        self.delay_samples
    }
}

impl ProcessorConfig for LookaheadDelay {
    /// Reallocates the buffers; call only off the audio thread
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.capacity = Self::capacity_for(sample_rate);
        let channels = self.buffers.len();
        self.buffers = vec![vec![0.0; self.capacity]; channels];
        self.write_pos = 0;
        self.update_delay();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps() {
        assert_eq!(LookaheadTime::from_index(0.0), LookaheadTime::Off);
        assert_eq!(LookaheadTime::from_index(1.4), LookaheadTime::Ms2);
        assert_eq!(LookaheadTime::from_index(2.0), LookaheadTime::Ms5);
        assert_eq!(LookaheadTime::from_index(7.0), LookaheadTime::Ms10);
        assert_eq!(LookaheadTime::from_index(f64::NAN), LookaheadTime::Off);
        for step in LookaheadTime::ALL {
            assert_eq!(LookaheadTime::from_index(step.index() as f64), step);
        }
    }

    #[test]
    fn test_capacity() {
        let delay = LookaheadDelay::new(2, 48000.0);
        assert_eq!(delay.capacity(), 481);
        assert_eq!(delay.channels(), 2);

        let delay = LookaheadDelay::new(1, 44100.0);
        assert_eq!(delay.capacity(), 442);
    }

    #[test]
    fn test_off_is_pass_through() {
        let mut delay = LookaheadDelay::new(2, 48000.0);
        let mut frame = [0.25, -0.5];
        delay.process_frame(&mut frame);
        assert_eq!(frame, [0.25, -0.5]);
        assert_eq!(delay.latency(), 0);
    }

    #[test]
    fn test_impulse_delay() {
        for step in [LookaheadTime::Ms2, LookaheadTime::Ms5, LookaheadTime::Ms10] {
            let mut delay = LookaheadDelay::new(2, 48000.0);
            delay.set_time(step);
            let d = delay.delay_samples();
            assert_eq!(d, (step.ms() * 48.0) as usize);
            assert_eq!(delay.latency(), d);

            let k = 100;
            for i in 0..(k + d + 50) {
                let x = if i == k { 1.0 } else { 0.0 };
                let mut frame = [x, -x];
                delay.process_frame(&mut frame);
                let expected = if i == k + d { 1.0 } else { 0.0 };
                assert_eq!(frame[0], expected, "{step:?} at {i}");
                assert_eq!(frame[1], -expected, "{step:?} at {i}");
            }
        }
    }

    #[test]
    fn test_cursor_wraps() {
        let mut delay = LookaheadDelay::new(1, 48000.0);
        delay.set_time(LookaheadTime::Ms10);
        let d = delay.delay_samples();

        for i in 0..5000 {
            let mut frame = [i as f64];
            delay.process_frame(&mut frame);
            let expected = if i >= d { (i - d) as f64 } else { 0.0 };
            assert_eq!(frame[0], expected);
            assert!(delay.read_pos() < delay.capacity());
        }
    }

    #[test]
    fn test_switching_clears_history() {
        let mut delay = LookaheadDelay::new(1, 48000.0);
        delay.set_time(LookaheadTime::Ms2);
        for _ in 0..200 {
            delay.process_frame(&mut [1.0]);
        }

        delay.set_time(LookaheadTime::Ms5);
        let mut frame = [0.0];
        delay.process_frame(&mut frame);
        assert_eq!(frame[0], 0.0);
    }

    #[test]
    fn test_sample_rate_change_resizes() {
        let mut delay = LookaheadDelay::new(2, 44100.0);
        delay.set_time(LookaheadTime::Ms10);
        delay.set_sample_rate(96000.0);
        assert_eq!(delay.capacity(), 961);
        assert_eq!(delay.delay_samples(), 960);
    }
}
