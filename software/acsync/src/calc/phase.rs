//! Phase angle of the generated AC reference

use core::f32::consts::TAU;

/// Angle advanced by a fixed step each cycle and kept in `[0, 2π)`
#[derive(Clone, Copy, Debug, Default)]
pub struct PhaseAccumulator {
    angle: f32,
    step: f32,
}

impl PhaseAccumulator {
    /// Step of `w0 * ts` radians per call to [`PhaseAccumulator::advance`]
    pub fn new(w0: f32, ts: f32) -> Self {
        Self {
            angle: 0.0,
            step: w0 * ts,
        }
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn reset(&mut self) {
        self.angle = 0.0;
    }

    /// Advance by one step and return the wrapped angle
    pub fn advance(&mut self) -> f32 {
        let next = (self.angle + self.step).rem_euclid(TAU);
        // rem_euclid can round up to exactly TAU for tiny negative inputs
        self.angle = if next >= TAU { 0.0 } else { next };
        self.angle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::f32::consts::PI;

    #[test]
    fn stays_wrapped() {
        let mut phase = PhaseAccumulator::new(2.0 * PI * 50.0, 100e-6);
        for _ in 0..1_000_000 {
            let a = phase.advance();
            assert!((0.0..TAU).contains(&a), "angle {a} escaped [0, 2pi)");
        }
    }

    #[test]
    fn completes_one_turn_per_period() {
        // 200 steps per period at 50 Hz / 10 kHz
        let mut phase = PhaseAccumulator::new(2.0 * PI * 50.0, 100e-6);
        for _ in 0..199 {
            phase.advance();
        }
        assert!(phase.angle() > 6.2);
        let wrapped = phase.advance();
        assert!(wrapped < 1e-3 || wrapped > TAU - 1e-3, "got {wrapped}");

        phase.reset();
        assert_eq!(phase.angle(), 0.0);
    }
}
