//! A proportional-resonant controller with output saturation

use core::f32::consts::PI;

use serde::{Deserialize, Serialize};

/// Tuning of a [`ProportionalResonant`] controller
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct PrParams {
    /// Sample period [s]
    pub ts: f32,

    /// Proportional gain
    pub kp: f32,

    /// Resonant peak gain
    pub kr: f32,

    /// Resonant angular frequency [rad/s]
    pub w0: f32,

    /// Phase lead applied to the resonant term [rad],
    /// used to compensate for loop delay
    pub phase_lead: f32,

    /// Output lower bound
    pub lower: f32,

    /// Output upper bound
    pub upper: f32,
}

impl PrParams {
    /// Symmetric output bound of `[-udc, +udc]` with no phase lead
    pub fn new(ts: f32, kp: f32, kr: f32, w0: f32, udc: f32) -> Self {
        Self {
            ts,
            kp,
            kr,
            w0,
            phase_lead: 0.0,
            lower: -udc,
            upper: udc,
        }
    }
}

/// Proportional + resonant compensator
///
/// ```text
///                      s cos(phi) - w0 sin(phi)
/// C(s) = kp  +  kr * ---------------------------
///                          s^2 + w0^2
/// ```
///
/// The resonant term is realized as a pair of coupled integrators.
/// The coupling coefficient is chosen so that the discrete poles sit
/// exactly at `exp(±j w0 ts)`, which keeps the peak on the tuned frequency
/// regardless of the ratio between `w0` and the sample rate.
///
/// Integrator state persists across calls and is only cleared by
/// [`ProportionalResonant::reset`].
#[derive(Clone, Debug)]
pub struct ProportionalResonant {
    params: PrParams,

    // Derived from params
    wd: f32,
    cos_phi: f32,
    sin_phi: f32,

    // Internal state
    in_phase: f32,
    quadrature: f32,
}

impl ProportionalResonant {
    pub fn new(params: PrParams) -> Self {
        let mut pr = Self {
            params,
            wd: 0.0,
            cos_phi: 1.0,
            sin_phi: 0.0,
            in_phase: 0.0,
            quadrature: 0.0,
        };
        pr.retune();
        pr
    }

    pub fn params(&self) -> &PrParams {
        &self.params
    }

    /// Clear integrator state
    pub fn reset(&mut self) {
        self.in_phase = 0.0;
        self.quadrature = 0.0;
    }

    /// Move the resonant peak without clearing state
    pub fn set_frequency(&mut self, w0: f32) {
        self.params.w0 = w0;
        self.retune();
    }

    fn retune(&mut self) {
        let p = &self.params;
        let half_step = (p.w0 * p.ts / 2.0).min(PI / 2.0);
        self.wd = if p.ts > 0.0 {
            2.0 * half_step.sin() / p.ts
        } else {
            0.0
        };
        self.cos_phi = p.phase_lead.cos();
        self.sin_phi = p.phase_lead.sin();
    }

    /// Run one sample and return the saturated correction
    pub fn calculate(&mut self, reference: f32, measurement: f32) -> f32 {
        let p = &self.params;
        let err = reference - measurement;

        self.in_phase += p.ts * (p.kr * err - self.wd * self.quadrature);
        self.quadrature += p.ts * self.wd * self.in_phase;

        let resonant = self.cos_phi * self.in_phase - self.sin_phi * self.quadrature;
        let y = p.kp * err + resonant;

        // NaN collapses to the lower bound rather than propagating to the duty cycle
        if y.is_nan() {
            return p.lower;
        }
        y.max(p.lower).min(p.upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS: f32 = 100e-6;
    const W0: f32 = 2.0 * PI * 50.0;
    const UDC: f32 = 40.0;

    #[test]
    fn output_stays_within_bounds() {
        let mut pr = ProportionalResonant::new(PrParams::new(TS, 0.02, 4000.0, W0, UDC));

        // Large, slowly varying error drives the resonant state hard
        let mut peak = 0.0_f32;
        for k in 0..20_000 {
            let t = k as f32 * TS;
            let reference = 9_000.0 * (W0 * t).sin();
            let measurement = -9_000.0 * (3.0 * W0 * t).cos();
            let y = pr.calculate(reference, measurement);
            assert!(
                (-UDC..=UDC).contains(&y),
                "step {k}: output {y} outside [-{UDC}, {UDC}]"
            );
            peak = peak.max(y.abs());
        }
        assert_eq!(peak, UDC, "saturation was never reached");
    }

    #[test]
    fn proportional_only_without_resonant_gain() {
        let mut pr = ProportionalResonant::new(PrParams::new(TS, 0.5, 0.0, W0, UDC));
        assert_eq!(pr.calculate(3.0, 1.0), 1.0);
        assert_eq!(pr.calculate(1.0, 3.0), -1.0);
    }

    #[test]
    fn rejects_tracking_error_at_tuned_frequency() {
        // Plant: measurement follows the controller output one sample later
        let mut pr = ProportionalResonant::new(PrParams::new(TS, 0.2, 3000.0, W0, UDC));
        let amplitude = 10.0_f32;
        let samples_per_period = (2.0 * PI / (W0 * TS)).round() as usize;

        let mut measurement = 0.0_f32;
        let mut max_err_last_period = 0.0_f32;
        let n = 50 * samples_per_period;
        for k in 0..n {
            let reference = amplitude * (W0 * k as f32 * TS).sin();
            let err = reference - measurement;
            if k >= n - samples_per_period {
                max_err_last_period = max_err_last_period.max(err.abs());
            }
            measurement = pr.calculate(reference, measurement);
        }

        assert!(
            max_err_last_period < 0.01 * amplitude,
            "steady-state error {max_err_last_period} too large"
        );
    }

    #[test]
    fn reset_clears_memory() {
        let mut pr = ProportionalResonant::new(PrParams::new(TS, 0.0, 3000.0, W0, UDC));
        for _ in 0..100 {
            pr.calculate(1.0, 0.0);
        }
        assert_ne!(pr.calculate(0.0, 0.0), 0.0);

        pr.reset();
        assert_eq!(pr.calculate(0.0, 0.0), 0.0);
    }

    #[test]
    fn retuning_keeps_state() {
        let mut pr = ProportionalResonant::new(PrParams::new(TS, 0.0, 3000.0, W0, UDC));
        for _ in 0..100 {
            pr.calculate(1.0, 0.0);
        }
        pr.set_frequency(2.0 * PI * 60.0);
        assert_eq!(pr.params().w0, 2.0 * PI * 60.0);
        assert_ne!(pr.calculate(0.0, 0.0), 0.0);
    }
}
